//! Main transfer orchestration layer
//!
//! This module ties together storage, the account registry, and the
//! single-writer actor into a high-level API for money movement.
//!
//! # Example
//!
//! ```no_run
//! use transfer_core::{Config, TransferEngine};
//!
//! #[tokio::main]
//! async fn main() -> transfer_core::Result<()> {
//!     let config = Config::default();
//!     let engine = TransferEngine::open(config).await?;
//!
//!     // let receipt = engine.transfer(&from, &to, amount, "key-1").await?;
//!
//!     Ok(())
//! }
//! ```

use crate::{
    accounts::{AccountRegistry, StorageRegistry},
    actor::{spawn_transfer_actor, TransferHandle, TransferKind, TransferRequest},
    metrics::Metrics,
    types::{AccountId, CallerIdentity, CallerRole, Transaction, TransferReceipt},
    Config, Error, Result, Storage,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Main transfer engine interface
pub struct TransferEngine {
    /// Actor handle for the serialized transfer protocol
    handle: TransferHandle,

    /// Account registry glue (accounts column family)
    registry: Arc<StorageRegistry>,

    /// Direct storage access (stats, shutdown)
    storage: Arc<Storage>,

    /// Prometheus metrics
    metrics: Metrics,
}

impl TransferEngine {
    /// Open engine with configuration
    pub async fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        let registry = Arc::new(StorageRegistry::new(storage.clone()));

        let handle = spawn_transfer_actor(
            storage.clone(),
            registry.clone() as Arc<dyn AccountRegistry>,
        );

        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("Failed to create metrics: {}", e)))?;

        tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            data_dir = ?config.data_dir,
            "Transfer engine opened"
        );

        Ok(Self {
            handle,
            registry,
            storage,
            metrics,
        })
    }

    /// Account registry for the hosting application (account opening, lookups)
    pub fn registry(&self) -> &StorageRegistry {
        &self.registry
    }

    /// Move funds between two accounts
    ///
    /// Idempotent under `idempotency_key`: a completed transfer is returned
    /// unchanged on replay, never re-executed. Rejections leave state exactly
    /// as before the call.
    pub async fn transfer(
        &self,
        from_account: &AccountId,
        to_account: &AccountId,
        amount: Decimal,
        idempotency_key: &str,
    ) -> Result<TransferReceipt> {
        Self::validate_request(from_account, to_account, amount, idempotency_key)?;

        self.execute(TransferRequest {
            from_account: from_account.clone(),
            to_account: to_account.clone(),
            amount,
            idempotency_key: idempotency_key.to_string(),
            kind: TransferKind::Standard,
        })
        .await
    }

    /// Mint funds from the system account into `to_account`
    ///
    /// Restricted to a privileged caller; the system account is the one
    /// owned by the caller's user ID. Follows the same protocol as
    /// [`TransferEngine::transfer`] except that the system source carries no
    /// balance check.
    pub async fn issue_funds(
        &self,
        caller: &CallerIdentity,
        to_account: &AccountId,
        amount: Decimal,
        idempotency_key: &str,
    ) -> Result<TransferReceipt> {
        if caller.role != CallerRole::System {
            return Err(Error::Unauthorized(format!(
                "Caller {} may not issue funds",
                caller.user_id
            )));
        }

        let system_account = self
            .registry
            .lookup_by_user(&caller.user_id)
            .map_err(|_| Error::AccountNotFound("System account not found".to_string()))?;

        Self::validate_request(
            &system_account.account_id,
            to_account,
            amount,
            idempotency_key,
        )?;

        self.execute(TransferRequest {
            from_account: system_account.account_id,
            to_account: to_account.clone(),
            amount,
            idempotency_key: idempotency_key.to_string(),
            kind: TransferKind::Issuance,
        })
        .await
    }

    /// Derive an account's balance from its ledger history
    pub async fn get_balance(&self, account_id: &AccountId) -> Result<Decimal> {
        self.handle.get_balance(account_id.clone()).await
    }

    /// Get a transaction by ID
    pub async fn get_transaction(&self, transaction_id: Uuid) -> Result<Transaction> {
        self.handle.get_transaction(transaction_id).await
    }

    /// Prometheus metrics (for the hosting service's scrape endpoint)
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Storage statistics
    pub fn stats(&self) -> Result<crate::storage::StorageStats> {
        self.storage.get_stats()
    }

    /// Shutdown engine
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await
    }

    /// Send the request through the actor and record metrics
    async fn execute(&self, request: TransferRequest) -> Result<TransferReceipt> {
        let started = Instant::now();
        let result = self.handle.transfer(request).await;
        self.metrics.record_duration(started.elapsed().as_secs_f64());

        match &result {
            Ok(receipt) if receipt.replayed => self.metrics.record_replayed(),
            Ok(_) => self.metrics.record_completed(),
            Err(_) => self.metrics.record_rejected(),
        }

        result
    }

    /// Protocol step 1: local validation, no reads or writes
    fn validate_request(
        from_account: &AccountId,
        to_account: &AccountId,
        amount: Decimal,
        idempotency_key: &str,
    ) -> Result<()> {
        if from_account.as_str().is_empty() || to_account.as_str().is_empty() {
            return Err(Error::Validation(
                "From account and to account are required".to_string(),
            ));
        }

        if idempotency_key.is_empty() {
            return Err(Error::Validation("Idempotency key is required".to_string()));
        }

        if amount <= Decimal::ZERO {
            return Err(Error::Validation("Amount must be positive".to_string()));
        }

        if from_account == to_account {
            return Err(Error::Validation(
                "From account and to account must differ".to_string(),
            ));
        }

        Ok(())
    }
}
