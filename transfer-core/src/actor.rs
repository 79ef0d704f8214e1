//! Single-writer concurrency for the transfer protocol
//!
//! All check-then-commit sequences run on one dedicated task:
//! - The balance check and the atomic commit can never interleave with
//!   another writer, which closes the double-spend race.
//! - The storage-level idempotency refusal is race-free: between the replay
//!   lookup and the commit there is no other writer to bind the key.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │            TransferEngine (request/response)          │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │            TransferActor (single task)                │
//! │   idempotency → accounts → balance → WriteBatch      │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       ▼
//!              Storage::commit_transfer()
//!             (atomic write to RocksDB)
//! ```

use crate::accounts::AccountRegistry;
use crate::types::{
    AccountId, EntryType, LedgerEntry, Transaction, TransactionStatus, TransferReceipt,
};
use crate::{Error, Result, Storage};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// What kind of transfer the coordinator is executing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    /// Regular transfer; the source balance must cover the amount
    Standard,
    /// Fund issuance from the system account; no source balance check
    Issuance,
}

/// A validated transfer request, ready for the serialized protocol steps
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// Source account
    pub from_account: AccountId,
    /// Destination account
    pub to_account: AccountId,
    /// Transfer amount
    pub amount: Decimal,
    /// Caller-supplied idempotency key
    pub idempotency_key: String,
    /// Standard transfer or issuance
    pub kind: TransferKind,
}

/// Message sent to the transfer actor
pub enum TransferMessage {
    /// Execute a transfer (idempotency, account, balance checks + commit)
    Transfer {
        /// The validated request
        request: TransferRequest,
        /// Reply channel
        response: oneshot::Sender<Result<TransferReceipt>>,
    },

    /// Derive an account balance
    GetBalance {
        /// Account to aggregate
        account_id: AccountId,
        /// Reply channel
        response: oneshot::Sender<Result<Decimal>>,
    },

    /// Get a transaction by ID
    GetTransaction {
        /// Transaction ID
        transaction_id: Uuid,
        /// Reply channel
        response: oneshot::Sender<Result<Transaction>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that serializes all transfer protocol steps
pub struct TransferActor {
    /// Storage backend
    storage: Arc<Storage>,

    /// Account registry (external collaborator seam)
    registry: Arc<dyn AccountRegistry>,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<TransferMessage>,
}

impl TransferActor {
    /// Create new actor
    pub fn new(
        storage: Arc<Storage>,
        registry: Arc<dyn AccountRegistry>,
        mailbox: mpsc::Receiver<TransferMessage>,
    ) -> Self {
        Self {
            storage,
            registry,
            mailbox,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                TransferMessage::Shutdown => break,

                TransferMessage::Transfer { request, response } => {
                    let result = self.handle_transfer(request);
                    let _ = response.send(result);
                }

                TransferMessage::GetBalance {
                    account_id,
                    response,
                } => {
                    let result = self
                        .registry
                        .lookup(&account_id)
                        .and_then(|_| self.storage.account_balance(&account_id));
                    let _ = response.send(result);
                }

                TransferMessage::GetTransaction {
                    transaction_id,
                    response,
                } => {
                    let result = self.storage.get_transaction(transaction_id);
                    let _ = response.send(result);
                }
            }
        }
    }

    /// Protocol steps 2-5: idempotency, accounts, balance, atomic commit
    ///
    /// Runs entirely on the actor task; no other writer can interleave.
    fn handle_transfer(&self, request: TransferRequest) -> Result<TransferReceipt> {
        // Idempotency resolution: a bound key is resolved, never re-executed
        if let Some(transaction_id) = self
            .storage
            .lookup_idempotency_key(&request.idempotency_key)?
        {
            return self.resolve_replay(transaction_id, &request.idempotency_key);
        }

        // Account checks: both exist and are ACTIVE
        let from = self.registry.lookup(&request.from_account)?;
        let to = self.registry.lookup(&request.to_account)?;

        for account in [&from, &to] {
            if !account.status.is_active() {
                return Err(Error::AccountInactive {
                    account: account.account_id.to_string(),
                    status: account.status.to_string(),
                });
            }
        }

        // No conversion: both sides must hold the same currency
        if from.currency != to.currency {
            return Err(Error::Validation(format!(
                "Currency mismatch: {} -> {}",
                from.currency, to.currency
            )));
        }

        // Balance check against the derived balance; consistent with the
        // commit below because both run on this task
        if request.kind == TransferKind::Standard {
            let balance = self.storage.account_balance(&request.from_account)?;
            if balance < request.amount {
                return Err(Error::InsufficientFunds {
                    balance,
                    requested: request.amount,
                });
            }
        }

        // Atomic commit: PENDING transaction, both entries, status transition,
        // all in one unit of work
        let mut transaction = Transaction::new(
            from.account_id.clone(),
            to.account_id.clone(),
            request.amount,
            request.idempotency_key.clone(),
        );

        let debit = LedgerEntry::new(
            from.account_id,
            transaction.transaction_id,
            transaction.amount,
            EntryType::Debit,
        );
        let credit = LedgerEntry::new(
            to.account_id,
            transaction.transaction_id,
            transaction.amount,
            EntryType::Credit,
        );

        transaction.complete()?;

        match self.storage.commit_transfer(&transaction, &debit, &credit) {
            Ok(()) => {
                tracing::info!(
                    transaction_id = %transaction.transaction_id,
                    from = %transaction.from_account,
                    to = %transaction.to_account,
                    amount = %transaction.amount,
                    "Transfer completed"
                );

                Ok(TransferReceipt {
                    transaction,
                    entries: vec![debit, credit],
                    replayed: false,
                })
            }

            // Lost the storage-level uniqueness race; fall back to replay
            Err(Error::DuplicateKey(key)) => {
                let transaction_id = self.storage.lookup_idempotency_key(&key)?.ok_or_else(|| {
                    Error::Concurrency(format!("Key {} bound but binding not readable", key))
                })?;
                self.resolve_replay(transaction_id, &key)
            }

            // Integrity errors are never swallowed
            Err(err @ Error::ImmutableEntry(_)) => {
                tracing::error!(error = %err, "Ledger integrity violation during commit");
                Err(err)
            }

            // Any other commit-phase failure aborted the whole unit; the key
            // was never bound, so the caller can retry with the same key
            Err(err) => {
                tracing::warn!(error = %err, "Transfer commit aborted");
                Err(Error::TransactionFailed(err.to_string()))
            }
        }
    }

    /// Resolve a replayed idempotency key against the stored transaction
    fn resolve_replay(&self, transaction_id: Uuid, key: &str) -> Result<TransferReceipt> {
        let transaction = self.storage.get_transaction(transaction_id)?;

        match transaction.status {
            TransactionStatus::Completed => {
                let entries = self.storage.transaction_entries(transaction_id)?;

                tracing::debug!(
                    transaction_id = %transaction_id,
                    idempotency_key = %key,
                    "Idempotent replay"
                );

                Ok(TransferReceipt {
                    transaction,
                    entries,
                    replayed: true,
                })
            }

            TransactionStatus::Pending => Err(Error::DuplicatePending(key.to_string())),

            status @ (TransactionStatus::Failed | TransactionStatus::Reversed) => {
                Err(Error::PriorTransferUnsuccessful {
                    key: key.to_string(),
                    status: status.to_string(),
                })
            }
        }
    }
}

/// Handle for sending messages to the actor
#[derive(Clone)]
pub struct TransferHandle {
    sender: mpsc::Sender<TransferMessage>,
}

impl TransferHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<TransferMessage>) -> Self {
        Self { sender }
    }

    /// Execute a transfer through the serialized protocol
    pub async fn transfer(&self, request: TransferRequest) -> Result<TransferReceipt> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(TransferMessage::Transfer {
                request,
                response: tx,
            })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Derive an account balance
    pub async fn get_balance(&self, account_id: AccountId) -> Result<Decimal> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(TransferMessage::GetBalance {
                account_id,
                response: tx,
            })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Get a transaction by ID
    pub async fn get_transaction(&self, transaction_id: Uuid) -> Result<Transaction> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(TransferMessage::GetTransaction {
                transaction_id,
                response: tx,
            })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(TransferMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the transfer actor
pub fn spawn_transfer_actor(
    storage: Arc<Storage>,
    registry: Arc<dyn AccountRegistry>,
) -> TransferHandle {
    let (tx, rx) = mpsc::channel(1000); // Bounded channel for backpressure
    let actor = TransferActor::new(storage, registry, rx);

    tokio::spawn(async move {
        actor.run().await;
    });

    TransferHandle::new(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::StorageRegistry;
    use crate::types::{Account, Currency};
    use crate::Config;

    fn test_setup() -> (Arc<Storage>, Arc<StorageRegistry>, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();

        let storage = Arc::new(Storage::open(&config).unwrap());
        let registry = Arc::new(StorageRegistry::new(storage.clone()));
        (storage, registry, temp_dir)
    }

    fn funded_account(
        storage: &Storage,
        registry: &StorageRegistry,
        user: &str,
        amount: i64,
    ) -> Account {
        let account = registry.open_account(user, Currency::INR).unwrap();
        if amount > 0 {
            // Seed balance with an entry pair against a per-user mint account
            let mint = registry
                .open_account(format!("mint-{}", user), Currency::INR)
                .unwrap();
            let mut txn = Transaction::new(
                mint.account_id.clone(),
                account.account_id.clone(),
                Decimal::from(amount),
                format!("seed-{}", user),
            );
            let debit = LedgerEntry::new(
                mint.account_id,
                txn.transaction_id,
                txn.amount,
                EntryType::Debit,
            );
            let credit = LedgerEntry::new(
                account.account_id.clone(),
                txn.transaction_id,
                txn.amount,
                EntryType::Credit,
            );
            txn.complete().unwrap();
            storage.commit_transfer(&txn, &debit, &credit).unwrap();
        }
        account
    }

    #[tokio::test]
    async fn test_actor_spawn_and_shutdown() {
        let (storage, registry, _temp) = test_setup();
        let handle = spawn_transfer_actor(storage, registry);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_transfer_and_replay() {
        let (storage, registry, _temp) = test_setup();
        let from = funded_account(&storage, &registry, "alice", 500);
        let to = funded_account(&storage, &registry, "bob", 0);

        let handle = spawn_transfer_actor(storage, registry);

        let request = TransferRequest {
            from_account: from.account_id.clone(),
            to_account: to.account_id.clone(),
            amount: Decimal::from(200),
            idempotency_key: "k1".to_string(),
            kind: TransferKind::Standard,
        };

        let receipt = handle.transfer(request.clone()).await.unwrap();
        assert!(!receipt.replayed);
        assert_eq!(receipt.entries.len(), 2);

        // Same key resolves to the same transaction, no re-execution
        let replay = handle.transfer(request).await.unwrap();
        assert!(replay.replayed);
        assert_eq!(
            replay.transaction.transaction_id,
            receipt.transaction.transaction_id
        );

        assert_eq!(
            handle.get_balance(from.account_id).await.unwrap(),
            Decimal::from(300)
        );
        assert_eq!(
            handle.get_balance(to.account_id).await.unwrap(),
            Decimal::from(200)
        );

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_insufficient_funds_writes_nothing() {
        let (storage, registry, _temp) = test_setup();
        let from = funded_account(&storage, &registry, "alice", 50);
        let to = funded_account(&storage, &registry, "bob", 0);

        let handle = spawn_transfer_actor(storage.clone(), registry);

        let result = handle
            .transfer(TransferRequest {
                from_account: from.account_id.clone(),
                to_account: to.account_id.clone(),
                amount: Decimal::from(80),
                idempotency_key: "k-over".to_string(),
                kind: TransferKind::Standard,
            })
            .await;

        assert!(matches!(result, Err(Error::InsufficientFunds { .. })));
        assert_eq!(storage.lookup_idempotency_key("k-over").unwrap(), None);
        assert_eq!(
            handle.get_balance(from.account_id).await.unwrap(),
            Decimal::from(50)
        );

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_issuance_skips_balance_check() {
        let (storage, registry, _temp) = test_setup();
        let system = registry.open_account("system", Currency::INR).unwrap();
        let to = funded_account(&storage, &registry, "bob", 0);

        let handle = spawn_transfer_actor(storage, registry);

        let receipt = handle
            .transfer(TransferRequest {
                from_account: system.account_id.clone(),
                to_account: to.account_id.clone(),
                amount: Decimal::from(1000),
                idempotency_key: "issue-1".to_string(),
                kind: TransferKind::Issuance,
            })
            .await
            .unwrap();

        assert!(!receipt.replayed);
        assert_eq!(
            handle.get_balance(to.account_id).await.unwrap(),
            Decimal::from(1000)
        );
        // The system account legitimately goes negative
        assert_eq!(
            handle.get_balance(system.account_id).await.unwrap(),
            Decimal::from(-1000)
        );

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_inactive_account_rejected() {
        let (storage, registry, _temp) = test_setup();
        let from = funded_account(&storage, &registry, "alice", 500);
        let mut frozen = registry.open_account("carol", Currency::INR).unwrap();

        // Administrative action happens outside the engine
        frozen.status = crate::types::AccountStatus::Frozen;
        storage.put_account(&frozen).unwrap();

        let handle = spawn_transfer_actor(storage, registry);

        let result = handle
            .transfer(TransferRequest {
                from_account: from.account_id,
                to_account: frozen.account_id,
                amount: Decimal::from(10),
                idempotency_key: "k-frozen".to_string(),
                kind: TransferKind::Standard,
            })
            .await;

        assert!(matches!(result, Err(Error::AccountInactive { .. })));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_currency_mismatch_rejected() {
        let (storage, registry, _temp) = test_setup();
        let from = funded_account(&storage, &registry, "alice", 500);
        let usd = registry.open_account("dan", Currency::USD).unwrap();

        let handle = spawn_transfer_actor(storage.clone(), registry);

        let result = handle
            .transfer(TransferRequest {
                from_account: from.account_id,
                to_account: usd.account_id,
                amount: Decimal::from(10),
                idempotency_key: "k-fx".to_string(),
                kind: TransferKind::Standard,
            })
            .await;

        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(storage.lookup_idempotency_key("k-fx").unwrap(), None);

        handle.shutdown().await.unwrap();
    }
}
