//! Account registry integration
//!
//! The transfer engine consults account identity, status, and currency; it
//! never creates accounts or mutates their status. Administration (freezing,
//! closing) belongs to an external module, which is why the seam is a trait:
//! the engine only ever sees lookups.

use crate::{
    error::Result,
    storage::Storage,
    types::{Account, AccountId, Currency},
};
use std::sync::Arc;

/// Read-only view of account identity, status, and currency
pub trait AccountRegistry: Send + Sync {
    /// Look up an account by ID
    fn lookup(&self, account_id: &AccountId) -> Result<Account>;

    /// Look up the account owned by a user (used to resolve the system
    /// account behind a privileged caller)
    fn lookup_by_user(&self, user_id: &str) -> Result<Account>;
}

/// Registry backed by the accounts column family
pub struct StorageRegistry {
    storage: Arc<Storage>,
}

impl StorageRegistry {
    /// Create a registry over existing storage
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Open a new active account owned by `user_id`
    ///
    /// This is hosting-application glue (the account-opening endpoint), not
    /// part of the transfer protocol.
    pub fn open_account(&self, user_id: impl Into<String>, currency: Currency) -> Result<Account> {
        let account = Account::open(user_id, currency);
        self.storage.put_account(&account)?;

        tracing::info!(
            account_id = %account.account_id,
            user_id = %account.user_id,
            currency = %account.currency,
            "Account opened"
        );

        Ok(account)
    }
}

impl AccountRegistry for StorageRegistry {
    fn lookup(&self, account_id: &AccountId) -> Result<Account> {
        self.storage.get_account(account_id)
    }

    fn lookup_by_user(&self, user_id: &str) -> Result<Account> {
        self.storage.find_account_by_user(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use tempfile::TempDir;

    fn test_registry() -> (StorageRegistry, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        let storage = Arc::new(Storage::open(&config).unwrap());
        (StorageRegistry::new(storage), temp_dir)
    }

    #[test]
    fn test_open_and_lookup() {
        let (registry, _temp) = test_registry();

        let account = registry.open_account("user-1", Currency::INR).unwrap();
        let found = registry.lookup(&account.account_id).unwrap();

        assert_eq!(found.account_id, account.account_id);
        assert!(found.status.is_active());
        assert_eq!(found.currency, Currency::INR);
    }

    #[test]
    fn test_lookup_by_user() {
        let (registry, _temp) = test_registry();

        let account = registry.open_account("system", Currency::INR).unwrap();
        let found = registry.lookup_by_user("system").unwrap();
        assert_eq!(found.account_id, account.account_id);

        assert!(registry.lookup_by_user("nobody").is_err());
    }
}
