//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `accounts` - Account records (key: account_id)
//! - `transactions` - Transaction records (key: transaction_id)
//! - `entries` - Append-only ledger entries (key: entry_id)
//! - `idempotency` - Idempotency key bindings (key: idempotency_key, value: transaction_id)
//! - `indices` - Secondary indices for aggregation reads
//!
//! # Immutability
//!
//! Ledger entries are append-only at this boundary: the API exposes no update
//! or delete for entries, and the commit path refuses to overwrite an entry
//! key that already exists. The idempotency uniqueness constraint also lives
//! here: [`Storage::commit_transfer`] refuses a batch whose key is already
//! bound, so a duplicate submission can never create a second transaction.

use crate::{
    balance,
    error::{Error, Result},
    types::{Account, AccountId, EntryType, LedgerEntry, Transaction, TransactionStatus},
    Config,
};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode, Options,
    WriteBatch, DB,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_ACCOUNTS: &str = "accounts";
const CF_TRANSACTIONS: &str = "transactions";
const CF_ENTRIES: &str = "entries";
const CF_IDEMPOTENCY: &str = "idempotency";
const CF_INDICES: &str = "indices";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        // Database options
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        // Universal compaction for write-heavy workload
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        // Column family descriptors
        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_ACCOUNTS, Self::cf_options_accounts()),
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Self::cf_options_transactions()),
            ColumnFamilyDescriptor::new(CF_ENTRIES, Self::cf_options_entries()),
            ColumnFamilyDescriptor::new(CF_IDEMPOTENCY, Self::cf_options_idempotency()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        // Open database
        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!("Opened RocksDB at {:?}", path);

        Ok(Self { db: Arc::new(db) })
    }

    // Column family options

    fn cf_options_accounts() -> Options {
        let mut opts = Options::default();
        // Accounts are frequently read, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_transactions() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_entries() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_idempotency() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        // Point lookups on every transfer benefit from bloom filters
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    // Helper: get column family handle

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Account operations

    /// Put account record
    pub fn put_account(&self, account: &Account) -> Result<()> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        let key = account.account_id.as_str().as_bytes();
        let value = bincode::serialize(account)?;

        self.db.put_cf(cf, key, &value)?;

        Ok(())
    }

    /// Get account by ID
    pub fn get_account(&self, account_id: &AccountId) -> Result<Account> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        let key = account_id.as_str().as_bytes();

        let value = self
            .db
            .get_cf(cf, key)?
            .ok_or_else(|| Error::AccountNotFound(account_id.to_string()))?;

        let account: Account = bincode::deserialize(&value)?;
        Ok(account)
    }

    /// Find the first account owned by `user_id`
    pub fn find_account_by_user(&self, user_id: &str) -> Result<Account> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;

        let iter = self.db.iterator_cf(cf, IteratorMode::Start);
        for item in iter {
            let (_, value) = item?;
            let account: Account = bincode::deserialize(&value)?;
            if account.user_id == user_id {
                return Ok(account);
            }
        }

        Err(Error::AccountNotFound(format!("owned by user {}", user_id)))
    }

    // Transaction operations

    /// Get transaction by ID
    pub fn get_transaction(&self, transaction_id: Uuid) -> Result<Transaction> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        let key = transaction_id.as_bytes();

        let value = self
            .db
            .get_cf(cf, key)?
            .ok_or_else(|| Error::TransactionNotFound(transaction_id.to_string()))?;

        let transaction: Transaction = bincode::deserialize(&value)?;
        Ok(transaction)
    }

    /// Put a transaction record outside the transfer commit path
    ///
    /// Used by administrative tooling (and tests) to record transactions the
    /// transfer path never persists, e.g. REVERSED ones. Binds the
    /// idempotency key like the commit path does and honors the same
    /// uniqueness constraint.
    pub fn put_transaction(&self, transaction: &Transaction) -> Result<()> {
        if let Some(bound) = self.lookup_idempotency_key(&transaction.idempotency_key)? {
            if bound != transaction.transaction_id {
                return Err(Error::DuplicateKey(transaction.idempotency_key.clone()));
            }
        }

        let mut batch = WriteBatch::default();

        let cf_txn = self.cf_handle(CF_TRANSACTIONS)?;
        let value = bincode::serialize(transaction)?;
        batch.put_cf(cf_txn, transaction.transaction_id.as_bytes(), &value);

        let cf_idem = self.cf_handle(CF_IDEMPOTENCY)?;
        batch.put_cf(
            cf_idem,
            transaction.idempotency_key.as_bytes(),
            transaction.transaction_id.as_bytes(),
        );

        self.db.write(batch)?;
        Ok(())
    }

    // Idempotency index

    /// Look up the transaction bound to an idempotency key
    pub fn lookup_idempotency_key(&self, key: &str) -> Result<Option<Uuid>> {
        let cf = self.cf_handle(CF_IDEMPOTENCY)?;

        match self.db.get_cf(cf, key.as_bytes())? {
            Some(value) => {
                let bytes: [u8; 16] = value.as_slice().try_into().map_err(|_| {
                    Error::Storage(format!("Corrupt idempotency binding for key {}", key))
                })?;
                Ok(Some(Uuid::from_bytes(bytes)))
            }
            None => Ok(None),
        }
    }

    // Ledger entry operations (append-only; no update/delete exists)

    /// Get entry by ID
    pub fn get_entry(&self, entry_id: Uuid) -> Result<LedgerEntry> {
        let cf = self.cf_handle(CF_ENTRIES)?;
        let key = entry_id.as_bytes();

        let value = self
            .db
            .get_cf(cf, key)?
            .ok_or_else(|| Error::Storage(format!("Entry not found: {}", entry_id)))?;

        let entry: LedgerEntry = bincode::deserialize(&value)?;
        Ok(entry)
    }

    /// Get both entries of a transaction (via index)
    pub fn transaction_entries(&self, transaction_id: Uuid) -> Result<Vec<LedgerEntry>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let mut prefix = vec![b't'];
        prefix.extend_from_slice(transaction_id.as_bytes());

        let iter = self
            .db
            .iterator_cf(cf_indices, IteratorMode::From(&prefix, Direction::Forward));

        let mut entries = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }

            // Key layout: 't' || transaction_id (16) || entry_id (16)
            let entry_id_bytes: [u8; 16] = key[prefix.len()..]
                .try_into()
                .map_err(|_| Error::Storage("Corrupt transaction index key".to_string()))?;
            let entry = self.get_entry(Uuid::from_bytes(entry_id_bytes))?;
            entries.push(entry);
        }

        Ok(entries)
    }

    /// Get all entries for an account (via index)
    pub fn account_entries(&self, account_id: &AccountId) -> Result<Vec<LedgerEntry>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let prefix = Self::index_key_account_entry(account_id, None);

        let iter = self
            .db
            .iterator_cf(cf_indices, IteratorMode::From(&prefix, Direction::Forward));

        let mut entries = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }

            // Key layout: 'a' || account_id || '|' || entry_id (16)
            let entry_id_bytes: [u8; 16] = key[prefix.len()..]
                .try_into()
                .map_err(|_| Error::Storage("Corrupt account index key".to_string()))?;
            let entry = self.get_entry(Uuid::from_bytes(entry_id_bytes))?;
            entries.push(entry);
        }

        Ok(entries)
    }

    /// Derive account balance from its full entry history
    pub fn account_balance(&self, account_id: &AccountId) -> Result<Decimal> {
        let entries = self.account_entries(account_id)?;
        Ok(balance::derive(&entries))
    }

    // Atomic transfer commit

    /// Commit one transfer as a single atomic unit of work
    ///
    /// The batch spans the transaction record, both ledger entries, the
    /// idempotency binding, and the index keys; partial application is never
    /// observable. The batch is refused outright when:
    ///
    /// - the idempotency key is already bound ([`Error::DuplicateKey`]):
    ///   the storage-level uniqueness constraint behind duplicate-submission
    ///   safety;
    /// - either entry key already exists ([`Error::ImmutableEntry`]):
    ///   persisted entries are never overwritten, whatever the access path;
    /// - the transaction is not COMPLETED or the entry pair does not match
    ///   it: entries referencing a non-COMPLETED transaction must never
    ///   become visible.
    pub fn commit_transfer(
        &self,
        transaction: &Transaction,
        debit: &LedgerEntry,
        credit: &LedgerEntry,
    ) -> Result<()> {
        Self::validate_commit(transaction, debit, credit)?;

        // Uniqueness constraint: one transaction per key, for all time
        if self.lookup_idempotency_key(&transaction.idempotency_key)?.is_some() {
            return Err(Error::DuplicateKey(transaction.idempotency_key.clone()));
        }

        // Entries are immutable once persisted; refuse overwrites
        let cf_entries = self.cf_handle(CF_ENTRIES)?;
        for entry in [debit, credit] {
            if self.db.get_cf(cf_entries, entry.entry_id.as_bytes())?.is_some() {
                return Err(Error::ImmutableEntry(entry.entry_id.to_string()));
            }
        }

        let cf_txn = self.cf_handle(CF_TRANSACTIONS)?;
        if self
            .db
            .get_cf(cf_txn, transaction.transaction_id.as_bytes())?
            .is_some()
        {
            return Err(Error::TransactionFailed(format!(
                "Transaction {} already exists",
                transaction.transaction_id
            )));
        }

        let mut batch = WriteBatch::default();

        // 1. Transaction record
        let txn_value = bincode::serialize(transaction)?;
        batch.put_cf(cf_txn, transaction.transaction_id.as_bytes(), &txn_value);

        // 2. Both ledger entries
        for entry in [debit, credit] {
            let value = bincode::serialize(entry)?;
            batch.put_cf(cf_entries, entry.entry_id.as_bytes(), &value);
        }

        // 3. Idempotency binding
        let cf_idem = self.cf_handle(CF_IDEMPOTENCY)?;
        batch.put_cf(
            cf_idem,
            transaction.idempotency_key.as_bytes(),
            transaction.transaction_id.as_bytes(),
        );

        // 4. Indices
        let cf_indices = self.cf_handle(CF_INDICES)?;
        for entry in [debit, credit] {
            // Index: transaction_id || entry_id -> empty
            let idx_txn =
                Self::index_key_transaction_entry(transaction.transaction_id, entry.entry_id);
            batch.put_cf(cf_indices, &idx_txn, &[]);

            // Index: account_id | entry_id -> empty
            let idx_account = Self::index_key_account_entry(&entry.account_id, Some(entry.entry_id));
            batch.put_cf(cf_indices, &idx_account, &[]);
        }

        // Atomic commit
        self.db.write(batch)?;

        tracing::debug!(
            transaction_id = %transaction.transaction_id,
            idempotency_key = %transaction.idempotency_key,
            amount = %transaction.amount,
            "Transfer committed"
        );

        Ok(())
    }

    /// Validate the transfer unit of work before it touches the batch
    fn validate_commit(
        transaction: &Transaction,
        debit: &LedgerEntry,
        credit: &LedgerEntry,
    ) -> Result<()> {
        if transaction.status != TransactionStatus::Completed {
            return Err(Error::Validation(format!(
                "Refusing to persist entries for a {} transaction",
                transaction.status
            )));
        }

        for entry in [debit, credit] {
            if entry.transaction_id != transaction.transaction_id {
                return Err(Error::Validation(
                    "Entry does not reference the committing transaction".to_string(),
                ));
            }
            if entry.amount != transaction.amount {
                return Err(Error::Validation(
                    "Entry amount does not equal the transaction amount".to_string(),
                ));
            }
        }

        if debit.entry_type != EntryType::Debit || debit.account_id != transaction.from_account {
            return Err(Error::Validation(
                "Debit entry must debit the source account".to_string(),
            ));
        }
        if credit.entry_type != EntryType::Credit || credit.account_id != transaction.to_account {
            return Err(Error::Validation(
                "Credit entry must credit the destination account".to_string(),
            ));
        }

        Ok(())
    }

    // Index key helpers. Keys are tagged so the two index shapes sharing the
    // column family can never collide under a prefix scan.

    fn index_key_transaction_entry(transaction_id: Uuid, entry_id: Uuid) -> Vec<u8> {
        let mut key = vec![b't'];
        key.extend_from_slice(transaction_id.as_bytes());
        key.extend_from_slice(entry_id.as_bytes());
        key
    }

    fn index_key_account_entry(account_id: &AccountId, entry_id: Option<Uuid>) -> Vec<u8> {
        let mut key = vec![b'a'];
        key.extend_from_slice(account_id.as_str().as_bytes());
        key.push(b'|'); // Separator
        if let Some(eid) = entry_id {
            key.extend_from_slice(eid.as_bytes());
        }
        key
    }

    // Statistics

    /// Get storage statistics
    pub fn get_stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            total_accounts: self.approximate_count(CF_ACCOUNTS)?,
            total_transactions: self.approximate_count(CF_TRANSACTIONS)?,
            total_entries: self.approximate_count(CF_ENTRIES)?,
        })
    }

    fn approximate_count(&self, cf_name: &str) -> Result<u64> {
        let cf = self.cf_handle(cf_name)?;
        // RocksDB property for approximate count
        let prop = self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);

        Ok(prop)
    }

    /// Close database (graceful shutdown)
    pub fn close(self) -> Result<()> {
        drop(self.db);
        tracing::info!("RocksDB closed gracefully");
        Ok(())
    }
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Approximate account count
    pub total_accounts: u64,
    /// Approximate transaction count
    pub total_transactions: u64,
    /// Approximate ledger entry count
    pub total_entries: u64,
}
