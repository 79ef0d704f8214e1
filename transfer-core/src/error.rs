//! Error types for the transfer engine

use thiserror::Error;

/// Result type for transfer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Transfer engine errors
#[derive(Error, Debug)]
pub enum Error {
    /// Request failed validation; nothing was written
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Account does not exist
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Account exists but is not ACTIVE
    #[error("Account {account} is not active (status {status})")]
    AccountInactive {
        /// Offending account
        account: String,
        /// Its current status
        status: String,
    },

    /// Sender balance is below the requested amount
    #[error("Insufficient funds: balance is {balance}, requested {requested}")]
    InsufficientFunds {
        /// Derived balance at check time
        balance: rust_decimal::Decimal,
        /// Requested transfer amount
        requested: rust_decimal::Decimal,
    },

    /// Idempotency key belongs to a transfer still in flight; retry later
    #[error("Transfer for idempotency key {0} is still processing")]
    DuplicatePending(String),

    /// Storage-level uniqueness refusal: the idempotency key is already bound
    ///
    /// Raised by the commit path itself, not by the coordinator's pre-check;
    /// the losing writer falls back to replay resolution.
    #[error("Idempotency key already bound: {0}")]
    DuplicateKey(String),

    /// Idempotency key belongs to a FAILED or REVERSED transaction
    ///
    /// The key stays burned; retry with a fresh key.
    #[error("Prior transfer for idempotency key {key} ended {status}")]
    PriorTransferUnsuccessful {
        /// The burned key
        key: String,
        /// Terminal status of the prior transaction
        status: String,
    },

    /// Atomic commit aborted; no writes survived. Same key is safe to retry.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Attempted mutation of a persisted ledger entry
    #[error("Ledger entry is immutable: {0}")]
    ImmutableEntry(String),

    /// Illegal transaction status transition
    #[error("Illegal status transition {from} -> {to}")]
    InvalidTransition {
        /// Current status
        from: String,
        /// Requested status
        to: String,
    },

    /// Caller lacks the role required for this operation
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Transaction not found
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
