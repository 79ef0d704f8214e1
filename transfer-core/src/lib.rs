//! CoreBank Transfer Core
//!
//! Idempotent, atomically-committed money movement backed by an append-only
//! double-entry ledger.
//!
//! # Architecture
//!
//! - **Derived balances**: An account's balance is recomputed from its ledger
//!   entries, never stored as mutable state
//! - **Single writer**: One logical writer task serializes every
//!   check-then-commit sequence, closing the double-spend race
//! - **Atomic unit of work**: Transaction record, both ledger entries, and
//!   the idempotency binding commit or abort together
//! - **Append-only**: Persisted ledger entries are never modified or deleted
//!
//! # Invariants
//!
//! - Every COMPLETED transaction has exactly one DEBIT and one CREDIT entry
//!   of equal amount
//! - balance(a) == Σ(credits) − Σ(debits) over a's entries, at all times
//! - An idempotency key identifies at most one transaction, for all time
//! - Entries referencing a non-COMPLETED transaction are never visible

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod accounts;
pub mod actor;
pub mod balance;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod storage;
pub mod types;

// Re-exports
pub use accounts::{AccountRegistry, StorageRegistry};
pub use config::Config;
pub use engine::TransferEngine;
pub use error::{Error, Result};
pub use storage::Storage;
pub use types::{
    Account, AccountId, AccountStatus, CallerIdentity, CallerRole, Currency, EntryType,
    LedgerEntry, Transaction, TransactionStatus, TransferReceipt,
};
