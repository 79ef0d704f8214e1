//! Balance derivation
//!
//! An account's balance is never stored as mutable state; it is recomputed
//! on demand from the full history of the account's ledger entries.

use crate::types::{EntryType, LedgerEntry};
use rust_decimal::Decimal;

/// Derive a balance from ledger entries: Σ(credits) − Σ(debits)
///
/// Returns zero for an empty history. Side-effect free.
pub fn derive<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>) -> Decimal {
    entries
        .into_iter()
        .fold(Decimal::ZERO, |acc, entry| match entry.entry_type {
            EntryType::Credit => acc + entry.amount,
            EntryType::Debit => acc - entry.amount,
        })
}
