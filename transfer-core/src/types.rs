//! Core types for the transfer engine
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (Decimal for money)
//! - Closed status sets with explicit transitions

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Account identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create new account ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh time-ordered account ID
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ISO 4217 currency code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Currency {
    /// Indian Rupee
    INR,
    /// US Dollar
    USD,
    /// Euro
    EUR,
    /// British Pound
    GBP,
    /// UAE Dirham
    AED,
}

impl Currency {
    /// ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::INR => "INR",
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::AED => "AED",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "INR" => Some(Currency::INR),
            "USD" => Some(Currency::USD),
            "EUR" => Some(Currency::EUR),
            "GBP" => Some(Currency::GBP),
            "AED" => Some(Currency::AED),
            _ => None,
        }
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency::INR
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Account status
///
/// Mutated only by administrative action outside this crate; the transfer
/// engine reads it and never writes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum AccountStatus {
    /// Open for transfers
    Active = 1,
    /// Administratively frozen
    Frozen = 2,
    /// Closed (accounts are never deleted)
    Closed = 3,
}

impl AccountStatus {
    /// Whether transfers may touch this account
    pub fn is_active(&self) -> bool {
        matches!(self, AccountStatus::Active)
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccountStatus::Active => "ACTIVE",
            AccountStatus::Frozen => "FROZEN",
            AccountStatus::Closed => "CLOSED",
        };
        write!(f, "{}", s)
    }
}

/// Account record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Account identifier
    pub account_id: AccountId,

    /// Owning user (identity lives in the external auth module)
    pub user_id: String,

    /// Current status
    pub status: AccountStatus,

    /// Account currency
    pub currency: Currency,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new active account owned by `user_id`
    pub fn open(user_id: impl Into<String>, currency: Currency) -> Self {
        let now = Utc::now();
        Self {
            account_id: AccountId::generate(),
            user_id: user_id.into(),
            status: AccountStatus::Active,
            currency,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Side of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum EntryType {
    /// Money leaving the account
    Debit = 1,
    /// Money entering the account
    Credit = 2,
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntryType::Debit => "DEBIT",
            EntryType::Credit => "CREDIT",
        };
        write!(f, "{}", s)
    }
}

/// Immutable record of one-sided money movement against one account
///
/// Entries are created only inside a committed transfer and are never
/// mutated or removed afterwards; the storage layer enforces this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry ID (UUIDv7 for time-ordering)
    pub entry_id: Uuid,

    /// Account this entry moves money on
    pub account_id: AccountId,

    /// Transaction this entry belongs to
    pub transaction_id: Uuid,

    /// Entry amount, always positive
    pub amount: Decimal,

    /// Debit or credit
    pub entry_type: EntryType,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Create an entry for `transaction_id` against `account_id`
    pub fn new(
        account_id: AccountId,
        transaction_id: Uuid,
        amount: Decimal,
        entry_type: EntryType,
    ) -> Self {
        Self {
            entry_id: Uuid::now_v7(),
            account_id,
            transaction_id,
            amount,
            entry_type,
            created_at: Utc::now(),
        }
    }
}

/// Transaction status
///
/// The set is closed and transitions go through [`TransactionStatus::transition`];
/// there is no other way to change a transaction's status in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum TransactionStatus {
    /// Created, commit in flight
    Pending = 1,
    /// Committed with both ledger entries (terminal)
    Completed = 2,
    /// Commit aborted (terminal)
    Failed = 3,
    /// Administratively reversed (terminal, written outside this crate)
    Reversed = 4,
}

impl TransactionStatus {
    /// The single transition function for transaction status
    ///
    /// Legal transitions: Pending → Completed, Pending → Failed.
    /// Everything else is rejected.
    pub fn transition(self, next: TransactionStatus) -> crate::Result<TransactionStatus> {
        use TransactionStatus::*;
        match (self, next) {
            (Pending, Completed) => Ok(Completed),
            (Pending, Failed) => Ok(Failed),
            (from, to) => Err(crate::Error::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            }),
        }
    }

    /// Check if status is terminal
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::Reversed => "REVERSED",
        };
        write!(f, "{}", s)
    }
}

/// One debit/credit pair moving `amount` between two accounts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction ID (UUIDv7 for time-ordering)
    pub transaction_id: Uuid,

    /// Source account
    pub from_account: AccountId,

    /// Destination account
    pub to_account: AccountId,

    /// Transfer amount, always positive
    pub amount: Decimal,

    /// Caller-supplied key; identifies at most one transaction, for all time
    pub idempotency_key: String,

    /// Current status
    pub status: TransactionStatus,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a new pending transaction
    pub fn new(
        from_account: AccountId,
        to_account: AccountId,
        amount: Decimal,
        idempotency_key: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            transaction_id: Uuid::now_v7(),
            from_account,
            to_account,
            amount,
            idempotency_key: idempotency_key.into(),
            status: TransactionStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Transition Pending → Completed
    pub fn complete(&mut self) -> crate::Result<()> {
        self.status = self.status.transition(TransactionStatus::Completed)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Transition Pending → Failed
    pub fn fail(&mut self) -> crate::Result<()> {
        self.status = self.status.transition(TransactionStatus::Failed)?;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Caller role, verified by the external auth layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallerRole {
    /// Regular account holder
    Customer,
    /// System identity allowed to mint funds
    System,
}

/// Verified caller identity handed in by the external auth layer
///
/// The engine performs no credential verification itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerIdentity {
    /// Owning user ID
    pub user_id: String,

    /// Caller role
    pub role: CallerRole,
}

/// Result of a committed (or replayed) transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReceipt {
    /// The committed transaction
    pub transaction: Transaction,

    /// Its debit and credit entries
    pub entries: Vec<LedgerEntry>,

    /// True when this receipt is an idempotent replay of a prior commit
    pub replayed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_from_str() {
        assert_eq!(Currency::from_str("INR"), Some(Currency::INR));
        assert_eq!(Currency::from_str("USD"), Some(Currency::USD));
        assert_eq!(Currency::from_str("INVALID"), None);
    }

    #[test]
    fn test_account_opens_active() {
        let account = Account::open("user-1", Currency::INR);
        assert!(account.status.is_active());
        assert_eq!(account.user_id, "user-1");
    }

    #[test]
    fn test_legal_transitions() {
        let mut txn = Transaction::new(
            AccountId::new("a"),
            AccountId::new("b"),
            Decimal::from(100),
            "key-1",
        );
        assert_eq!(txn.status, TransactionStatus::Pending);
        assert!(!txn.status.is_terminal());

        txn.complete().unwrap();
        assert_eq!(txn.status, TransactionStatus::Completed);
        assert!(txn.status.is_terminal());
    }

    #[test]
    fn test_pending_to_failed() {
        let mut txn = Transaction::new(
            AccountId::new("a"),
            AccountId::new("b"),
            Decimal::from(100),
            "key-2",
        );
        txn.fail().unwrap();
        assert_eq!(txn.status, TransactionStatus::Failed);
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        use TransactionStatus::*;

        // Terminal states never transition
        for from in [Completed, Failed, Reversed] {
            for to in [Pending, Completed, Failed, Reversed] {
                assert!(from.transition(to).is_err());
            }
        }

        // Pending never goes back to Pending or jumps to Reversed
        assert!(Pending.transition(Pending).is_err());
        assert!(Pending.transition(Reversed).is_err());
    }

    #[test]
    fn test_status_json_wire_format() {
        // Hosting services expose these records as JSON; statuses go over
        // the wire as uppercase strings
        let mut txn = Transaction::new(
            AccountId::new("a"),
            AccountId::new("b"),
            Decimal::from(100),
            "key-json",
        );
        txn.complete().unwrap();

        let value = serde_json::to_value(&txn).unwrap();
        assert_eq!(value["status"], "COMPLETED");

        let entry = LedgerEntry::new(
            AccountId::new("a"),
            txn.transaction_id,
            txn.amount,
            EntryType::Debit,
        );
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["entry_type"], "DEBIT");
    }

    #[test]
    fn test_completed_transaction_cannot_fail() {
        let mut txn = Transaction::new(
            AccountId::new("a"),
            AccountId::new("b"),
            Decimal::from(50),
            "key-3",
        );
        txn.complete().unwrap();
        assert!(txn.fail().is_err());
        assert_eq!(txn.status, TransactionStatus::Completed);
    }
}
