//! Core types and data structures for the wallet ledger

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::ledger::idempotency::OperationKey;

/// System-assigned account identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// System-assigned ledger entry identifier, increasing in insertion order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub i64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the caller that owns an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub u32);

impl OwnerId {
    /// Owner used when no registration exists yet (single-tenant deployments)
    pub const DEFAULT: OwnerId = OwnerId(1);
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of whoever is invoking a ledger operation.
///
/// Authentication happens outside the ledger; this only carries the
/// already-established identity to the [`AccessPolicy`](crate::AccessPolicy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Caller {
    pub owner_id: OwnerId,
}

impl Caller {
    pub fn new(owner_id: OwnerId) -> Self {
        Self { owner_id }
    }
}

impl Default for Caller {
    fn default() -> Self {
        Self::new(OwnerId::DEFAULT)
    }
}

/// Side of the ledger an entry lands on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Money coming into the account (positive amount)
    Credit,
    /// Money leaving the account (negative amount)
    Debit,
}

impl Direction {
    /// Direction implied by the sign of a signed entry amount
    pub fn of(amount: i64) -> Self {
        if amount < 0 {
            Direction::Debit
        } else {
            Direction::Credit
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Credit => "credit",
            Direction::Debit => "debit",
        }
    }
}

/// What produced a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Deposit,
    TransferOut,
    TransferIn,
}

impl EntryKind {
    pub fn direction(&self) -> Direction {
        match self {
            EntryKind::Deposit | EntryKind::TransferIn => Direction::Credit,
            EntryKind::TransferOut => Direction::Debit,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Deposit => "deposit",
            EntryKind::TransferOut => "transfer_out",
            EntryKind::TransferIn => "transfer_in",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "deposit" => Some(EntryKind::Deposit),
            "transfer_out" => Some(EntryKind::TransferOut),
            "transfer_in" => Some(EntryKind::TransferIn),
            _ => None,
        }
    }
}

/// Operations an [`AccessPolicy`](crate::AccessPolicy) is asked to authorize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Reading balance or history
    Read,
    /// Crediting the account (deposit or incoming transfer)
    Deposit,
    /// Debiting the account (outgoing transfer)
    Withdraw,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Action::Read => "read",
            Action::Deposit => "deposit into",
            Action::Withdraw => "withdraw from",
        };
        f.write_str(verb)
    }
}

/// A wallet account holding a non-negative balance in the base monetary unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier for the account
    pub id: AccountId,
    /// Caller that owns the account
    pub owner_id: OwnerId,
    /// Unique human-readable name
    pub name: String,
    /// Current balance, always the sum of the account's ledger entries
    pub balance: i64,
    /// When the account was created
    pub created_at: DateTime<Utc>,
    /// When the balance last changed
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with a zero balance
    pub fn new(id: AccountId, owner_id: OwnerId, name: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            owner_id,
            name,
            balance: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the account can cover a debit of `amount`
    pub fn can_debit(&self, amount: i64) -> bool {
        self.balance >= amount
    }
}

/// Account insertion request; the store assigns the id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccount {
    pub owner_id: OwnerId,
    pub name: String,
}

impl NewAccount {
    pub fn new(owner_id: OwnerId, name: impl Into<String>) -> Self {
        Self {
            owner_id,
            name: name.into(),
        }
    }
}

/// One immutable entry of the append-only ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique identifier for the entry
    pub id: TransactionId,
    /// Account this entry affects
    pub account_id: AccountId,
    /// Signed amount: positive credits, negative debits
    pub amount: i64,
    /// Token identifying the logical operation that produced the entry
    pub client_operation_hash: String,
    /// Operation that produced the entry
    pub kind: EntryKind,
    /// Other side of a transfer
    pub counterparty: Option<AccountId>,
    /// When the entry was applied
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn direction(&self) -> Direction {
        Direction::of(self.amount)
    }

    /// Deduplication key this entry occupies
    pub fn operation_key(&self) -> OperationKey {
        OperationKey::new(
            self.account_id,
            self.direction(),
            self.client_operation_hash.clone(),
        )
    }
}

/// Entry insertion request; the store assigns the id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEntry {
    pub account_id: AccountId,
    pub amount: i64,
    pub client_operation_hash: String,
    pub kind: EntryKind,
    pub counterparty: Option<AccountId>,
    pub created_at: DateTime<Utc>,
}

impl NewEntry {
    /// Credit entry for a deposit
    pub fn deposit(
        account_id: AccountId,
        amount: i64,
        client_operation_hash: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            account_id,
            amount,
            client_operation_hash: client_operation_hash.into(),
            kind: EntryKind::Deposit,
            counterparty: None,
            created_at,
        }
    }

    /// Debit leg of a transfer; `amount` is the positive transfer amount
    pub fn transfer_out(
        from: AccountId,
        to: AccountId,
        amount: i64,
        client_operation_hash: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            account_id: from,
            amount: -amount,
            client_operation_hash: client_operation_hash.into(),
            kind: EntryKind::TransferOut,
            counterparty: Some(to),
            created_at,
        }
    }

    /// Credit leg of a transfer
    pub fn transfer_in(
        to: AccountId,
        from: AccountId,
        amount: i64,
        client_operation_hash: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            account_id: to,
            amount,
            client_operation_hash: client_operation_hash.into(),
            kind: EntryKind::TransferIn,
            counterparty: Some(from),
            created_at,
        }
    }

    pub fn operation_key(&self) -> OperationKey {
        OperationKey::new(
            self.account_id,
            Direction::of(self.amount),
            self.client_operation_hash.clone(),
        )
    }

    /// Attach the id the store assigned
    pub fn into_transaction(self, id: TransactionId) -> Transaction {
        Transaction {
            id,
            account_id: self.account_id,
            amount: self.amount,
            client_operation_hash: self.client_operation_hash,
            kind: self.kind,
            counterparty: self.counterparty,
            created_at: self.created_at,
        }
    }
}

/// Compare-and-swap balance write: applies only if the stored balance is still `expected`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceUpdate {
    pub account_id: AccountId,
    pub expected: i64,
    pub new: i64,
}

impl BalanceUpdate {
    pub fn new(account_id: AccountId, expected: i64, new: i64) -> Self {
        Self {
            account_id,
            expected,
            new,
        }
    }
}

/// Set of writes the store must commit all together or not at all
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerBatch {
    pub entries: Vec<NewEntry>,
    pub balances: Vec<BalanceUpdate>,
}

impl LedgerBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(mut self, entry: NewEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn balance(mut self, update: BalanceUpdate) -> Self {
        self.balances.push(update);
        self
    }

    /// For every account, the entries written must add up to its balance change
    pub fn is_consistent(&self) -> bool {
        let mut net: BTreeMap<AccountId, i128> = BTreeMap::new();
        for entry in &self.entries {
            *net.entry(entry.account_id).or_default() += i128::from(entry.amount);
        }
        for update in &self.balances {
            *net.entry(update.account_id).or_default() -=
                i128::from(update.new) - i128::from(update.expected);
        }
        net.values().all(|delta| *delta == 0)
    }
}

/// Uniqueness constraints enforced by every store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Constraint {
    /// Account names are unique
    AccountName,
    /// `(account, direction, client token)` is unique across entries
    OperationKey,
}

/// Failures raised by a [`LedgerStorage`](crate::LedgerStorage) backend
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Unique constraint violated: {0:?}")]
    UniqueViolation(Constraint),
    #[error("Balance conflict on account {account_id}: expected {expected}, found {actual}")]
    Conflict {
        account_id: AccountId,
        expected: i64,
        actual: i64,
    },
    #[error("Account missing from store: {0}")]
    MissingAccount(AccountId),
    #[error("Batch entries do not match its balance updates")]
    Unbalanced,
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Errors that can occur in the ledger system
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Account with name '{0}' already exists")]
    AlreadyExists(String),
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),
    #[error("Insufficient balance on account {account_id}: required {required}, available {available}")]
    InsufficientBalance {
        account_id: AccountId,
        required: i64,
        available: i64,
    },
    #[error("Invalid amount: {0}")]
    InvalidAmount(i64),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Owner {owner_id} is not allowed to {action} account {account_id}")]
    Unauthorized {
        owner_id: OwnerId,
        account_id: AccountId,
        action: Action,
    },
    #[error("Timed out after {waited_ms}ms waiting for account {account_id}")]
    LockTimeout { account_id: AccountId, waited_ms: u64 },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl LedgerError {
    /// Whether resubmitting the same operation with the same token may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::LockTimeout { .. } | LedgerError::Storage(StorageError::Conflict { .. })
        )
    }

    pub(crate) fn unique_violation(&self) -> Option<Constraint> {
        match self {
            LedgerError::Storage(StorageError::UniqueViolation(constraint)) => Some(*constraint),
            _ => None,
        }
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
