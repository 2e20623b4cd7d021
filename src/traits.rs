//! Traits for storage abstraction and extensibility

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::ledger::idempotency::OperationKey;
use crate::types::*;
use crate::utils::validation::validate_account_name;

/// Storage abstraction for the ledger system
///
/// This trait allows the ledger to work with any storage backend
/// (PostgreSQL, SQLite, in-memory, etc.). Implementations must enforce the
/// uniqueness constraints named in [`Constraint`] and must apply a
/// [`LedgerBatch`] atomically: either every entry and balance update in it
/// becomes visible, or none does.
#[async_trait]
pub trait LedgerStorage: Send + Sync {
    /// Insert an account with a zero balance, assigning its id
    ///
    /// Fails with `StorageError::UniqueViolation(Constraint::AccountName)`
    /// if the name is taken.
    async fn insert_account(&self, account: NewAccount) -> LedgerResult<Account>;

    /// Get an account by ID
    async fn get_account(&self, account_id: AccountId) -> LedgerResult<Option<Account>>;

    /// Get an account by its unique name
    async fn find_account_by_name(&self, name: &str) -> LedgerResult<Option<Account>>;

    /// List accounts ordered by id, optionally restricted to one owner
    async fn list_accounts(&self, owner_id: Option<OwnerId>) -> LedgerResult<Vec<Account>>;

    /// Look up the entry occupying a deduplication key
    async fn find_entry(&self, key: &OperationKey) -> LedgerResult<Option<Transaction>>;

    /// Atomically apply a batch of entries and compare-and-swap balance updates
    ///
    /// Returns the inserted entries with their assigned ids. On any failure
    /// nothing from the batch is persisted.
    async fn commit(&self, batch: LedgerBatch) -> LedgerResult<Vec<Transaction>>;

    /// Entries of one account ordered by `created_at` then id
    ///
    /// With a range, only entries strictly between the two instants are returned.
    async fn account_entries(
        &self,
        account_id: AccountId,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> LedgerResult<Vec<Transaction>>;

    /// Total number of entries in the ledger
    async fn entry_count(&self) -> LedgerResult<usize>;
}

/// Trait for implementing custom account validation rules
pub trait AccountValidator: Send + Sync {
    /// Validate an account before it is inserted
    fn validate_account(&self, account: &NewAccount) -> LedgerResult<()>;
}

/// Default account validator: non-empty names within a length limit
pub struct DefaultAccountValidator {
    pub max_name_len: usize,
}

impl Default for DefaultAccountValidator {
    fn default() -> Self {
        Self { max_name_len: 100 }
    }
}

impl AccountValidator for DefaultAccountValidator {
    fn validate_account(&self, account: &NewAccount) -> LedgerResult<()> {
        validate_account_name(&account.name, self.max_name_len)
    }
}

/// Authorization seam consulted before any operation touches an existing account
pub trait AccessPolicy: Send + Sync {
    fn authorize(&self, caller: &Caller, account: &Account, action: Action) -> LedgerResult<()>;
}

/// Permits every operation; the single-tenant default
pub struct AllowAllPolicy;

impl AccessPolicy for AllowAllPolicy {
    fn authorize(&self, _caller: &Caller, _account: &Account, _action: Action) -> LedgerResult<()> {
        Ok(())
    }
}

/// Restricts reads and withdrawals to the account owner; anyone may deposit
pub struct OwnerOnlyPolicy;

impl AccessPolicy for OwnerOnlyPolicy {
    fn authorize(&self, caller: &Caller, account: &Account, action: Action) -> LedgerResult<()> {
        if action == Action::Deposit || caller.owner_id == account.owner_id {
            return Ok(());
        }
        Err(LedgerError::Unauthorized {
            owner_id: caller.owner_id,
            account_id: account.id,
            action,
        })
    }
}
