//! In-memory storage implementation for testing

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::ledger::idempotency::OperationKey;
use crate::traits::*;
use crate::types::*;

#[derive(Debug, Default)]
struct MemoryState {
    accounts: BTreeMap<AccountId, Account>,
    names: HashMap<String, AccountId>,
    /// Append-only, in id order
    entries: Vec<Transaction>,
    keys: HashMap<OperationKey, usize>,
    last_account_id: i64,
    last_entry_id: i64,
}

impl MemoryState {
    /// Check every precondition of `batch` without mutating anything
    fn check(&self, batch: &LedgerBatch) -> LedgerResult<()> {
        if !batch.is_consistent() {
            return Err(StorageError::Unbalanced.into());
        }

        for update in &batch.balances {
            let account = self
                .accounts
                .get(&update.account_id)
                .ok_or(StorageError::MissingAccount(update.account_id))?;
            if account.balance != update.expected {
                return Err(StorageError::Conflict {
                    account_id: update.account_id,
                    expected: update.expected,
                    actual: account.balance,
                }
                .into());
            }
        }

        let mut seen = HashSet::with_capacity(batch.entries.len());
        for entry in &batch.entries {
            if !self.accounts.contains_key(&entry.account_id) {
                return Err(StorageError::MissingAccount(entry.account_id).into());
            }
            let key = entry.operation_key();
            if self.keys.contains_key(&key) || !seen.insert(key) {
                return Err(StorageError::UniqueViolation(Constraint::OperationKey).into());
            }
        }

        Ok(())
    }
}

/// In-memory storage implementation for testing and development
///
/// A single lock guards all state, so a batch is checked and applied as one
/// step and readers never observe half of it.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    state: Arc<RwLock<MemoryState>>,
    fail_next_commit: Arc<AtomicBool>,
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `commit` fail with a backend error (useful for testing)
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Set a stored balance without writing an entry (useful for testing)
    #[cfg(test)]
    pub(crate) fn overwrite_balance(&self, account_id: AccountId, balance: i64) {
        let mut state = self.state.write().unwrap();
        if let Some(account) = state.accounts.get_mut(&account_id) {
            account.balance = balance;
        }
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) -> LedgerResult<()> {
        *self.write()? = MemoryState::default();
        Ok(())
    }

    fn read(&self) -> LedgerResult<RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|_| StorageError::Backend("memory state lock poisoned".to_string()).into())
    }

    fn write(&self) -> LedgerResult<RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|_| StorageError::Backend("memory state lock poisoned".to_string()).into())
    }
}

#[async_trait]
impl LedgerStorage for MemoryStorage {
    async fn insert_account(&self, account: NewAccount) -> LedgerResult<Account> {
        let mut state = self.write()?;
        if state.names.contains_key(&account.name) {
            return Err(StorageError::UniqueViolation(Constraint::AccountName).into());
        }

        state.last_account_id += 1;
        let id = AccountId(state.last_account_id);
        let created = Account::new(id, account.owner_id, account.name);
        state.names.insert(created.name.clone(), id);
        state.accounts.insert(id, created.clone());
        Ok(created)
    }

    async fn get_account(&self, account_id: AccountId) -> LedgerResult<Option<Account>> {
        Ok(self.read()?.accounts.get(&account_id).cloned())
    }

    async fn find_account_by_name(&self, name: &str) -> LedgerResult<Option<Account>> {
        let state = self.read()?;
        Ok(state
            .names
            .get(name)
            .and_then(|id| state.accounts.get(id))
            .cloned())
    }

    async fn list_accounts(&self, owner_id: Option<OwnerId>) -> LedgerResult<Vec<Account>> {
        let state = self.read()?;
        let filtered: Vec<Account> = state
            .accounts
            .values()
            .filter(|account| owner_id.is_none_or(|owner| account.owner_id == owner))
            .cloned()
            .collect();
        Ok(filtered)
    }

    async fn find_entry(&self, key: &OperationKey) -> LedgerResult<Option<Transaction>> {
        let state = self.read()?;
        Ok(state
            .keys
            .get(key)
            .and_then(|index| state.entries.get(*index))
            .cloned())
    }

    async fn commit(&self, batch: LedgerBatch) -> LedgerResult<Vec<Transaction>> {
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Backend("injected commit failure".to_string()).into());
        }

        let mut state = self.write()?;
        state.check(&batch)?;

        let now = Utc::now();
        for update in &batch.balances {
            if let Some(account) = state.accounts.get_mut(&update.account_id) {
                account.balance = update.new;
                account.updated_at = now;
            }
        }

        let mut inserted = Vec::with_capacity(batch.entries.len());
        for entry in batch.entries {
            state.last_entry_id += 1;
            let transaction = entry.into_transaction(TransactionId(state.last_entry_id));
            let index = state.entries.len();
            state.keys.insert(transaction.operation_key(), index);
            state.entries.push(transaction.clone());
            inserted.push(transaction);
        }

        Ok(inserted)
    }

    async fn account_entries(
        &self,
        account_id: AccountId,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> LedgerResult<Vec<Transaction>> {
        let state = self.read()?;
        let mut filtered: Vec<Transaction> = state
            .entries
            .iter()
            .filter(|txn| txn.account_id == account_id)
            .filter(|txn| {
                range.is_none_or(|(from, to)| txn.created_at > from && txn.created_at < to)
            })
            .cloned()
            .collect();
        filtered.sort_by_key(|txn| (txn.created_at, txn.id));
        Ok(filtered)
    }

    async fn entry_count(&self) -> LedgerResult<usize> {
        Ok(self.read()?.entries.len())
    }
}
