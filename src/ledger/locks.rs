//! Per-account exclusive scopes

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::{timeout_at, Instant};

use crate::types::*;

/// Registry of one async mutex per account.
///
/// Accounts are never deleted, so slots live as long as the registry.
pub struct AccountLocks {
    slots: Mutex<HashMap<AccountId, Arc<AsyncMutex<()>>>>,
    timeout: Duration,
}

/// Held locks; dropping it releases every account
#[derive(Debug)]
pub struct AccountGuard {
    accounts: Vec<AccountId>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl AccountGuard {
    /// Accounts held, in acquisition order
    pub fn accounts(&self) -> &[AccountId] {
        &self.accounts
    }
}

impl AccountLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    fn slot(&self, account_id: AccountId) -> Arc<AsyncMutex<()>> {
        // The map only ever gains entries, so a poisoned guard still holds valid data.
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .entry(account_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Lock every account in `accounts` in ascending id order.
    ///
    /// Duplicates are locked once. The whole acquisition shares one deadline;
    /// on timeout every lock taken so far is released.
    pub async fn acquire(&self, accounts: &[AccountId]) -> LedgerResult<AccountGuard> {
        let mut ordered = accounts.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        let deadline = Instant::now() + self.timeout;
        let mut guards = Vec::with_capacity(ordered.len());
        for account_id in &ordered {
            let slot = self.slot(*account_id);
            match timeout_at(deadline, slot.lock_owned()).await {
                Ok(guard) => guards.push(guard),
                Err(_) => {
                    tracing::warn!(%account_id, "timed out waiting for account lock");
                    return Err(LedgerError::LockTimeout {
                        account_id: *account_id,
                        waited_ms: self.timeout.as_millis() as u64,
                    });
                }
            }
        }

        Ok(AccountGuard {
            accounts: ordered,
            _guards: guards,
        })
    }
}
