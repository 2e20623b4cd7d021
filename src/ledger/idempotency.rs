//! Deduplication of operations resubmitted under the same client token

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::traits::LedgerStorage;
use crate::types::*;

/// Key under which a ledger entry is unique: one entry per account, side and token.
///
/// A transfer is keyed by its debit leg on the source account, so a retried
/// transfer is recognised no matter which token its credit leg received.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationKey {
    pub account_id: AccountId,
    pub direction: Direction,
    pub token: String,
}

impl OperationKey {
    pub fn new(account_id: AccountId, direction: Direction, token: impl Into<String>) -> Self {
        Self {
            account_id,
            direction,
            token: token.into(),
        }
    }

    /// Key of a deposit into `account_id`
    pub fn credit(account_id: AccountId, token: impl Into<String>) -> Self {
        Self::new(account_id, Direction::Credit, token)
    }

    /// Key of a transfer out of `account_id`
    pub fn debit(account_id: AccountId, token: impl Into<String>) -> Self {
        Self::new(account_id, Direction::Debit, token)
    }
}

/// Fresh token for ledger entries the system creates on its own behalf
pub fn generate_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Result of committing a mutating operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The batch was committed; holds the inserted entries
    Applied(Vec<Transaction>),
    /// The operation had already been applied under the same key
    Replayed,
}

impl Outcome {
    pub fn is_replay(&self) -> bool {
        matches!(self, Outcome::Replayed)
    }
}

/// Checks and commits operations so each [`OperationKey`] is applied at most once
pub struct IdempotencyGuard<S: LedgerStorage> {
    storage: S,
}

impl<S: LedgerStorage> IdempotencyGuard<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Entry previously recorded under `key`, if any
    pub async fn previous(&self, key: &OperationKey) -> LedgerResult<Option<Transaction>> {
        self.storage.find_entry(key).await
    }

    /// Commit `batch`, treating a uniqueness violation on the operation key as a replay
    pub async fn commit_once(&self, key: &OperationKey, batch: LedgerBatch) -> LedgerResult<Outcome> {
        match self.storage.commit(batch).await {
            Ok(entries) => Ok(Outcome::Applied(entries)),
            Err(err) if err.unique_violation() == Some(Constraint::OperationKey) => {
                tracing::debug!(
                    account_id = %key.account_id,
                    token = %key.token,
                    "operation key already present at commit"
                );
                Ok(Outcome::Replayed)
            }
            Err(err) => Err(err),
        }
    }
}
