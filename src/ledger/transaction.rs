//! Transaction processing: deposits and transfers

use chrono::Utc;
use std::sync::Arc;

use crate::ledger::idempotency::{generate_token, IdempotencyGuard, OperationKey, Outcome};
use crate::ledger::locks::AccountLocks;
use crate::traits::*;
use crate::types::*;
use crate::utils::validation::{validate_operation_token, validate_positive_amount};

/// Transaction engine applying balance-changing operations.
///
/// Every mutation runs inside the exclusive scope of the accounts it touches:
/// the balance is read, checked and committed while the locks are held, and
/// the store's compare-and-swap balance update rejects any write whose read
/// went stale anyway.
pub struct TransactionEngine<S: LedgerStorage> {
    storage: S,
    locks: Arc<AccountLocks>,
    guard: IdempotencyGuard<S>,
    policy: Arc<dyn AccessPolicy>,
}

impl<S: LedgerStorage + Clone> TransactionEngine<S> {
    /// Create a new transaction engine
    pub fn new(storage: S, locks: Arc<AccountLocks>) -> Self {
        Self::with_policy(storage, locks, Arc::new(AllowAllPolicy))
    }

    /// Create a new transaction engine with a custom access policy
    pub fn with_policy(storage: S, locks: Arc<AccountLocks>, policy: Arc<dyn AccessPolicy>) -> Self {
        Self {
            guard: IdempotencyGuard::new(storage.clone()),
            storage,
            locks,
            policy,
        }
    }
}

impl<S: LedgerStorage> TransactionEngine<S> {
    async fn require_account(&self, account_id: AccountId) -> LedgerResult<Account> {
        self.storage
            .get_account(account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))
    }

    /// Credit `amount` to an account.
    ///
    /// Resubmitting the same `client_operation_hash` for the same account is
    /// a successful no-op. Deposits are keyed on the credit side only, so a
    /// token already used by a transfer out of this account does not block a
    /// deposit.
    #[tracing::instrument(skip(self, caller), fields(owner_id = %caller.owner_id))]
    pub async fn deposit(
        &self,
        caller: &Caller,
        account_id: AccountId,
        amount: i64,
        client_operation_hash: &str,
    ) -> LedgerResult<()> {
        validate_positive_amount(amount)?;
        validate_operation_token(client_operation_hash)?;

        let account = self.require_account(account_id).await?;
        self.policy.authorize(caller, &account, Action::Deposit)?;

        let key = OperationKey::credit(account_id, client_operation_hash);
        let _scope = self.locks.acquire(&[account_id]).await?;

        if self.guard.previous(&key).await?.is_some() {
            tracing::debug!("deposit already applied");
            return Ok(());
        }

        // Re-read under the lock; the earlier read only established existence.
        let account = self.require_account(account_id).await?;
        let new_balance = account
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::InvalidAmount(amount))?;

        let batch = LedgerBatch::new()
            .entry(NewEntry::deposit(
                account_id,
                amount,
                client_operation_hash,
                Utc::now(),
            ))
            .balance(BalanceUpdate::new(account_id, account.balance, new_balance));

        match self.guard.commit_once(&key, batch).await? {
            Outcome::Applied(_) => tracing::info!(balance = new_balance, "deposit applied"),
            Outcome::Replayed => tracing::debug!("deposit already applied"),
        }
        Ok(())
    }

    /// Move `amount` from one account to another as a single atomic unit.
    ///
    /// Both accounts must exist before anything is locked. A transfer to the
    /// same account is allowed: it still needs the funds, writes both legs and
    /// leaves the balance unchanged.
    #[tracing::instrument(skip(self, caller), fields(owner_id = %caller.owner_id))]
    pub async fn transfer(
        &self,
        caller: &Caller,
        from_id: AccountId,
        to_id: AccountId,
        amount: i64,
        client_operation_hash: &str,
    ) -> LedgerResult<()> {
        validate_positive_amount(amount)?;
        validate_operation_token(client_operation_hash)?;

        let from = self.require_account(from_id).await?;
        let to = self.require_account(to_id).await?;
        self.policy.authorize(caller, &from, Action::Withdraw)?;
        self.policy.authorize(caller, &to, Action::Deposit)?;

        let key = OperationKey::debit(from_id, client_operation_hash);
        let _scope = self.locks.acquire(&[from_id, to_id]).await?;

        if self.guard.previous(&key).await?.is_some() {
            tracing::debug!("transfer already applied");
            return Ok(());
        }

        let from = self.require_account(from_id).await?;
        if !from.can_debit(amount) {
            tracing::warn!(available = from.balance, "insufficient balance");
            return Err(LedgerError::InsufficientBalance {
                account_id: from_id,
                required: amount,
                available: from.balance,
            });
        }

        let now = Utc::now();
        let mut batch = LedgerBatch::new()
            .entry(NewEntry::transfer_out(
                from_id,
                to_id,
                amount,
                client_operation_hash,
                now,
            ))
            .entry(NewEntry::transfer_in(
                to_id,
                from_id,
                amount,
                generate_token(),
                now,
            ));

        if from_id == to_id {
            batch = batch.balance(BalanceUpdate::new(from_id, from.balance, from.balance));
        } else {
            let to = self.require_account(to_id).await?;
            let credited = to
                .balance
                .checked_add(amount)
                .ok_or(LedgerError::InvalidAmount(amount))?;
            batch = batch
                .balance(BalanceUpdate::new(from_id, from.balance, from.balance - amount))
                .balance(BalanceUpdate::new(to_id, to.balance, credited));
        }

        match self.guard.commit_once(&key, batch).await? {
            Outcome::Applied(_) => tracing::info!(%from_id, %to_id, amount, "transfer applied"),
            Outcome::Replayed => tracing::debug!("transfer already applied"),
        }
        Ok(())
    }
}
