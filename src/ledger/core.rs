//! Main ledger orchestrator that coordinates accounts, transactions and reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::LedgerConfig;
use crate::ledger::{AccountLocks, AccountRegistry, HistoryReporter, OpFilter, ReportLine, TransactionEngine};
use crate::traits::*;
use crate::types::*;

/// Main ledger system that orchestrates all wallet operations
///
/// The store handle is supplied by whoever wires the ledger up; every
/// component shares it, along with one lock registry.
pub struct Ledger<S: LedgerStorage> {
    config: LedgerConfig,
    storage: S,
    account_registry: AccountRegistry<S>,
    transaction_engine: TransactionEngine<S>,
    history_reporter: HistoryReporter<S>,
}

impl<S: LedgerStorage + Clone> Ledger<S> {
    /// Create a new ledger with the given storage backend and default configuration
    pub fn new(storage: S) -> Self {
        let config = LedgerConfig::default();
        let validator = DefaultAccountValidator {
            max_name_len: config.max_name_len,
        };
        Self::build(storage, config, Box::new(validator), Arc::new(AllowAllPolicy))
    }

    /// Create a new ledger with explicit configuration
    ///
    /// Fails with [`LedgerError::Config`] if `config` does not validate.
    pub fn with_config(storage: S, config: LedgerConfig) -> LedgerResult<Self> {
        let validator = DefaultAccountValidator {
            max_name_len: config.max_name_len,
        };
        Self::with_validators(storage, config, Box::new(validator), Arc::new(AllowAllPolicy))
    }

    /// Create a new ledger with a custom account validator and access policy
    pub fn with_validators(
        storage: S,
        config: LedgerConfig,
        account_validator: Box<dyn AccountValidator>,
        access_policy: Arc<dyn AccessPolicy>,
    ) -> LedgerResult<Self> {
        config.validate()?;
        Ok(Self::build(storage, config, account_validator, access_policy))
    }

    fn build(
        storage: S,
        config: LedgerConfig,
        account_validator: Box<dyn AccountValidator>,
        access_policy: Arc<dyn AccessPolicy>,
    ) -> Self {
        let locks = Arc::new(AccountLocks::new(config.lock_timeout()));
        Self {
            account_registry: AccountRegistry::with_validator(
                storage.clone(),
                account_validator,
                access_policy.clone(),
            ),
            transaction_engine: TransactionEngine::with_policy(
                storage.clone(),
                locks,
                access_policy.clone(),
            ),
            history_reporter: HistoryReporter::with_options(
                storage.clone(),
                access_policy,
                config.date_granularity,
                config.report_capacity,
            ),
            storage,
            config,
        }
    }
}

impl<S: LedgerStorage> Ledger<S> {
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // Account operations
    /// Create a new account owned by the caller
    pub async fn create_account(&self, caller: &Caller, name: &str) -> LedgerResult<AccountId> {
        self.account_registry
            .create_account(caller.owner_id, name)
            .await
    }

    /// Get an account by ID
    pub async fn get_account(&self, caller: &Caller, account_id: AccountId) -> LedgerResult<Account> {
        self.account_registry.get_account(caller, account_id).await
    }

    /// Get an account by name
    pub async fn find_account_by_name(&self, name: &str) -> LedgerResult<Option<Account>> {
        self.account_registry.find_account_by_name(name).await
    }

    /// List the caller's accounts
    pub async fn list_accounts(&self, caller: &Caller) -> LedgerResult<Vec<Account>> {
        self.account_registry.list_accounts(caller.owner_id).await
    }

    /// Current balance of an account
    pub async fn balance(&self, caller: &Caller, account_id: AccountId) -> LedgerResult<i64> {
        self.account_registry.balance(caller, account_id).await
    }

    // Transaction operations
    /// Credit an account; idempotent per `(account, client_operation_hash)`
    pub async fn deposit(
        &self,
        caller: &Caller,
        account_id: AccountId,
        amount: i64,
        client_operation_hash: &str,
    ) -> LedgerResult<()> {
        self.transaction_engine
            .deposit(caller, account_id, amount, client_operation_hash)
            .await
    }

    /// Move funds between accounts; idempotent per `(from_id, client_operation_hash)`
    pub async fn transfer(
        &self,
        caller: &Caller,
        from_id: AccountId,
        to_id: AccountId,
        amount: i64,
        client_operation_hash: &str,
    ) -> LedgerResult<()> {
        self.transaction_engine
            .transfer(caller, from_id, to_id, amount, client_operation_hash)
            .await
    }

    // Reporting operations
    /// Report entries strictly between two instants
    pub async fn report(
        &self,
        caller: &Caller,
        account_id: AccountId,
        date_from: DateTime<Utc>,
        date_to: DateTime<Utc>,
        op_filter: OpFilter,
    ) -> LedgerResult<Vec<ReportLine>> {
        self.history_reporter
            .report(caller, account_id, date_from, date_to, op_filter)
            .await
    }

    /// Full entry log of an account
    pub async fn history(&self, caller: &Caller, account_id: AccountId) -> LedgerResult<Vec<Transaction>> {
        self.history_reporter.history(caller, account_id).await
    }

    /// Validate the integrity of the ledger
    ///
    /// Every stored balance must equal the sum of its account's entries and
    /// must not be negative. Totals are accumulated as `i128`.
    pub async fn verify_integrity(&self) -> LedgerResult<LedgerIntegrityReport> {
        let accounts = self.account_registry.list_all_accounts().await?;
        let mut issues = Vec::new();
        let mut total_balance: i128 = 0;
        let mut total_entries: i128 = 0;

        for account in &accounts {
            let entries = self.storage.account_entries(account.id, None).await?;
            let sum: i128 = entries.iter().map(|txn| i128::from(txn.amount)).sum();

            if sum != i128::from(account.balance) {
                issues.push(format!(
                    "Account {} balance {} does not match entry sum {}",
                    account.id, account.balance, sum
                ));
            }
            if account.balance < 0 {
                issues.push(format!(
                    "Account {} has negative balance {}",
                    account.id, account.balance
                ));
            }

            total_balance += i128::from(account.balance);
            total_entries += sum;
        }

        let entry_count = self.storage.entry_count().await?;
        if total_balance != total_entries {
            issues.push(format!(
                "Total balance {} does not match total of entries {}",
                total_balance, total_entries
            ));
        }

        if !issues.is_empty() {
            tracing::warn!(issues = issues.len(), "ledger integrity check failed");
        }

        Ok(LedgerIntegrityReport {
            checked_at: Utc::now(),
            is_valid: issues.is_empty(),
            issues,
            account_count: accounts.len(),
            entry_count,
            total_balance,
        })
    }
}

/// Report on ledger integrity and validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerIntegrityReport {
    pub checked_at: DateTime<Utc>,
    pub is_valid: bool,
    pub issues: Vec<String>,
    pub account_count: usize,
    pub entry_count: usize,
    pub total_balance: i128,
}
