//! Account management functionality

use std::sync::Arc;

use crate::traits::*;
use crate::types::*;

/// Account registry: creates accounts under unique names and serves lookups
pub struct AccountRegistry<S: LedgerStorage> {
    pub(crate) storage: S,
    validator: Box<dyn AccountValidator>,
    policy: Arc<dyn AccessPolicy>,
}

impl<S: LedgerStorage> AccountRegistry<S> {
    /// Create a new account registry
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            validator: Box::new(DefaultAccountValidator::default()),
            policy: Arc::new(AllowAllPolicy),
        }
    }

    /// Create a new account registry with custom validator and access policy
    pub fn with_validator(
        storage: S,
        validator: Box<dyn AccountValidator>,
        policy: Arc<dyn AccessPolicy>,
    ) -> Self {
        Self {
            storage,
            validator,
            policy,
        }
    }

    /// Create a new account with a zero balance
    ///
    /// A name that is already taken fails with [`LedgerError::AlreadyExists`],
    /// whether the duplicate is seen by the lookup or by the store's unique
    /// constraint when two creations race.
    #[tracing::instrument(skip(self))]
    pub async fn create_account(&self, owner_id: OwnerId, name: &str) -> LedgerResult<AccountId> {
        let account = NewAccount::new(owner_id, name);

        // Validate the account
        self.validator.validate_account(&account)?;

        // Check if account already exists
        if self.storage.find_account_by_name(name).await?.is_some() {
            tracing::warn!("account name already taken");
            return Err(LedgerError::AlreadyExists(name.to_string()));
        }

        match self.storage.insert_account(account).await {
            Ok(created) => {
                tracing::info!(account_id = %created.id, "account created");
                Ok(created.id)
            }
            Err(err) if err.unique_violation() == Some(Constraint::AccountName) => {
                tracing::warn!("account name taken by a concurrent creation");
                Err(LedgerError::AlreadyExists(name.to_string()))
            }
            Err(err) => Err(err),
        }
    }

    /// Get an account by ID, returning an error if not found
    pub async fn get_account_required(&self, account_id: AccountId) -> LedgerResult<Account> {
        self.storage
            .get_account(account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))
    }

    /// Get an account the caller is allowed to read
    pub async fn get_account(&self, caller: &Caller, account_id: AccountId) -> LedgerResult<Account> {
        let account = self.get_account_required(account_id).await?;
        self.policy.authorize(caller, &account, Action::Read)?;
        Ok(account)
    }

    /// Get an account by its unique name
    pub async fn find_account_by_name(&self, name: &str) -> LedgerResult<Option<Account>> {
        self.storage.find_account_by_name(name).await
    }

    /// List the accounts owned by `owner_id`, ordered by id
    pub async fn list_accounts(&self, owner_id: OwnerId) -> LedgerResult<Vec<Account>> {
        self.storage.list_accounts(Some(owner_id)).await
    }

    /// List every account, ordered by id
    pub async fn list_all_accounts(&self) -> LedgerResult<Vec<Account>> {
        self.storage.list_accounts(None).await
    }

    /// Get account balance
    pub async fn balance(&self, caller: &Caller, account_id: AccountId) -> LedgerResult<i64> {
        Ok(self.get_account(caller, account_id).await?.balance)
    }
}
