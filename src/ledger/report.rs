//! History reporting over the transaction log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::DateGranularity;
use crate::traits::*;
use crate::types::*;

/// Which entries a report includes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpFilter {
    #[default]
    Any,
    /// Credits only (amount > 0)
    DepositsOnly,
    /// Debits only (amount < 0)
    WithdrawalsOnly,
}

impl OpFilter {
    pub fn matches(&self, amount: i64) -> bool {
        match self {
            OpFilter::Any => true,
            OpFilter::DepositsOnly => amount > 0,
            OpFilter::WithdrawalsOnly => amount < 0,
        }
    }
}

/// Wire codes used by API clients: 0 any, 1 deposits, 2 withdrawals
impl TryFrom<i32> for OpFilter {
    type Error = LedgerError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(OpFilter::Any),
            1 => Ok(OpFilter::DepositsOnly),
            2 => Ok(OpFilter::WithdrawalsOnly),
            other => Err(LedgerError::Validation(format!(
                "unknown operation filter code: {}",
                other
            ))),
        }
    }
}

/// One row of a history report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportLine {
    pub amount: i64,
    pub date: DateTime<Utc>,
}

impl From<&Transaction> for ReportLine {
    fn from(txn: &Transaction) -> Self {
        Self {
            amount: txn.amount,
            date: txn.created_at,
        }
    }
}

/// Open interval `(from, to)` of report instants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DateRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    /// Build a range from epoch seconds as sent by API clients
    pub fn from_unix(from_secs: i64, to_secs: i64) -> LedgerResult<Self> {
        let convert = |secs: i64| {
            DateTime::from_timestamp(secs, 0).ok_or_else(|| {
                LedgerError::Validation(format!("timestamp out of range: {}", secs))
            })
        };
        Ok(Self::new(convert(from_secs)?, convert(to_secs)?))
    }

    pub fn is_empty(&self) -> bool {
        self.from >= self.to
    }

    pub fn with_granularity(self, granularity: DateGranularity) -> Self {
        Self::new(granularity.truncate(self.from), granularity.truncate(self.to))
    }
}

/// History reporter answering range and direction filtered queries
pub struct HistoryReporter<S: LedgerStorage> {
    storage: S,
    policy: Arc<dyn AccessPolicy>,
    granularity: DateGranularity,
    capacity: usize,
}

impl<S: LedgerStorage> HistoryReporter<S> {
    pub fn new(storage: S) -> Self {
        Self::with_options(storage, Arc::new(AllowAllPolicy), DateGranularity::Instant, 100)
    }

    pub fn with_options(
        storage: S,
        policy: Arc<dyn AccessPolicy>,
        granularity: DateGranularity,
        capacity: usize,
    ) -> Self {
        Self {
            storage,
            policy,
            granularity,
            capacity,
        }
    }

    async fn readable_account(&self, caller: &Caller, account_id: AccountId) -> LedgerResult<Account> {
        let account = self
            .storage
            .get_account(account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))?;
        self.policy.authorize(caller, &account, Action::Read)?;
        Ok(account)
    }

    /// Entries of `account_id` strictly between `date_from` and `date_to`,
    /// oldest first, restricted by `op_filter`
    #[tracing::instrument(skip(self, caller), fields(owner_id = %caller.owner_id))]
    pub async fn report(
        &self,
        caller: &Caller,
        account_id: AccountId,
        date_from: DateTime<Utc>,
        date_to: DateTime<Utc>,
        op_filter: OpFilter,
    ) -> LedgerResult<Vec<ReportLine>> {
        self.readable_account(caller, account_id).await?;

        let range = DateRange::new(date_from, date_to).with_granularity(self.granularity);
        if range.is_empty() {
            return Ok(Vec::new());
        }

        let entries = self
            .storage
            .account_entries(account_id, Some((range.from, range.to)))
            .await?;

        let mut lines = Vec::with_capacity(self.capacity.min(entries.len()));
        lines.extend(
            entries
                .iter()
                .filter(|txn| op_filter.matches(txn.amount))
                .map(ReportLine::from),
        );
        tracing::debug!(lines = lines.len(), "report built");
        Ok(lines)
    }

    /// Every entry of an account, oldest first
    pub async fn history(&self, caller: &Caller, account_id: AccountId) -> LedgerResult<Vec<Transaction>> {
        self.readable_account(caller, account_id).await?;
        self.storage.account_entries(account_id, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::memory_storage::MemoryStorage;
    use chrono::{Duration, TimeZone};

    async fn seeded(at: &[(i64, DateTime<Utc>)]) -> (MemoryStorage, AccountId) {
        let storage = MemoryStorage::new();
        let account = storage
            .insert_account(NewAccount::new(OwnerId::DEFAULT, "alice"))
            .await
            .unwrap();
        let mut balance = 0;
        for (i, (amount, when)) in at.iter().enumerate() {
            let batch = LedgerBatch::new()
                .entry(NewEntry::deposit(account.id, *amount, format!("t{}", i), *when))
                .balance(BalanceUpdate::new(account.id, balance, balance + amount));
            storage.commit(batch).await.unwrap();
            balance += amount;
        }
        (storage, account.id)
    }

    #[test]
    fn filter_codes() {
        assert_eq!(OpFilter::try_from(0).unwrap(), OpFilter::Any);
        assert_eq!(OpFilter::try_from(2).unwrap(), OpFilter::WithdrawalsOnly);
        assert!(OpFilter::try_from(7).is_err());
        assert!(OpFilter::DepositsOnly.matches(5));
        assert!(!OpFilter::DepositsOnly.matches(-5));
    }

    #[test]
    fn unix_range_conversion() {
        let range = DateRange::from_unix(0, 86_400).unwrap();
        assert_eq!(range.to, Utc.with_ymd_and_hms(1970, 1, 2, 0, 0, 0).unwrap());
        assert!(DateRange::from_unix(i64::MAX, 0).is_err());
    }

    #[tokio::test]
    async fn report_is_ordered_and_bounds_are_exclusive() {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let (storage, account) = seeded(&[
            (30, base + Duration::hours(2)),
            (10, base),
            (20, base + Duration::hours(1)),
        ])
        .await;
        let reporter = HistoryReporter::new(storage);

        let lines = reporter
            .report(
                &Caller::default(),
                account,
                base,
                base + Duration::hours(3),
                OpFilter::Any,
            )
            .await
            .unwrap();
        let amounts: Vec<i64> = lines.iter().map(|l| l.amount).collect();
        assert_eq!(amounts, vec![20, 30]);
    }

    #[tokio::test]
    async fn day_granularity_widens_to_midnight() {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let (storage, account) = seeded(&[(10, base)]).await;
        let reporter = HistoryReporter::with_options(
            storage,
            Arc::new(AllowAllPolicy),
            DateGranularity::Day,
            16,
        );

        // Bounds at 13:00 on the same day truncate to midnight and include 12:00.
        let lines = reporter
            .report(
                &Caller::default(),
                account,
                base + Duration::hours(1),
                base + Duration::days(1),
                OpFilter::Any,
            )
            .await
            .unwrap();
        assert_eq!(lines.len(), 1);
    }

    #[tokio::test]
    async fn unknown_account_and_empty_range() {
        let (storage, account) = seeded(&[]).await;
        let reporter = HistoryReporter::new(storage);
        let now = Utc::now();

        assert!(matches!(
            reporter
                .report(&Caller::default(), AccountId(404), now, now, OpFilter::Any)
                .await,
            Err(LedgerError::AccountNotFound(_))
        ));
        assert!(reporter
            .report(&Caller::default(), account, now, now - Duration::days(1), OpFilter::Any)
            .await
            .unwrap()
            .is_empty());
        assert!(reporter
            .history(&Caller::default(), account)
            .await
            .unwrap()
            .is_empty());
    }
}
