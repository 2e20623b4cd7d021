//! SQLite storage implementation backed by `sqlx`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;

use crate::ledger::idempotency::OperationKey;
use crate::traits::*;
use crate::types::*;

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS accounts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner_id INTEGER NOT NULL,
        name TEXT NOT NULL UNIQUE,
        balance INTEGER NOT NULL DEFAULT 0 CHECK (balance >= 0),
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS transactions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        account_id INTEGER NOT NULL REFERENCES accounts (id),
        amount INTEGER NOT NULL,
        direction TEXT NOT NULL,
        client_operation_hash TEXT NOT NULL,
        kind TEXT NOT NULL,
        counterparty INTEGER REFERENCES accounts (id),
        created_at INTEGER NOT NULL,
        UNIQUE (account_id, direction, client_operation_hash)
    )",
    "CREATE INDEX IF NOT EXISTS transactions_account_created
        ON transactions (account_id, created_at)",
];

/// Relational storage with the same atomicity and uniqueness guarantees as
/// [`MemoryStorage`](super::MemoryStorage)
///
/// Timestamps are stored as microseconds since the epoch so range filters
/// compare numerically.
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Connect to `url` (e.g. `sqlite:wallet.db` or `sqlite::memory:`) and create the schema
    pub async fn connect(url: &str) -> LedgerResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(StorageError::from)?
            .create_if_missing(true)
            .foreign_keys(true);
        // An in-memory database exists per connection, so it must not be pooled wider.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(StorageError::from)?;
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, creating the schema if needed
    pub async fn from_pool(pool: SqlitePool) -> LedgerResult<Self> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(StorageError::from)?;
        }
        Ok(Self { pool })
    }

    /// Get SQLite connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn micros(instant: DateTime<Utc>) -> i64 {
    instant.timestamp_micros()
}

fn from_micros(value: i64) -> LedgerResult<DateTime<Utc>> {
    DateTime::from_timestamp_micros(value)
        .ok_or_else(|| StorageError::Backend(format!("timestamp out of range: {}", value)).into())
}

fn constraint_error(err: sqlx::Error, constraint: Constraint) -> StorageError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StorageError::UniqueViolation(constraint)
        }
        _ => StorageError::Sqlx(err),
    }
}

fn account_from_row(row: &SqliteRow) -> LedgerResult<Account> {
    let owner: i64 = row.try_get("owner_id").map_err(StorageError::from)?;
    Ok(Account {
        id: AccountId(row.try_get("id").map_err(StorageError::from)?),
        owner_id: OwnerId(
            u32::try_from(owner)
                .map_err(|_| StorageError::Backend(format!("invalid owner id: {}", owner)))?,
        ),
        name: row.try_get("name").map_err(StorageError::from)?,
        balance: row.try_get("balance").map_err(StorageError::from)?,
        created_at: from_micros(row.try_get("created_at").map_err(StorageError::from)?)?,
        updated_at: from_micros(row.try_get("updated_at").map_err(StorageError::from)?)?,
    })
}

fn entry_from_row(row: &SqliteRow) -> LedgerResult<Transaction> {
    let kind: String = row.try_get("kind").map_err(StorageError::from)?;
    let counterparty: Option<i64> = row.try_get("counterparty").map_err(StorageError::from)?;
    Ok(Transaction {
        id: TransactionId(row.try_get("id").map_err(StorageError::from)?),
        account_id: AccountId(row.try_get("account_id").map_err(StorageError::from)?),
        amount: row.try_get("amount").map_err(StorageError::from)?,
        client_operation_hash: row
            .try_get("client_operation_hash")
            .map_err(StorageError::from)?,
        kind: EntryKind::parse(&kind)
            .ok_or_else(|| StorageError::Backend(format!("unknown entry kind: {}", kind)))?,
        counterparty: counterparty.map(AccountId),
        created_at: from_micros(row.try_get("created_at").map_err(StorageError::from)?)?,
    })
}

#[async_trait]
impl LedgerStorage for SqliteStorage {
    async fn insert_account(&self, account: NewAccount) -> LedgerResult<Account> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO accounts (owner_id, name, balance, created_at, updated_at)
             VALUES (?, ?, 0, ?, ?)",
        )
        .bind(i64::from(account.owner_id.0))
        .bind(&account.name)
        .bind(micros(now))
        .bind(micros(now))
        .execute(&self.pool)
        .await
        .map_err(|e| constraint_error(e, Constraint::AccountName))?;

        let id = AccountId(result.last_insert_rowid());
        self.get_account(id)
            .await?
            .ok_or_else(|| StorageError::MissingAccount(id).into())
    }

    async fn get_account(&self, account_id: AccountId) -> LedgerResult<Option<Account>> {
        let row = sqlx::query("SELECT * FROM accounts WHERE id = ?")
            .bind(account_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn find_account_by_name(&self, name: &str) -> LedgerResult<Option<Account>> {
        let row = sqlx::query("SELECT * FROM accounts WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn list_accounts(&self, owner_id: Option<OwnerId>) -> LedgerResult<Vec<Account>> {
        let rows = match owner_id {
            Some(owner) => {
                sqlx::query("SELECT * FROM accounts WHERE owner_id = ? ORDER BY id")
                    .bind(i64::from(owner.0))
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                sqlx::query("SELECT * FROM accounts ORDER BY id")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(StorageError::from)?;
        rows.iter().map(account_from_row).collect()
    }

    async fn find_entry(&self, key: &OperationKey) -> LedgerResult<Option<Transaction>> {
        let row = sqlx::query(
            "SELECT id, account_id, amount, client_operation_hash, kind, counterparty, created_at
             FROM transactions
             WHERE account_id = ? AND direction = ? AND client_operation_hash = ?",
        )
        .bind(key.account_id.0)
        .bind(key.direction.as_str())
        .bind(&key.token)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::from)?;
        row.as_ref().map(entry_from_row).transpose()
    }

    async fn commit(&self, batch: LedgerBatch) -> LedgerResult<Vec<Transaction>> {
        if !batch.is_consistent() {
            return Err(StorageError::Unbalanced.into());
        }

        // Dropping `tx` on any early return rolls the whole batch back.
        let mut tx = self.pool.begin().await.map_err(StorageError::from)?;
        let now = micros(Utc::now());

        for update in &batch.balances {
            let result = sqlx::query(
                "UPDATE accounts SET balance = ?, updated_at = ? WHERE id = ? AND balance = ?",
            )
            .bind(update.new)
            .bind(now)
            .bind(update.account_id.0)
            .bind(update.expected)
            .execute(&mut *tx)
            .await
            .map_err(StorageError::from)?;

            if result.rows_affected() == 0 {
                let actual: Option<i64> =
                    sqlx::query_scalar("SELECT balance FROM accounts WHERE id = ?")
                        .bind(update.account_id.0)
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(StorageError::from)?;
                return Err(match actual {
                    Some(actual) => StorageError::Conflict {
                        account_id: update.account_id,
                        expected: update.expected,
                        actual,
                    },
                    None => StorageError::MissingAccount(update.account_id),
                }
                .into());
            }
        }

        let mut inserted = Vec::with_capacity(batch.entries.len());
        for entry in batch.entries {
            let result = sqlx::query(
                "INSERT INTO transactions
                 (account_id, amount, direction, client_operation_hash, kind, counterparty, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(entry.account_id.0)
            .bind(entry.amount)
            .bind(Direction::of(entry.amount).as_str())
            .bind(&entry.client_operation_hash)
            .bind(entry.kind.as_str())
            .bind(entry.counterparty.map(|id| id.0))
            .bind(micros(entry.created_at))
            .execute(&mut *tx)
            .await
            .map_err(|e| constraint_error(e, Constraint::OperationKey))?;

            inserted.push(entry.into_transaction(TransactionId(result.last_insert_rowid())));
        }

        tx.commit().await.map_err(StorageError::from)?;
        Ok(inserted)
    }

    async fn account_entries(
        &self,
        account_id: AccountId,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> LedgerResult<Vec<Transaction>> {
        let rows = match range {
            Some((from, to)) => {
                sqlx::query(
                    "SELECT id, account_id, amount, client_operation_hash, kind, counterparty, created_at
                     FROM transactions
                     WHERE account_id = ? AND created_at > ? AND created_at < ?
                     ORDER BY created_at, id",
                )
                .bind(account_id.0)
                .bind(micros(from))
                .bind(micros(to))
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT id, account_id, amount, client_operation_hash, kind, counterparty, created_at
                     FROM transactions
                     WHERE account_id = ?
                     ORDER BY created_at, id",
                )
                .bind(account_id.0)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(StorageError::from)?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn entry_count(&self) -> LedgerResult<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transactions")
            .fetch_one(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(count as usize)
    }
}
