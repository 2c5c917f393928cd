//! Postgres-backed ledger store
//!
//! Row-level locking comes from `UPDATE ... RETURNING` on the accounts
//! table: the statement locks the row and the lock is held until the
//! surrounding transaction ends. The coordinator ([`PgStore::run_in_unit`])
//! commits on success and rolls back on any error, so callers only ever see
//! whole units.

use async_trait::async_trait;
use futures::future::BoxFuture;
use sqlx::postgres::{PgExecutor, PgPoolOptions};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::models::{Account, Entry, Session, Transfer};
use super::transfer::{self, TransferParams, TransferTxResult};
use super::{
    BankStore, CreateAccountParams, CreateSessionParams, LedgerUnit, ListAccountsParams,
    StoreError,
};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Transaction coordinator: opens a unit of work, hands it to `work`,
    /// commits on `Ok` and rolls back on `Err`. The work error propagates
    /// unchanged; a serialization failure at commit surfaces as
    /// [`StoreError::Conflict`] with nothing persisted, so the caller may
    /// retry the whole call.
    pub async fn run_in_unit<T, F>(&self, work: F) -> Result<T, StoreError>
    where
        T: Send,
        F: for<'u> FnOnce(&'u mut PgUnit) -> BoxFuture<'u, Result<T, StoreError>> + Send,
    {
        let tx = self.pool.begin().await?;
        let mut unit = PgUnit { tx };
        match work(&mut unit).await {
            Ok(value) => {
                unit.tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                // The work error wins; a failed rollback only gets logged.
                if let Err(rollback_err) = unit.tx.rollback().await {
                    tracing::warn!("rollback failed: {rollback_err}");
                }
                Err(err)
            }
        }
    }
}

/// One open Postgres transaction.
pub struct PgUnit {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerUnit for PgUnit {
    async fn create_transfer(
        &mut self,
        from_account_id: i64,
        to_account_id: i64,
        amount: i64,
    ) -> Result<Transfer, StoreError> {
        create_transfer(&mut *self.tx, from_account_id, to_account_id, amount).await
    }

    async fn create_entry(&mut self, account_id: i64, amount: i64) -> Result<Entry, StoreError> {
        create_entry(&mut *self.tx, account_id, amount).await
    }

    async fn add_account_balance(
        &mut self,
        account_id: i64,
        delta: i64,
    ) -> Result<Account, StoreError> {
        add_account_balance(&mut *self.tx, account_id, delta).await
    }
}

#[async_trait]
impl BankStore for PgStore {
    async fn create_account(&self, params: CreateAccountParams) -> Result<Account, StoreError> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (owner, balance, currency)
            VALUES ($1, $2, $3)
            RETURNING id, owner, balance, currency, created_at
            "#,
        )
        .bind(&params.owner)
        .bind(params.balance)
        .bind(&params.currency)
        .fetch_one(&self.pool)
        .await?;

        Ok(account)
    }

    async fn get_account(&self, id: i64) -> Result<Account, StoreError> {
        get_account(&self.pool, id).await
    }

    async fn list_accounts(&self, params: ListAccountsParams) -> Result<Vec<Account>, StoreError> {
        let accounts = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, owner, balance, currency, created_at
            FROM accounts
            WHERE $1::text IS NULL OR owner = $1
            ORDER BY id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(params.owner.as_deref())
        .bind(params.limit)
        .bind(params.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(accounts)
    }

    async fn get_entry(&self, id: i64) -> Result<Entry, StoreError> {
        sqlx::query_as::<_, Entry>(
            "SELECT id, account_id, amount, created_at FROM entries WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::EntryNotFound(id))
    }

    async fn get_transfer(&self, id: i64) -> Result<Transfer, StoreError> {
        sqlx::query_as::<_, Transfer>(
            r#"
            SELECT id, from_account_id, to_account_id, amount, created_at
            FROM transfers
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::TransferNotFound(id))
    }

    async fn create_session(&self, params: CreateSessionParams) -> Result<Session, StoreError> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (id, owner, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, owner, expires_at, created_at
            "#,
        )
        .bind(params.id)
        .bind(&params.owner)
        .bind(params.expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(session)
    }

    async fn get_session(&self, id: Uuid) -> Result<Session, StoreError> {
        sqlx::query_as::<_, Session>(
            "SELECT id, owner, expires_at, created_at FROM sessions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::SessionNotFound(id))
    }

    async fn transfer_tx(&self, params: TransferParams) -> Result<TransferTxResult, StoreError> {
        transfer::validate(&params)?;
        self.run_in_unit(move |unit| Box::pin(transfer::execute(unit, params)))
            .await
    }
}

// =========================================================================
// Queries shared between the pool surface and open units
// =========================================================================

async fn get_account<'e>(executor: impl PgExecutor<'e>, id: i64) -> Result<Account, StoreError> {
    sqlx::query_as::<_, Account>(
        "SELECT id, owner, balance, currency, created_at FROM accounts WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(executor)
    .await?
    .ok_or(StoreError::AccountNotFound(id))
}

/// Atomic read-modify-write: the UPDATE locks the row, so two concurrent
/// adjustments against one account serialize with no lost update.
async fn add_account_balance<'e>(
    executor: impl PgExecutor<'e>,
    id: i64,
    delta: i64,
) -> Result<Account, StoreError> {
    sqlx::query_as::<_, Account>(
        r#"
        UPDATE accounts
        SET balance = balance + $1
        WHERE id = $2
        RETURNING id, owner, balance, currency, created_at
        "#,
    )
    .bind(delta)
    .bind(id)
    .fetch_optional(executor)
    .await?
    .ok_or(StoreError::AccountNotFound(id))
}

async fn create_entry<'e>(
    executor: impl PgExecutor<'e>,
    account_id: i64,
    amount: i64,
) -> Result<Entry, StoreError> {
    sqlx::query_as::<_, Entry>(
        r#"
        INSERT INTO entries (account_id, amount)
        VALUES ($1, $2)
        RETURNING id, account_id, amount, created_at
        "#,
    )
    .bind(account_id)
    .bind(amount)
    .fetch_one(executor)
    .await
    .map_err(|err| foreign_key_to_not_found(err, account_id))
}

async fn create_transfer<'e>(
    executor: impl PgExecutor<'e>,
    from_account_id: i64,
    to_account_id: i64,
    amount: i64,
) -> Result<Transfer, StoreError> {
    sqlx::query_as::<_, Transfer>(
        r#"
        INSERT INTO transfers (from_account_id, to_account_id, amount)
        VALUES ($1, $2, $3)
        RETURNING id, from_account_id, to_account_id, amount, created_at
        "#,
    )
    .bind(from_account_id)
    .bind(to_account_id)
    .bind(amount)
    .fetch_one(executor)
    .await
    .map_err(|err| {
        // Either foreign key can fire; the constraint name says which side
        // was missing.
        let missing = match err.as_database_error().and_then(|db| db.constraint()) {
            Some(constraint) if constraint.contains("to_account_id") => to_account_id,
            _ => from_account_id,
        };
        foreign_key_to_not_found(err, missing)
    })
}

/// A foreign-key violation on an insert means the referenced account row is
/// missing; report it the same way a direct lookup would.
fn foreign_key_to_not_found(err: sqlx::Error, account_id: i64) -> StoreError {
    if let Some(db) = err.as_database_error() {
        if db.code().as_deref() == Some("23503") {
            return StoreError::AccountNotFound(account_id);
        }
    }
    StoreError::from(err)
}
