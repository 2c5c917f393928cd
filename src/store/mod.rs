//! Ledger store
//!
//! Persistence for accounts, entries, transfers and sessions, plus the
//! transactional funds-transfer engine built on top of them. Two backends
//! implement the same surface: [`PgStore`] (Postgres via sqlx, row locks
//! taken by `UPDATE ... RETURNING`) and [`MemStore`] (in-memory double with
//! per-row async locks, used by tests and local tooling).

pub mod error;
pub mod mem;
pub mod models;
pub mod pg;
pub mod transfer;

pub use error::StoreError;
pub use mem::MemStore;
pub use models::{Account, Entry, Session, Transfer};
pub use pg::PgStore;
pub use transfer::{TransferParams, TransferTxResult};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Account creation input. The HTTP layer always opens accounts with a zero
/// balance; tests and back-office tooling may seed a starting balance.
#[derive(Debug, Clone)]
pub struct CreateAccountParams {
    pub owner: String,
    pub balance: i64,
    pub currency: String,
}

/// Owner filter plus paging for account listings.
#[derive(Debug, Clone, Default)]
pub struct ListAccountsParams {
    pub owner: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

/// Session creation input. The id is supplied by the identity layer that
/// owns the token lifecycle.
#[derive(Debug, Clone)]
pub struct CreateSessionParams {
    pub id: Uuid,
    pub owner: String,
    pub expires_at: DateTime<Utc>,
}

/// Storage surface consumed by the API layer.
///
/// Single-row reads and writes plus [`BankStore::transfer_tx`], the one
/// composite operation. Implementations must make `transfer_tx` atomic: no
/// partial set of {transfer row, entry rows, balance updates} is ever
/// observable outside its unit of work.
#[async_trait]
pub trait BankStore: Send + Sync {
    async fn create_account(&self, params: CreateAccountParams) -> Result<Account, StoreError>;
    async fn get_account(&self, id: i64) -> Result<Account, StoreError>;
    async fn list_accounts(&self, params: ListAccountsParams) -> Result<Vec<Account>, StoreError>;

    async fn get_entry(&self, id: i64) -> Result<Entry, StoreError>;
    async fn get_transfer(&self, id: i64) -> Result<Transfer, StoreError>;

    async fn create_session(&self, params: CreateSessionParams) -> Result<Session, StoreError>;
    async fn get_session(&self, id: Uuid) -> Result<Session, StoreError>;

    /// Moves `params.amount` between two accounts inside one unit of work:
    /// one transfer row, a debit and a credit entry, and both balance
    /// updates commit together or not at all.
    async fn transfer_tx(&self, params: TransferParams) -> Result<TransferTxResult, StoreError>;
}

/// Store handle injected into the router; either backend fits behind it.
pub type DynStore = Arc<dyn BankStore>;

/// Ledger primitives available inside one open unit of work.
///
/// Each method is a single-row operation with no internal branching; the
/// transfer algorithm composes them. `add_account_balance` must take the
/// row's write lock and hold it until the unit commits or rolls back, so
/// concurrent adjustments to one account serialize with no lost updates.
#[async_trait]
pub trait LedgerUnit: Send {
    async fn create_transfer(
        &mut self,
        from_account_id: i64,
        to_account_id: i64,
        amount: i64,
    ) -> Result<Transfer, StoreError>;

    async fn create_entry(&mut self, account_id: i64, amount: i64) -> Result<Entry, StoreError>;

    async fn add_account_balance(
        &mut self,
        account_id: i64,
        delta: i64,
    ) -> Result<Account, StoreError>;
}
