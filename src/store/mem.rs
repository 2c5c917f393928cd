//! In-memory ledger store
//!
//! Test double with the same locking discipline as the relational backend:
//! every account row sits behind its own async mutex, taken by
//! `add_account_balance` and held until the unit commits or rolls back.
//! Lock waits therefore behave like Postgres row locks, which lets the
//! transfer engine's ordering rule be exercised without a database. Writes
//! are staged inside the unit and applied only at commit.

use std::collections::hash_map::Entry as MapEntry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::BoxFuture;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::models::{Account, Entry, Session, Transfer};
use super::transfer::{self, TransferParams, TransferTxResult};
use super::{
    BankStore, CreateAccountParams, CreateSessionParams, LedgerUnit, ListAccountsParams,
    StoreError,
};

type Row = Arc<Mutex<Account>>;

#[derive(Default)]
struct Tables {
    accounts: Mutex<HashMap<i64, Row>>,
    entries: Mutex<HashMap<i64, Entry>>,
    transfers: Mutex<HashMap<i64, Transfer>>,
    sessions: Mutex<HashMap<Uuid, Session>>,
    account_seq: AtomicI64,
    entry_seq: AtomicI64,
    transfer_seq: AtomicI64,
}

impl Tables {
    // Ids keep climbing even when a unit rolls back, like a database
    // sequence; gaps are expected.
    fn next_id(seq: &AtomicI64) -> i64 {
        seq.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[derive(Clone, Default)]
pub struct MemStore {
    tables: Arc<Tables>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transaction coordinator for the in-memory backend. Same contract as
    /// the Postgres one: commit on `Ok`, discard everything on `Err`. Row
    /// guards are released either way when the unit is dropped.
    pub async fn run_in_unit<T, F>(&self, work: F) -> Result<T, StoreError>
    where
        T: Send,
        F: for<'u> FnOnce(&'u mut MemUnit) -> BoxFuture<'u, Result<T, StoreError>> + Send,
    {
        let mut unit = MemUnit {
            tables: Arc::clone(&self.tables),
            locked: HashMap::new(),
            staged_entries: Vec::new(),
            staged_transfers: Vec::new(),
        };
        let value = work(&mut unit).await?;
        unit.commit().await;
        Ok(value)
    }
}

/// One open in-memory unit of work.
pub struct MemUnit {
    tables: Arc<Tables>,
    locked: HashMap<i64, LockedRow>,
    staged_entries: Vec<Entry>,
    staged_transfers: Vec<Transfer>,
}

struct LockedRow {
    guard: OwnedMutexGuard<Account>,
    delta: i64,
}

impl MemUnit {
    async fn require_account(&self, account_id: i64) -> Result<(), StoreError> {
        if self.locked.contains_key(&account_id) {
            return Ok(());
        }
        let accounts = self.tables.accounts.lock().await;
        if accounts.contains_key(&account_id) {
            Ok(())
        } else {
            Err(StoreError::AccountNotFound(account_id))
        }
    }

    async fn commit(mut self) {
        for locked in self.locked.values_mut() {
            locked.guard.balance += locked.delta;
        }
        if !self.staged_transfers.is_empty() {
            let mut transfers = self.tables.transfers.lock().await;
            for transfer in self.staged_transfers.drain(..) {
                transfers.insert(transfer.id, transfer);
            }
        }
        if !self.staged_entries.is_empty() {
            let mut entries = self.tables.entries.lock().await;
            for entry in self.staged_entries.drain(..) {
                entries.insert(entry.id, entry);
            }
        }
        // Dropping self releases the row guards, publishing the balances.
    }
}

#[async_trait]
impl LedgerUnit for MemUnit {
    async fn create_transfer(
        &mut self,
        from_account_id: i64,
        to_account_id: i64,
        amount: i64,
    ) -> Result<Transfer, StoreError> {
        self.require_account(from_account_id).await?;
        self.require_account(to_account_id).await?;
        let transfer = Transfer {
            id: Tables::next_id(&self.tables.transfer_seq),
            from_account_id,
            to_account_id,
            amount,
            created_at: Utc::now(),
        };
        self.staged_transfers.push(transfer.clone());
        Ok(transfer)
    }

    async fn create_entry(&mut self, account_id: i64, amount: i64) -> Result<Entry, StoreError> {
        self.require_account(account_id).await?;
        let entry = Entry {
            id: Tables::next_id(&self.tables.entry_seq),
            account_id,
            amount,
            created_at: Utc::now(),
        };
        self.staged_entries.push(entry.clone());
        Ok(entry)
    }

    async fn add_account_balance(
        &mut self,
        account_id: i64,
        delta: i64,
    ) -> Result<Account, StoreError> {
        let locked = match self.locked.entry(account_id) {
            MapEntry::Occupied(occupied) => occupied.into_mut(),
            MapEntry::Vacant(vacant) => {
                // Clone the row handle out before waiting on its lock, so
                // the table lock is never held across the wait.
                let row = {
                    let accounts = self.tables.accounts.lock().await;
                    accounts.get(&account_id).cloned()
                }
                .ok_or(StoreError::AccountNotFound(account_id))?;
                let guard = row.lock_owned().await;
                vacant.insert(LockedRow { guard, delta: 0 })
            }
        };

        locked.delta += delta;
        let mut account = locked.guard.clone();
        account.balance += locked.delta;
        Ok(account)
    }
}

#[async_trait]
impl BankStore for MemStore {
    async fn create_account(&self, params: CreateAccountParams) -> Result<Account, StoreError> {
        let account = Account {
            id: Tables::next_id(&self.tables.account_seq),
            owner: params.owner,
            balance: params.balance,
            currency: params.currency,
            created_at: Utc::now(),
        };
        self.tables
            .accounts
            .lock()
            .await
            .insert(account.id, Arc::new(Mutex::new(account.clone())));
        Ok(account)
    }

    async fn get_account(&self, id: i64) -> Result<Account, StoreError> {
        let row = {
            let accounts = self.tables.accounts.lock().await;
            accounts.get(&id).cloned()
        }
        .ok_or(StoreError::AccountNotFound(id))?;
        // Waits behind any unit currently holding the row, like a locked
        // read would.
        let account = row.lock().await.clone();
        Ok(account)
    }

    async fn list_accounts(&self, params: ListAccountsParams) -> Result<Vec<Account>, StoreError> {
        let rows: Vec<Row> = {
            let accounts = self.tables.accounts.lock().await;
            accounts.values().cloned().collect()
        };
        let mut matching = Vec::with_capacity(rows.len());
        for row in rows {
            let account = row.lock().await.clone();
            if params
                .owner
                .as_deref()
                .map_or(true, |owner| account.owner == owner)
            {
                matching.push(account);
            }
        }
        matching.sort_by_key(|account| account.id);
        let accounts = matching
            .into_iter()
            .skip(params.offset.max(0) as usize)
            .take(params.limit.max(0) as usize)
            .collect();
        Ok(accounts)
    }

    async fn get_entry(&self, id: i64) -> Result<Entry, StoreError> {
        self.tables
            .entries
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::EntryNotFound(id))
    }

    async fn get_transfer(&self, id: i64) -> Result<Transfer, StoreError> {
        self.tables
            .transfers
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::TransferNotFound(id))
    }

    async fn create_session(&self, params: CreateSessionParams) -> Result<Session, StoreError> {
        let session = Session {
            id: params.id,
            owner: params.owner,
            expires_at: params.expires_at,
            created_at: Utc::now(),
        };
        self.tables
            .sessions
            .lock()
            .await
            .insert(session.id, session.clone());
        Ok(session)
    }

    async fn get_session(&self, id: Uuid) -> Result<Session, StoreError> {
        self.tables
            .sessions
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::SessionNotFound(id))
    }

    async fn transfer_tx(&self, params: TransferParams) -> Result<TransferTxResult, StoreError> {
        transfer::validate(&params)?;
        self.run_in_unit(move |unit| Box::pin(transfer::execute(unit, params)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn account(owner: &str, balance: i64) -> CreateAccountParams {
        CreateAccountParams {
            owner: owner.to_string(),
            balance,
            currency: "USD".to_string(),
        }
    }

    #[tokio::test]
    async fn account_ids_are_monotonic() {
        let store = MemStore::new();
        let first = store.create_account(account("ada", 100)).await.unwrap();
        let second = store.create_account(account("bob", 200)).await.unwrap();
        assert!(second.id > first.id);
        assert_eq!(store.get_account(first.id).await.unwrap(), first);
    }

    #[tokio::test]
    async fn missing_rows_report_not_found() {
        let store = MemStore::new();
        assert!(matches!(
            store.get_account(99).await,
            Err(StoreError::AccountNotFound(99))
        ));
        assert!(matches!(
            store.get_entry(99).await,
            Err(StoreError::EntryNotFound(99))
        ));
        assert!(matches!(
            store.get_transfer(99).await,
            Err(StoreError::TransferNotFound(99))
        ));
    }

    #[tokio::test]
    async fn list_accounts_filters_and_pages() {
        let store = MemStore::new();
        for i in 0..5 {
            store
                .create_account(account(if i % 2 == 0 { "ada" } else { "bob" }, i * 10))
                .await
                .unwrap();
        }

        let all = store
            .list_accounts(ListAccountsParams {
                owner: None,
                limit: 10,
                offset: 0,
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 5);
        assert!(all.windows(2).all(|pair| pair[0].id < pair[1].id));

        let adas = store
            .list_accounts(ListAccountsParams {
                owner: Some("ada".to_string()),
                limit: 10,
                offset: 0,
            })
            .await
            .unwrap();
        assert_eq!(adas.len(), 3);
        assert!(adas.iter().all(|a| a.owner == "ada"));

        let page = store
            .list_accounts(ListAccountsParams {
                owner: None,
                limit: 2,
                offset: 4,
            })
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
    }

    #[tokio::test]
    async fn sessions_round_trip() {
        let store = MemStore::new();
        let id = Uuid::new_v4();
        let created = store
            .create_session(CreateSessionParams {
                id,
                owner: "ada".to_string(),
                expires_at: Utc::now() + Duration::hours(1),
            })
            .await
            .unwrap();
        assert_eq!(store.get_session(id).await.unwrap(), created);
        assert!(matches!(
            store.get_session(Uuid::new_v4()).await,
            Err(StoreError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn failed_unit_stages_nothing() {
        let store = MemStore::new();
        let funded = store.create_account(account("ada", 500)).await.unwrap();
        let funded_id = funded.id;

        let err = store
            .run_in_unit(move |unit| {
                Box::pin(async move {
                    unit.create_entry(funded_id, -100).await?;
                    unit.add_account_balance(funded_id, -100).await?;
                    Err::<(), _>(StoreError::Conflict)
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict));

        // Nothing from the rolled-back unit is visible.
        assert_eq!(store.get_account(funded_id).await.unwrap().balance, 500);
        assert!(store.get_entry(1).await.is_err());
    }
}
