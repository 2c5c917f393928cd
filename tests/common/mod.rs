//! Common test utilities

use bankcore::store::{Account, BankStore, CreateAccountParams, MemStore};
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Random six-letter owner name, so tests never collide on fixtures.
pub fn random_owner() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect()
}

pub async fn create_funded_account(store: &MemStore, balance: i64) -> Account {
    store
        .create_account(CreateAccountParams {
            owner: random_owner(),
            balance,
            currency: "USD".to_string(),
        })
        .await
        .expect("create account")
}
