//! bankcore Library
//!
//! Re-exports modules for integration testing and external use.

pub mod api;
pub mod store;

// Used by the server binary; exposed for tooling
pub mod config;
pub mod db;
mod error;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use store::{BankStore, DynStore, MemStore, PgStore, StoreError};
pub use store::{TransferParams, TransferTxResult};
