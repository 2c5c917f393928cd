//! API Routes
//!
//! HTTP endpoint definitions. Request validation happens here — amount and
//! currency checks run before the transfer engine is invoked, which is why
//! the engine itself can trust its arguments.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::error::AppError;
use crate::store::models::is_supported_currency;
use crate::store::{
    Account, CreateAccountParams, DynStore, Entry, ListAccountsParams, Transfer, TransferParams,
    TransferTxResult,
};

const MAX_PAGE_SIZE: i64 = 100;
const DEFAULT_PAGE_SIZE: i64 = 20;

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub owner: String,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
pub struct ListAccountsQuery {
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default = "default_page_size")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_page_size() -> i64 {
    DEFAULT_PAGE_SIZE
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub from_account_id: i64,
    pub to_account_id: i64,
    pub amount: i64,
    pub currency: String,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<DynStore> {
    Router::new()
        .route("/accounts", post(create_account))
        .route("/accounts", get(list_accounts))
        .route("/accounts/:account_id", get(get_account))
        .route("/transfers", post(create_transfer))
        .route("/transfers/:transfer_id", get(get_transfer))
        .route("/entries/:entry_id", get(get_entry))
}

// =========================================================================
// POST /accounts
// =========================================================================

/// Open a new account with a zero balance
async fn create_account(
    State(store): State<DynStore>,
    Json(request): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<Account>), AppError> {
    if request.owner.trim().is_empty() {
        return Err(AppError::InvalidRequest("owner must not be empty".into()));
    }
    if !is_supported_currency(&request.currency) {
        return Err(AppError::UnsupportedCurrency(request.currency));
    }

    let account = store
        .create_account(CreateAccountParams {
            owner: request.owner,
            balance: 0,
            currency: request.currency,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(account)))
}

// =========================================================================
// GET /accounts/:account_id
// =========================================================================

async fn get_account(
    State(store): State<DynStore>,
    Path(account_id): Path<i64>,
) -> Result<Json<Account>, AppError> {
    let account = store.get_account(account_id).await?;
    Ok(Json(account))
}

// =========================================================================
// GET /accounts?owner=&limit=&offset=
// =========================================================================

async fn list_accounts(
    State(store): State<DynStore>,
    Query(query): Query<ListAccountsQuery>,
) -> Result<Json<Vec<Account>>, AppError> {
    if query.offset < 0 {
        return Err(AppError::InvalidRequest("offset must not be negative".into()));
    }

    let accounts = store
        .list_accounts(ListAccountsParams {
            owner: query.owner,
            limit: query.limit.clamp(1, MAX_PAGE_SIZE),
            offset: query.offset,
        })
        .await?;

    Ok(Json(accounts))
}

// =========================================================================
// POST /transfers
// =========================================================================

/// Validate and execute a transfer.
///
/// Both accounts' stored currency must equal the request currency; the
/// check runs before any unit of work is opened, so a mismatch has no side
/// effects.
async fn create_transfer(
    State(store): State<DynStore>,
    Json(request): Json<TransferRequest>,
) -> Result<Json<TransferTxResult>, AppError> {
    if request.amount <= 0 {
        return Err(AppError::InvalidRequest(
            "amount must be strictly positive".into(),
        ));
    }
    if !is_supported_currency(&request.currency) {
        return Err(AppError::UnsupportedCurrency(request.currency));
    }

    check_account_currency(&store, request.from_account_id, &request.currency).await?;
    check_account_currency(&store, request.to_account_id, &request.currency).await?;

    let result = store
        .transfer_tx(TransferParams {
            from_account_id: request.from_account_id,
            to_account_id: request.to_account_id,
            amount: request.amount,
        })
        .await?;

    Ok(Json(result))
}

async fn check_account_currency(
    store: &DynStore,
    account_id: i64,
    currency: &str,
) -> Result<(), AppError> {
    let account = store.get_account(account_id).await?;
    if account.currency != currency {
        return Err(AppError::CurrencyMismatch {
            account_id,
            account_currency: account.currency,
            requested: currency.to_string(),
        });
    }
    Ok(())
}

// =========================================================================
// GET /transfers/:transfer_id, GET /entries/:entry_id
// =========================================================================

async fn get_transfer(
    State(store): State<DynStore>,
    Path(transfer_id): Path<i64>,
) -> Result<Json<Transfer>, AppError> {
    let transfer = store.get_transfer(transfer_id).await?;
    Ok(Json(transfer))
}

async fn get_entry(
    State(store): State<DynStore>,
    Path(entry_id): Path<i64>,
) -> Result<Json<Entry>, AppError> {
    let entry = store.get_entry(entry_id).await?;
    Ok(Json(entry))
}
