//! API integration tests
//!
//! Drive the router end to end against the in-memory store.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;

use bankcore::store::{BankStore, MemStore};
use bankcore::api;

mod common;

fn router(store: &MemStore) -> axum::Router {
    api::app(Arc::new(store.clone()))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_check_needs_no_auth() {
    let app = router(&MemStore::new());
    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn account_crud_round_trip() {
    let store = MemStore::new();
    let app = router(&store);
    let owner = common::random_owner();

    let response = app
        .clone()
        .oneshot(post_json(
            "/accounts",
            json!({ "owner": owner, "currency": "USD" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    assert_eq!(created["owner"], owner.as_str());
    assert_eq!(created["balance"], 0);
    assert_eq!(created["currency"], "USD");

    let id = created["id"].as_i64().unwrap();
    let response = app
        .clone()
        .oneshot(get(&format!("/accounts/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["id"], id);

    let response = app
        .oneshot(get(&format!("/accounts?owner={owner}&limit=5")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listed = body_json(response).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["id"], id);
}

#[tokio::test]
async fn unknown_currency_is_rejected_at_account_opening() {
    let app = router(&MemStore::new());

    let response = app
        .oneshot(post_json(
            "/accounts",
            json!({ "owner": "ada", "currency": "XYZ" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error_code"], "unsupported_currency");
}

#[tokio::test]
async fn missing_account_returns_404() {
    let app = router(&MemStore::new());
    let response = app.oneshot(get("/accounts/42")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error_code"], "account_not_found");
}

#[tokio::test]
async fn transfer_end_to_end() {
    let store = MemStore::new();
    let account_a = common::create_funded_account(&store, 1_000).await;
    let account_b = common::create_funded_account(&store, 500).await;
    let app = router(&store);

    let response = app
        .clone()
        .oneshot(post_json(
            "/transfers",
            json!({
                "from_account_id": account_a.id,
                "to_account_id": account_b.id,
                "amount": 100,
                "currency": "USD",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let result = body_json(response).await;
    assert_eq!(result["from_account"]["balance"], 900);
    assert_eq!(result["to_account"]["balance"], 600);
    assert_eq!(result["from_entry"]["amount"], -100);
    assert_eq!(result["to_entry"]["amount"], 100);
    assert_eq!(result["transfer"]["amount"], 100);

    // Audit rows reachable over the API as well.
    let transfer_id = result["transfer"]["id"].as_i64().unwrap();
    let response = app
        .oneshot(get(&format!("/transfers/{transfer_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn transfer_currency_must_match_both_accounts() {
    let store = MemStore::new();
    let usd = common::create_funded_account(&store, 1_000).await;
    let eur = store
        .create_account(bankcore::store::CreateAccountParams {
            owner: common::random_owner(),
            balance: 1_000,
            currency: "EUR".to_string(),
        })
        .await
        .unwrap();
    let app = router(&store);

    let response = app
        .oneshot(post_json(
            "/transfers",
            json!({
                "from_account_id": usd.id,
                "to_account_id": eur.id,
                "amount": 100,
                "currency": "USD",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error_code"], "currency_mismatch");

    // Rejected pre-unit: neither balance moved.
    assert_eq!(store.get_account(usd.id).await.unwrap().balance, 1_000);
    assert_eq!(store.get_account(eur.id).await.unwrap().balance, 1_000);
}

#[tokio::test]
async fn non_positive_transfer_amount_is_a_bad_request() {
    let store = MemStore::new();
    let account_a = common::create_funded_account(&store, 1_000).await;
    let account_b = common::create_funded_account(&store, 1_000).await;
    let app = router(&store);

    let response = app
        .oneshot(post_json(
            "/transfers",
            json!({
                "from_account_id": account_a.id,
                "to_account_id": account_b.id,
                "amount": 0,
                "currency": "USD",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error_code"], "invalid_request");
}

#[tokio::test]
async fn transfer_to_missing_account_is_a_404_with_no_side_effects() {
    let store = MemStore::new();
    let account_a = common::create_funded_account(&store, 1_000).await;
    let app = router(&store);

    let response = app
        .oneshot(post_json(
            "/transfers",
            json!({
                "from_account_id": account_a.id,
                "to_account_id": account_a.id + 999,
                "amount": 100,
                "currency": "USD",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(store.get_account(account_a.id).await.unwrap().balance, 1_000);
}
