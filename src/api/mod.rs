//! API module
//!
//! HTTP routing glue around the ledger store.

pub mod routes;

pub use routes::create_router;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::store::DynStore;

/// Full application: ledger routes plus the unauthenticated health check.
pub fn app(store: DynStore) -> Router {
    create_router()
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

async fn health_check() -> &'static str {
    "OK"
}
