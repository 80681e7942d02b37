//! Reference collector: the receiving end of the ingest contract.
//!
//! Runs locally for the demo and backs the dispatcher's integration tests.

pub mod percentiles;
pub mod routes;
pub mod store;
pub mod timing;

pub use store::{EventStore, IngestRecord};

use std::sync::Arc;

use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

/// Builds the collector `Router` with all routes and middleware.
pub fn router(store: Arc<EventStore>) -> Router {
    Router::new()
        .route("/ingest", post(routes::ingest))
        .route("/metrics", get(routes::metrics))
        .route("/report", get(routes::report))
        .route("/debug", get(routes::debug))
        .with_state(store)
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(axum_mw::from_fn(timing::timing_middleware))
        .layer(CorsLayer::permissive())
}

/// Serves until the listener fails.
pub async fn serve(listener: TcpListener, store: Arc<EventStore>) -> std::io::Result<()> {
    axum::serve(listener, router(store)).await
}
