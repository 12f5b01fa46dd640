//! Tamperlog HTTP server library logic.

pub mod api;
pub mod api_events;
pub mod api_sse;
pub mod config;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tamperlog_broadcast::Broadcaster;
use tamperlog_db::DbPool;
use tamperlog_ingest::IngestCoordinator;
use tamperlog_store::LogStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The single ingest path. Also serves reads, verification and subscriptions.
    pub coordinator: Arc<IngestCoordinator>,
}

impl AppState {
    /// Wires a store, broadcaster and coordinator over `pool`.
    pub fn new(pool: DbPool, subscriber_capacity: usize) -> Self {
        let coordinator =
            IngestCoordinator::new(LogStore::new(pool), Broadcaster::new(subscriber_capacity));
        Self {
            coordinator: Arc::new(coordinator),
        }
    }
}

/// Maximum request body size (2 MiB). Protects against OOM from oversized payloads.
const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/events",
            post(api_events::append_event_handler).get(api_events::list_events_handler),
        )
        .route("/getEvents", get(api_events::legacy_get_events_handler))
        .route("/events/verify", get(api_events::verify_chain_handler))
        .route("/events/stream", get(api_sse::event_stream_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
