//! Event log API handlers.
//!
//! Provides:
//! - `POST /events`: append one event to the chain
//! - `GET /events`: most recent entries, newest first
//! - `GET /getEvents`: legacy form of `GET /events` returning a bare array
//! - `GET /events/verify`: replay the chain and report the first broken link

use crate::api::ApiError;
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Extension, Query},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tamperlog_chain::ChainVerdict;
use tamperlog_ingest::{is_blank_payload, MAX_RECENT_LIMIT};
use tamperlog_store::DEFAULT_RANGE_LIMIT;
use tamperlog_types::EventLogEntry;

/// Request body for `POST /events`.
///
/// Fields are optional here so that a missing field is reported with the
/// same 400 body as an empty one.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendRequest {
    pub event_type: Option<String>,
    pub source_app_id: Option<String>,
    #[serde(default)]
    pub data_payload: Value,
}

/// Query parameters for `GET /events` and `GET /getEvents`.
#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    /// Maximum number of entries (default 50, clamped to 1..=500).
    pub limit: Option<usize>,
    /// Only return entries with a sequence strictly below this one.
    pub before: Option<u64>,
}

/// Response wrapper for `GET /events`.
#[derive(Debug, Serialize, Deserialize)]
pub struct EventsResponse {
    /// Entries, most recent first.
    pub events: Vec<EventLogEntry>,
    /// The number of entries returned.
    pub count: usize,
}

const MISSING_FIELDS: &str = "Missing required fields";

/// Handler for `POST /events`.
pub async fn append_event_handler(
    Extension(state): Extension<Arc<AppState>>,
    body: Result<Json<AppendRequest>, JsonRejection>,
) -> Result<Json<EventLogEntry>, ApiError> {
    let Json(request) = body.map_err(|e| {
        tracing::debug!("rejected append body: {}", e);
        ApiError::BadRequest(MISSING_FIELDS.to_string())
    })?;

    let (Some(event_type), Some(source_app_id)) = (request.event_type, request.source_app_id)
    else {
        return Err(ApiError::BadRequest(MISSING_FIELDS.to_string()));
    };
    if is_blank_payload(&request.data_payload) {
        return Err(ApiError::BadRequest(MISSING_FIELDS.to_string()));
    }

    let coordinator = state.coordinator.clone();
    let entry = tokio::task::spawn_blocking(move || {
        coordinator.append(&event_type, &source_app_id, request.data_payload)
    })
    .await??;

    Ok(Json(entry))
}

async fn fetch_recent(
    state: &AppState,
    params: EventsQuery,
) -> Result<Vec<EventLogEntry>, ApiError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_RANGE_LIMIT)
        .clamp(1, MAX_RECENT_LIMIT);
    let before = params.before;

    let coordinator = state.coordinator.clone();
    let events = tokio::task::spawn_blocking(move || coordinator.recent(limit, before)).await??;
    Ok(events)
}

/// Handler for `GET /events`.
pub async fn list_events_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<EventsQuery>,
) -> Result<Json<EventsResponse>, ApiError> {
    let events = fetch_recent(&state, params).await?;
    let count = events.len();
    Ok(Json(EventsResponse { events, count }))
}

/// Handler for `GET /getEvents`.
pub async fn legacy_get_events_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<EventsQuery>,
) -> Result<Json<Vec<EventLogEntry>>, ApiError> {
    Ok(Json(fetch_recent(&state, params).await?))
}

/// Handler for `GET /events/verify`.
///
/// Walks the whole chain on a blocking thread. The verdict is returned with
/// `200 OK` either way; a tampered chain is a finding, not a request error.
pub async fn verify_chain_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<ChainVerdict>, ApiError> {
    let coordinator = state.coordinator.clone();
    let verdict = tokio::task::spawn_blocking(move || coordinator.verify()).await??;
    Ok(Json(verdict))
}
