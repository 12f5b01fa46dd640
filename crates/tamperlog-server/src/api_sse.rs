//! SSE stream of newly committed log entries.

use crate::AppState;
use axum::{
    extract::Extension,
    response::{
        sse::{Event, KeepAlive},
        Sse,
    },
};
use futures_util::{stream, Stream};
use std::{convert::Infallible, sync::Arc};
use tokio_stream::StreamExt;

/// SSE event name carried by every notification.
pub const NEW_EVENT_LOG: &str = "newEventLog";

/// Handler for `GET /events/stream`.
///
/// Subscribes on connect. The subscription lives inside the response stream,
/// so a disconnecting client drops it and is unsubscribed. Entries committed
/// before the connection was opened are never replayed.
pub async fn event_stream_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.coordinator.subscribe();
    tracing::debug!(subscriber = %subscription.id(), "event stream opened");

    let entries = stream::unfold(subscription, |mut subscription| async move {
        let entry = subscription.recv().await?;
        Some((entry, subscription))
    });

    let events = entries.filter_map(|entry| match serde_json::to_string(&*entry) {
        Ok(data) => Some(Ok(Event::default().event(NEW_EVENT_LOG).data(data))),
        Err(e) => {
            tracing::error!(sequence = entry.sequence, "failed to serialize log entry: {}", e);
            None
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
