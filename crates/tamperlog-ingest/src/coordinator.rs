use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde_json::Value;
use tamperlog_broadcast::{Broadcaster, Subscription};
use tamperlog_chain::{canonical_encode, compute_hash, ChainVerdict, ChainVerifier};
use tamperlog_store::{LogStore, StoreError};
use tamperlog_types::EventLogEntry;

use crate::error::IngestError;
use crate::validate::validate_event;

/// Upper bound on entries returned by one [`IngestCoordinator::recent`] call.
pub const MAX_RECENT_LIMIT: usize = 500;

/// Serializes appends to the event chain and publishes each committed entry.
///
/// Share it behind an `Arc`; every method takes `&self`. All methods block on
/// SQLite, so async callers should run them via `spawn_blocking`.
pub struct IngestCoordinator {
    store: LogStore,
    broadcaster: Broadcaster,
    /// Held from tail read through commit.
    write_lock: Mutex<()>,
    /// Taken before `write_lock` is released and held until publish returns,
    /// so entries reach subscribers in commit order.
    publish_turn: Mutex<()>,
}

impl IngestCoordinator {
    pub fn new(store: LogStore, broadcaster: Broadcaster) -> Self {
        Self {
            store,
            broadcaster,
            write_lock: Mutex::new(()),
            publish_turn: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &LogStore {
        &self.store
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Validates, links, commits and publishes one event.
    ///
    /// On success the returned entry is durable and has been offered to every
    /// subscriber registered before this call returned. On failure nothing was
    /// committed and nothing was published.
    pub fn append(
        &self,
        event_type: &str,
        source_app_id: &str,
        data_payload: Value,
    ) -> Result<EventLogEntry, IngestError> {
        if let Err(e) = validate_event(event_type, source_app_id, &data_payload) {
            tracing::warn!(event_type, source_app_id, error = %e, "rejected event");
            return Err(e);
        }

        let (entry, turn) = {
            let _writer = self
                .write_lock
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            let entry = self
                .commit_next(event_type, source_app_id, data_payload)
                .map_err(|e| {
                    tracing::error!(event_type, source_app_id, error = %e, "append failed");
                    IngestError::from(e)
                })?;

            let turn = self
                .publish_turn
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            (entry, turn)
        };

        let delivery = self.broadcaster.publish(Arc::new(entry.clone()));
        drop(turn);

        tracing::debug!(
            sequence = entry.sequence,
            event_type = %entry.event_type,
            source_app_id = %entry.source_app_id,
            delivered = delivery.delivered,
            dropped = delivery.dropped,
            "event appended"
        );

        Ok(entry)
    }

    /// Reads the tail, builds the linked successor and commits it.
    /// Caller must hold `write_lock`.
    fn commit_next(
        &self,
        event_type: &str,
        source_app_id: &str,
        data_payload: Value,
    ) -> Result<EventLogEntry, StoreError> {
        let (sequence, prev_hash) = match self.store.latest()? {
            Some(tail) => (tail.sequence + 1, Some(tail.hash)),
            None => (1, None),
        };

        let hash = compute_hash(
            event_type,
            source_app_id,
            &canonical_encode(&data_payload),
            prev_hash.as_deref(),
        );

        self.store.insert(EventLogEntry {
            sequence,
            event_type: event_type.to_string(),
            source_app_id: source_app_id.to_string(),
            data_payload,
            timestamp: Utc::now(),
            hash,
            prev_hash,
        })
    }
}

// Read paths. None of these take the write lock.
impl IngestCoordinator {
    /// Most recent entries, newest first. `limit` is clamped to
    /// [`MAX_RECENT_LIMIT`]; `before` pages strictly below a sequence.
    pub fn recent(&self, limit: usize, before: Option<u64>) -> Result<Vec<EventLogEntry>, StoreError> {
        self.store.range(limit.min(MAX_RECENT_LIMIT), before)
    }

    /// Replays the stored chain from genesis and checks every link.
    ///
    /// A row that cannot be decoded is reported as tampering at its
    /// sequence. Any other storage error is returned as-is.
    pub fn verify(&self) -> Result<ChainVerdict, StoreError> {
        let mut verifier = ChainVerifier::new();
        let mut tamper = None;
        for item in self.store.all_ordered()? {
            let checked = match item {
                Ok(entry) => verifier.check(&entry),
                Err(StoreError::Corrupt { sequence, detail }) => {
                    tracing::warn!(sequence, %detail, "stored entry is undecodable");
                    Err(verifier.undecodable(sequence))
                }
                Err(e) => return Err(e),
            };
            if let Err(t) = checked {
                tamper = Some(t);
                break;
            }
        }

        let verdict = match tamper {
            Some(t) => ChainVerdict::from(t),
            None => verifier.finish(),
        };
        match &verdict {
            ChainVerdict::Intact { length } => {
                tracing::info!(length, "event chain verified");
            }
            ChainVerdict::TamperDetected { at, reason } => {
                tracing::error!(sequence = at, %reason, "event chain tamper detected");
            }
        }
        Ok(verdict)
    }

    /// Registers a listener for entries committed from now on.
    pub fn subscribe(&self) -> Subscription {
        self.broadcaster.subscribe()
    }
}
