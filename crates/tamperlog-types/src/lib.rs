//! Shared types for the tamperlog workspace.
//!
//! This crate holds the entry model that every other crate passes around:
//! the storage layer persists it, the chain codec hashes and verifies it, the
//! ingest coordinator builds it, and the broadcaster fans it out. Keeping it
//! here keeps the dependency graph a tree with this crate at the root.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single committed link in the tamper-evident chain.
///
/// Entries are immutable once created. The wire form uses camelCase field
/// names (`eventType`, `sourceAppId`, `dataPayload`, `prevHash`) so existing
/// observers of the event feed keep working.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLogEntry {
    /// Position in the chain. Gap-free, starting at 1.
    pub sequence: u64,
    /// Application-defined event category.
    pub event_type: String,
    /// Identifier of the application that produced the event.
    pub source_app_id: String,
    /// Opaque structured payload. Only its canonical encoding is hashed.
    pub data_payload: serde_json::Value,
    /// Wall-clock capture time. Informational only, never used for ordering.
    pub timestamp: DateTime<Utc>,
    /// Lowercase hex SHA-256 digest of this entry's chained fields.
    pub hash: String,
    /// `hash` of the entry at `sequence - 1`, or `None` for the genesis entry.
    pub prev_hash: Option<String>,
}

impl EventLogEntry {
    /// Returns `true` if this is the first entry of the chain.
    pub fn is_genesis(&self) -> bool {
        self.sequence == 1
    }
}
