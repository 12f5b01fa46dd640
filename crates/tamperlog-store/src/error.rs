//! Error types for the storage layer.

/// Errors that can occur during event log storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A database operation failed.
    #[error("event log database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No pooled connection became available in time.
    #[error("event log connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// A payload could not be serialised for storage.
    #[error("event log serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row could not be decoded into an entry.
    #[error("event log row {sequence} is unreadable: {detail}")]
    Corrupt {
        /// Sequence number of the unreadable row.
        sequence: u64,
        /// What failed to decode.
        detail: String,
    },

    /// The candidate does not extend the current tail. Only reachable if the
    /// single-writer discipline is broken.
    #[error("ordering conflict: expected sequence {expected}, got {got}")]
    OrderingConflict {
        /// The sequence number the next entry must carry.
        expected: u64,
        /// The sequence number the candidate carried.
        got: u64,
    },
}
