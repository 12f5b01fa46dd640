//! Error types for the ingest path.

use tamperlog_store::StoreError;

/// Errors returned by [`crate::IngestCoordinator::append`].
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The request was rejected before any state was touched.
    #[error("invalid event: {0}")]
    Validation(String),

    /// The storage layer failed. Nothing was committed or published, and
    /// the same append may be retried.
    #[error("failed to commit event: {0}")]
    Storage(#[from] StoreError),
}

impl IngestError {
    /// Returns `true` if the caller can fix the request and try again.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
