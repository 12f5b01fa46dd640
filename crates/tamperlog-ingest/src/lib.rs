//! Single-writer ingestion for the tamperlog event chain.
//!
//! [`IngestCoordinator`] is the only code path that creates entries. Each
//! append reads the tail, links the new entry to it, and commits it, all
//! inside one critical section. Two appends can therefore never observe the
//! same tail, which is what keeps the chain from forking.
//!
//! The coordinator also exposes the read side of the log boundary
//! ([`IngestCoordinator::recent`], [`IngestCoordinator::verify`],
//! [`IngestCoordinator::subscribe`]). Those go straight to the store, codec
//! and broadcaster and never touch the write lock.

mod coordinator;
mod error;
mod validate;

pub use coordinator::{IngestCoordinator, MAX_RECENT_LIMIT};
pub use error::IngestError;
pub use validate::{is_blank_payload, MAX_IDENTIFIER_LEN};
