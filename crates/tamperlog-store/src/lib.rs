//! Durable, append-only storage for the hash-chained event log.
//!
//! Entries live in the SQLite `event_log` table created by `tamperlog-db`'s
//! migrations. The table is keyed by `sequence`, and triggers reject every
//! `UPDATE` and `DELETE`, so a committed entry can only be read.
//!
//! The SQL lives in free functions over a [`rusqlite::Connection`]
//! ([`latest_entry`], [`insert_entry`], [`range_entries`]). [`LogStore`] wraps
//! a connection pool and is the handle the rest of the system shares.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tamperlog_store::LogStore;
//!
//! let store = LogStore::new(pool);
//! let newest_first = store.range(50, None)?;
//! for entry in store.all_ordered()? {
//!     let entry = entry?;
//!     println!("{} {}", entry.sequence, entry.hash);
//! }
//! ```

mod error;
mod store;

pub use error::StoreError;
pub use store::{
    insert_entry, latest_entry, range_entries, ChainIter, LogStore, DEFAULT_RANGE_LIMIT,
};
