//! Database layer for tamperlog.
//!
//! [`open_pool`] is the usual entry point: it builds an `r2d2` pool of SQLite
//! connections in WAL mode and brings the `event_log` schema up to date.
//! WAL lets verification and range reads run alongside the single writer
//! without blocking it.
//!
//! The schema is versioned through SQLite's `user_version` and embedded in
//! the binary. Besides the table itself it installs triggers that reject
//! every `UPDATE` and `DELETE`, and refuses to start if those triggers have
//! been removed.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError, SCHEMA_VERSION};
pub use pool::{create_pool, open_pool, DbPool, DbRuntimeSettings, PoolError};
