//! Pooled SQLite access to the event log database.

use std::path::Path;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};
use thiserror::Error;

use crate::migrations::{run_migrations, MigrationError};

/// Runtime tunables for SQLite connection behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// How long a statement waits on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,
    /// Upper bound on open connections. Readers and the single writer share it.
    pub pool_max_size: u32,
    /// How long a checkout waits for a free connection, in milliseconds.
    pub connection_timeout_ms: u64,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 8,
            connection_timeout_ms: 5_000,
        }
    }
}

pub type DbPool = Pool<SqliteConnectionManager>;

/// Failures while opening the event log database.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool could not open its initial connections.
    #[error("cannot open event log database: {0}")]
    Open(#[source] r2d2::Error),

    /// No connection was free to run migrations on.
    #[error("no connection available to prepare the event log schema: {0}")]
    Checkout(#[source] r2d2::Error),

    /// The schema could not be brought up to date.
    #[error(transparent)]
    Schema(#[from] MigrationError),
}

/// Per-connection setup. The log needs WAL so readers never block the
/// writer; in-memory databases report `memory` and are accepted as-is.
fn configure_connection(conn: &mut Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "wal", |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") && mode != "memory" {
        return Err(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
            Some(format!("event log requires WAL journaling, database is in {mode} mode")),
        ));
    }
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.busy_timeout(busy_timeout)
}

/// Builds a connection pool over `db_path` without touching the schema.
///
/// `:memory:` gives every pooled connection a private database, so anything
/// that needs several connections to agree must use a file.
///
/// # Errors
///
/// Returns `PoolError::Open` if the initial connections cannot be opened or
/// configured.
pub fn create_pool(db_path: &str, settings: DbRuntimeSettings) -> Result<DbPool, PoolError> {
    let busy_timeout = Duration::from_millis(settings.busy_timeout_ms);
    let manager = SqliteConnectionManager::file(db_path)
        .with_flags(
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )
        .with_init(move |conn| configure_connection(conn, busy_timeout));

    Pool::builder()
        .max_size(settings.pool_max_size)
        .connection_timeout(Duration::from_millis(settings.connection_timeout_ms))
        .build(manager)
        .map_err(PoolError::Open)
}

/// Opens the event log database at `path` and brings its schema up to date.
///
/// This is the one call the server and tests need before constructing a
/// store.
///
/// # Errors
///
/// Returns `PoolError` if the database cannot be opened or migrated.
pub fn open_pool(path: impl AsRef<Path>, settings: DbRuntimeSettings) -> Result<DbPool, PoolError> {
    let path = path.as_ref().to_string_lossy();
    let pool = create_pool(&path, settings)?;

    let applied = {
        let conn = pool.get().map_err(PoolError::Checkout)?;
        run_migrations(&conn)?
    };
    if applied > 0 {
        tracing::info!(path = %path, count = applied, "event log schema upgraded");
    } else {
        tracing::debug!(path = %path, "event log schema up to date");
    }

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_log() -> (tempfile::TempDir, DbPool) {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let pool = open_pool(dir.path().join("events.db"), DbRuntimeSettings::default())
            .expect("event log should open");
        (dir, pool)
    }

    #[test]
    fn settings_reach_every_connection() {
        let settings = DbRuntimeSettings {
            busy_timeout_ms: 2_500,
            pool_max_size: 3,
            connection_timeout_ms: 1_000,
        };
        let pool = create_pool(":memory:", settings).expect("pool should build");
        assert_eq!(pool.max_size(), 3);

        let conn = pool.get().expect("connection");
        let busy: i64 = conn
            .query_row("PRAGMA busy_timeout", [], |row| row.get(0))
            .expect("busy_timeout readable");
        assert_eq!(busy, 2_500);
        let sync: i64 = conn
            .query_row("PRAGMA synchronous", [], |row| row.get(0))
            .expect("synchronous readable");
        assert_eq!(sync, 1, "NORMAL");
    }

    #[test]
    fn opened_log_is_wal_and_migrated() {
        let (_dir, pool) = temp_log();
        let conn = pool.get().expect("connection");

        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .expect("journal_mode readable");
        assert_eq!(mode, "wal");

        let tail: Option<i64> = conn
            .query_row("SELECT MAX(sequence) FROM event_log", [], |row| row.get(0))
            .expect("event_log should exist");
        assert!(tail.is_none());
    }

    #[test]
    fn genesis_written_on_one_connection_is_seen_on_another() {
        let (_dir, pool) = temp_log();

        let writer = pool.get().expect("writer");
        writer
            .execute(
                "INSERT INTO event_log
                    (sequence, event_type, source_app_id, data_payload, timestamp, hash, prev_hash)
                 VALUES (1, 'boot', 'app', '{}', '2024-01-01T00:00:00Z', 'h1', NULL)",
                [],
            )
            .expect("genesis insert");

        let reader = pool.get().expect("reader");
        let hash: String = reader
            .query_row("SELECT hash FROM event_log WHERE sequence = 1", [], |row| row.get(0))
            .expect("committed genesis visible");
        assert_eq!(hash, "h1");
    }

    #[test]
    fn reopening_an_existing_log_applies_nothing() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("events.db");
        drop(open_pool(&path, DbRuntimeSettings::default()).expect("first open"));

        let pool = open_pool(&path, DbRuntimeSettings::default()).expect("second open");
        let conn = pool.get().expect("connection");
        assert_eq!(run_migrations(&conn).expect("no-op"), 0);
    }
}
