//! Versioned schema for the event log.
//!
//! The schema version lives in SQLite's `user_version` header field. Each
//! step bumps it inside the same transaction as its DDL, so a crash leaves
//! the database at the previous version with none of the step applied.

use rusqlite::Connection;
use thiserror::Error;

/// One schema step.
struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create event_log",
        sql: include_str!("migrations/001_event_log.sql"),
    },
    Migration {
        version: 2,
        description: "make event_log append-only",
        sql: include_str!("migrations/002_event_log_append_only.sql"),
    },
];

/// Triggers that make committed entries immutable. Their absence means the
/// database was altered outside this crate.
const APPEND_ONLY_GUARDS: [&str; 2] = ["event_log_no_update", "event_log_no_delete"];

/// Schema version this build writes and understands.
pub const SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("cannot inspect event log schema: {0}")]
    Inspect(#[source] rusqlite::Error),

    /// The file was written by a newer build.
    #[error("event log schema version {found} is newer than supported version {supported}")]
    NewerThanSupported { found: u32, supported: u32 },

    #[error("event log schema step {version} ({description}) failed: {source}")]
    StepFailed {
        version: u32,
        description: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("event_log is missing its append-only trigger {0}")]
    MissingGuard(&'static str),
}

/// Brings the event log schema to [`SCHEMA_VERSION`] and checks that the
/// append-only triggers are in place.
///
/// Returns the number of steps applied by this call.
///
/// # Errors
///
/// See [`MigrationError`].
pub fn run_migrations(conn: &Connection) -> Result<usize, MigrationError> {
    let applied = apply_steps(conn, MIGRATIONS)?;
    check_append_only(conn)?;
    Ok(applied)
}

fn schema_version(conn: &Connection) -> Result<u32, MigrationError> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(MigrationError::Inspect)
}

fn apply_steps(conn: &Connection, steps: &[Migration]) -> Result<usize, MigrationError> {
    let current = schema_version(conn)?;
    let target = steps.last().map_or(0, |step| step.version);
    if current > target {
        return Err(MigrationError::NewerThanSupported {
            found: current,
            supported: target,
        });
    }

    let mut applied = 0;
    for step in steps.iter().filter(|step| step.version > current) {
        let failed = |source| MigrationError::StepFailed {
            version: step.version,
            description: step.description,
            source,
        };

        let tx = conn.unchecked_transaction().map_err(failed)?;
        tx.execute_batch(step.sql).map_err(failed)?;
        tx.pragma_update(None, "user_version", step.version)
            .map_err(failed)?;
        tx.commit().map_err(failed)?;

        tracing::info!(
            version = step.version,
            step = step.description,
            "event log schema step applied"
        );
        applied += 1;
    }

    Ok(applied)
}

fn check_append_only(conn: &Connection) -> Result<(), MigrationError> {
    for guard in APPEND_ONLY_GUARDS {
        let present: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master
                               WHERE type = 'trigger' AND tbl_name = 'event_log' AND name = ?1)",
                [guard],
                |row| row.get(0),
            )
            .map_err(MigrationError::Inspect)?;
        if !present {
            return Err(MigrationError::MissingGuard(guard));
        }
    }
    Ok(())
}
