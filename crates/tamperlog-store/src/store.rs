//! Persistence operations for the event log.
//!
//! Writes go through [`insert_entry`], which re-checks inside an immediate
//! transaction that the candidate extends the current tail before inserting.
//!
//! Reads never take a write lock. SQLite's WAL mode gives each statement a
//! snapshot of committed rows, so an in-flight insert is invisible until it
//! commits.

use std::collections::VecDeque;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use tamperlog_db::DbPool;
use tamperlog_types::EventLogEntry;

use crate::error::StoreError;

/// Number of entries returned by a range query when the caller gives no limit.
pub const DEFAULT_RANGE_LIMIT: usize = 50;

/// Rows fetched per round trip by [`ChainIter`].
const PAGE_SIZE: usize = 256;

const SELECT_COLUMNS: &str =
    "SELECT sequence, event_type, source_app_id, data_payload, timestamp, hash, prev_hash
     FROM event_log";

/// One stored row, split so that a row whose columns fail to decode still
/// reports which sequence it sits at.
struct RawRow {
    sequence: u64,
    columns: rusqlite::Result<RawColumns>,
}

struct RawColumns {
    event_type: String,
    source_app_id: String,
    data_payload: String,
    timestamp: String,
    hash: String,
    prev_hash: Option<String>,
}

impl RawColumns {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            event_type: row.get(1)?,
            source_app_id: row.get(2)?,
            data_payload: row.get(3)?,
            timestamp: row.get(4)?,
            hash: row.get(5)?,
            prev_hash: row.get(6)?,
        })
    }
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            sequence: row.get(0)?,
            columns: RawColumns::from_row(row),
        })
    }

    /// Decodes the row. Any column, timestamp or payload that does not parse
    /// yields `StoreError::Corrupt` for this sequence.
    fn into_entry(self) -> Result<EventLogEntry, StoreError> {
        let sequence = self.sequence;
        let corrupt = |detail: String| StoreError::Corrupt { sequence, detail };

        let columns = self
            .columns
            .map_err(|e| corrupt(format!("unreadable column: {e}")))?;
        let timestamp = DateTime::parse_from_rfc3339(&columns.timestamp)
            .map_err(|e| corrupt(format!("invalid timestamp {:?}: {}", columns.timestamp, e)))?
            .with_timezone(&Utc);
        let data_payload = serde_json::from_str(&columns.data_payload)
            .map_err(|e| corrupt(format!("invalid payload: {e}")))?;

        Ok(EventLogEntry {
            sequence,
            event_type: columns.event_type,
            source_app_id: columns.source_app_id,
            data_payload,
            timestamp,
            hash: columns.hash,
            prev_hash: columns.prev_hash,
        })
    }
}

fn collect_rows(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<RawRow>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, RawRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn collect_entries(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<EventLogEntry>, StoreError> {
    collect_rows(conn, sql, params)?
        .into_iter()
        .map(RawRow::into_entry)
        .collect()
}

/// Returns the entry with the greatest sequence number, if any.
///
/// # Errors
///
/// Returns `StoreError::Database` on SQL failure, or `StoreError::Corrupt`
/// if the stored row is unreadable.
pub fn latest_entry(conn: &Connection) -> Result<Option<EventLogEntry>, StoreError> {
    let raw = conn
        .query_row(
            &format!("{SELECT_COLUMNS} ORDER BY sequence DESC LIMIT 1"),
            [],
            RawRow::from_row,
        )
        .optional()?;

    raw.map(RawRow::into_entry).transpose()
}

/// Appends a fully formed entry to the log.
///
/// The tail is re-read inside an immediate (write-locked) transaction and the
/// candidate must carry exactly `tail + 1` (or `1` on an empty log).
///
/// # Errors
///
/// Returns `StoreError::OrderingConflict` if the candidate does not extend
/// the tail, `StoreError::Database` on SQL failure. Nothing is committed on
/// error.
pub fn insert_entry(conn: &mut Connection, entry: &EventLogEntry) -> Result<(), StoreError> {
    let payload = serde_json::to_string(&entry.data_payload)?;
    let timestamp = entry
        .timestamp
        .to_rfc3339_opts(SecondsFormat::AutoSi, true);

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let tail: Option<u64> =
        tx.query_row("SELECT MAX(sequence) FROM event_log", [], |row| row.get(0))?;
    let expected = tail.map_or(1, |seq| seq + 1);
    if entry.sequence != expected {
        return Err(StoreError::OrderingConflict {
            expected,
            got: entry.sequence,
        });
    }

    tx.execute(
        "INSERT INTO event_log
            (sequence, event_type, source_app_id, data_payload, timestamp, hash, prev_hash)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entry.sequence,
            entry.event_type,
            entry.source_app_id,
            payload,
            timestamp,
            entry.hash,
            entry.prev_hash,
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(ref err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
        {
            StoreError::OrderingConflict {
                expected,
                got: entry.sequence,
            }
        }
        other => StoreError::Database(other),
    })?;

    tx.commit()?;
    Ok(())
}

/// Returns up to `limit` entries, newest first.
///
/// With `before = Some(n)`, only entries with `sequence < n` are returned,
/// which lets callers page backwards through history.
///
/// # Errors
///
/// Returns `StoreError::Database` on SQL failure.
pub fn range_entries(
    conn: &Connection,
    limit: usize,
    before: Option<u64>,
) -> Result<Vec<EventLogEntry>, StoreError> {
    if limit == 0 {
        return Ok(Vec::new());
    }

    collect_entries(
        conn,
        &format!(
            "{SELECT_COLUMNS}
             WHERE (?1 IS NULL OR sequence < ?1)
             ORDER BY sequence DESC
             LIMIT ?2"
        ),
        params![before, limit],
    )
}

/// Returns up to `limit` undecoded rows with `after < sequence <= upto`,
/// oldest first.
fn page_rows(
    conn: &Connection,
    after: u64,
    upto: u64,
    limit: usize,
) -> Result<Vec<RawRow>, StoreError> {
    collect_rows(
        conn,
        &format!(
            "{SELECT_COLUMNS}
             WHERE sequence > ?1 AND sequence <= ?2
             ORDER BY sequence ASC
             LIMIT ?3"
        ),
        params![after, upto, limit],
    )
}

/// Shared handle to the event log.
///
/// Cloning is cheap: clones share the underlying connection pool.
#[derive(Clone)]
pub struct LogStore {
    pool: DbPool,
}

impl LogStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// The pool this store reads and writes through.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Returns the newest committed entry, or `None` on an empty log.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Pool` if no connection is available in time, or
    /// any error from [`latest_entry`].
    pub fn latest(&self) -> Result<Option<EventLogEntry>, StoreError> {
        let conn = self.pool.get()?;
        latest_entry(&conn)
    }

    /// Persists `candidate` and returns it once committed.
    ///
    /// # Errors
    ///
    /// See [`insert_entry`]. Ordering conflicts are logged at error level.
    pub fn insert(&self, candidate: EventLogEntry) -> Result<EventLogEntry, StoreError> {
        let mut conn = self.pool.get()?;
        match insert_entry(&mut conn, &candidate) {
            Ok(()) => Ok(candidate),
            Err(e @ StoreError::OrderingConflict { .. }) => {
                tracing::error!(
                    sequence = candidate.sequence,
                    "refusing non-contiguous insert: {}",
                    e
                );
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Returns up to `limit` entries, newest first, optionally strictly below
    /// `before`.
    ///
    /// # Errors
    ///
    /// See [`range_entries`].
    pub fn range(&self, limit: usize, before: Option<u64>) -> Result<Vec<EventLogEntry>, StoreError> {
        let conn = self.pool.get()?;
        range_entries(&conn, limit, before)
    }

    /// Number of committed entries.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` on SQL failure.
    pub fn count(&self) -> Result<u64, StoreError> {
        let conn = self.pool.get()?;
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM event_log", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Iterates every committed entry in ascending sequence order.
    ///
    /// The iterator is bounded by the tail at the time of this call, so it
    /// always terminates. It fetches in pages, one pooled connection per
    /// page. Call again to start over.
    ///
    /// An unreadable row is yielded as `StoreError::Corrupt` in its place;
    /// the rows after it are still yielded.
    ///
    /// # Errors
    ///
    /// Returns an error if the current tail cannot be read.
    pub fn all_ordered(&self) -> Result<ChainIter, StoreError> {
        let conn = self.pool.get()?;
        let upto: Option<u64> =
            conn.query_row("SELECT MAX(sequence) FROM event_log", [], |row| row.get(0))?;

        Ok(ChainIter {
            pool: self.pool.clone(),
            after: 0,
            upto: upto.unwrap_or(0),
            buffer: VecDeque::new(),
            exhausted: false,
        })
    }
}

/// Lazy ascending cursor over the event log. See [`LogStore::all_ordered`].
pub struct ChainIter {
    pool: DbPool,
    after: u64,
    upto: u64,
    buffer: VecDeque<RawRow>,
    exhausted: bool,
}

impl ChainIter {
    fn fetch_page(&mut self) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        let page = page_rows(&conn, self.after, self.upto, PAGE_SIZE)?;
        match page.last() {
            Some(last) => self.after = last.sequence,
            None => self.exhausted = true,
        }
        self.buffer.extend(page);
        Ok(())
    }
}

impl Iterator for ChainIter {
    type Item = Result<EventLogEntry, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(row) = self.buffer.pop_front() {
            return Some(row.into_entry());
        }
        if self.exhausted || self.after >= self.upto {
            return None;
        }
        if let Err(e) = self.fetch_page() {
            self.exhausted = true;
            return Some(Err(e));
        }
        self.buffer.pop_front().map(RawRow::into_entry)
    }
}
