//! Content-addressed failure records shared across runs and projects.
//!
//! One row per distinct hash. Rows are never updated; cases point at them by
//! id. Occurrence counting is not done here, it is derived from cases.

use super::rows::{now_ts, row_to_failure, FAILURE_COLUMNS};
use super::Store;
use crate::errors::{PulseError, Result};
use crate::fingerprint::{dedup_content, failure_hash, short_message};
use crate::model::FailureRecord;
use rusqlite::{params, Connection, OptionalExtension};

#[derive(Clone)]
pub struct FailureStore {
    store: Store,
}

impl FailureStore {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn get_or_create(&self, trace: &str, message: &str) -> Result<FailureRecord> {
        let conn = self.store.lock()?;
        get_or_create_in(&conn, trace, message)
    }

    pub fn get_by_hash(&self, hash: &str) -> Result<Option<FailureRecord>> {
        let conn = self.store.lock()?;
        find_by_hash(&conn, hash)
    }

    pub fn count(&self) -> Result<u64> {
        let conn = self.store.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM failures", [], |r| r.get(0))?;
        Ok(n as u64)
    }
}

/// Looks the failure up by content hash and inserts it on a miss. Runs on
/// whatever connection or transaction the caller holds.
///
/// A concurrent writer inserting the same hash first is not an error: the
/// conflicting insert is dropped and the winner's row is read back.
pub(crate) fn get_or_create_in(
    conn: &Connection,
    trace: &str,
    message: &str,
) -> Result<FailureRecord> {
    let hash = failure_hash(trace, message);
    if let Some(existing) = find_by_hash(conn, &hash)? {
        return Ok(existing);
    }
    insert_or_read(conn, &hash, trace, message)
}

/// Second half of [`get_or_create_in`], entered after a lookup miss. The row
/// may have appeared since the lookup.
fn insert_or_read(
    conn: &Connection,
    hash: &str,
    trace: &str,
    message: &str,
) -> Result<FailureRecord> {
    let stored_trace = dedup_content(trace, message);
    let inserted = conn.execute(
        "INSERT INTO failures(failure_hash, message, stack_trace, created_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(failure_hash) DO NOTHING",
        params![hash, short_message(trace, message), stored_trace, now_ts()],
    )?;
    if inserted == 0 {
        tracing::debug!(event = "failure.insert_conflict", hash = %hash);
    } else {
        tracing::debug!(event = "failure.created", hash = %hash);
    }

    find_by_hash(conn, hash)?
        .ok_or_else(|| PulseError::Corrupt(format!("failure {} missing after insert", hash)))
}

pub(crate) fn find_by_hash(conn: &Connection, hash: &str) -> Result<Option<FailureRecord>> {
    let sql = format!(
        "SELECT {} FROM failures WHERE failure_hash = ?1",
        FAILURE_COLUMNS
    );
    let rec = conn.query_row(&sql, params![hash], row_to_failure).optional()?;
    Ok(rec)
}
