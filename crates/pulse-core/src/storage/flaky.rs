use super::rows::{now_ts, row_to_flaky, FLAKY_COLUMNS};
use super::Store;
use crate::errors::{PulseError, Result};
use crate::model::{FlakyManagement, FlakyStatusUpdate};
use rusqlite::{params, Connection, OptionalExtension};

impl Store {
    /// Stored triage state, or the unresolved default when the pair was never
    /// touched. Reading does not create a row.
    pub fn flaky_management(&self, class_name: &str, test_name: &str) -> Result<FlakyManagement> {
        let conn = self.lock()?;
        Ok(find(&conn, class_name, test_name)?
            .unwrap_or_else(|| FlakyManagement::unmanaged(class_name, test_name)))
    }

    /// Find-or-create by (class, test), then write the new state. `status`,
    /// `assignee` and `notes` keep their stored value when not given.
    pub fn upsert_flaky_management(
        &self,
        class_name: &str,
        test_name: &str,
        update: &FlakyStatusUpdate,
    ) -> Result<FlakyManagement> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO flaky_management(
                class_name, test_name, acknowledged, resolution_status, assignee, notes, updated_at
             ) VALUES (?1, ?2, ?3, COALESCE(?4, 'unresolved'), ?5, ?6, ?7)
             ON CONFLICT(class_name, test_name) DO UPDATE SET
                acknowledged = excluded.acknowledged,
                resolution_status = COALESCE(?4, flaky_management.resolution_status),
                assignee = COALESCE(?5, flaky_management.assignee),
                notes = COALESCE(?6, flaky_management.notes),
                updated_at = excluded.updated_at",
            params![
                class_name,
                test_name,
                update.acknowledged,
                update.status.map(|s| s.as_str()),
                update.assignee,
                update.notes,
                now_ts()
            ],
        )?;

        let saved = find(&conn, class_name, test_name)?.ok_or_else(|| {
            PulseError::Corrupt(format!(
                "flaky management for {}#{} missing after upsert",
                class_name, test_name
            ))
        })?;
        tracing::info!(
            event = "flaky.status_updated",
            class_name,
            test_name,
            acknowledged = saved.acknowledged,
            status = saved.resolution_status.as_str(),
        );
        Ok(saved)
    }
}

pub(crate) fn find(
    conn: &Connection,
    class_name: &str,
    test_name: &str,
) -> Result<Option<FlakyManagement>> {
    let sql = format!(
        "SELECT {} FROM flaky_management WHERE class_name = ?1 AND test_name = ?2",
        FLAKY_COLUMNS
    );
    let rec = conn
        .query_row(&sql, params![class_name, test_name], row_to_flaky)
        .optional()?;
    Ok(rec)
}
