//! Read-only aggregation queries behind the analytics engine.
//!
//! Every query is scoped to one project and a [`Window`]. Grouping for top
//! failures happens on the failure id / hash, never on trace text.

use super::rows::{format_ts, get_day, row_to_run, RUN_COLUMNS};
use super::Store;
use crate::errors::Result;
use crate::model::Run;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::params;
use serde::Serialize;

/// Half-open time range `(since, until]` over run execution timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl Window {
    /// Windows reaching past the representable range start at
    /// [`DateTime::MIN_UTC`] and so cover all history.
    pub fn last_days(days: u32, now: DateTime<Utc>) -> Self {
        Self {
            since: earlier_by(now, Duration::days(i64::from(days))),
            until: now,
        }
    }

    /// The equally sized window that ends where this one starts.
    pub fn preceding(&self) -> Self {
        let len = self.until - self.since;
        Self {
            since: earlier_by(self.since, len),
            until: self.since,
        }
    }

    fn bounds(&self) -> (String, String) {
        (format_ts(&self.since), format_ts(&self.until))
    }
}

/// A (class, test) pair that both passed and failed in the window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlakyCandidate {
    pub class_name: String,
    pub test_name: String,
    pub total: u64,
    pub failures: u64,
}

/// One row of the top-failures ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureCount {
    pub failure_id: i64,
    pub hash: String,
    pub message: String,
    pub count: u64,
}

impl Store {
    /// Runs in the window, most recent first.
    pub fn runs_in_window(&self, project_id: i64, window: &Window) -> Result<Vec<Run>> {
        let conn = self.lock()?;
        let (since, until) = window.bounds();
        let sql = format!(
            "SELECT {} FROM runs
             WHERE project_id = ?1 AND executed_at > ?2 AND executed_at <= ?3
             ORDER BY executed_at DESC, id DESC",
            RUN_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let runs = stmt
            .query_map(params![project_id, since, until], row_to_run)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    /// (run day, duration) of every non-skipped case in the window.
    pub fn case_durations(&self, project_id: i64, window: &Window) -> Result<Vec<(NaiveDate, f64)>> {
        let conn = self.lock()?;
        let (since, until) = window.bounds();
        let mut stmt = conn.prepare(
            "SELECT r.run_day, c.duration
             FROM cases c JOIN runs r ON r.id = c.run_id
             WHERE r.project_id = ?1 AND r.executed_at > ?2 AND r.executed_at <= ?3
               AND c.status <> 'SKIPPED'",
        )?;
        let rows = stmt
            .query_map(params![project_id, since, until], |r| {
                Ok((get_day(r, 0)?, r.get::<_, f64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Distinct (class, test) pairs with at least one FAILED case.
    pub fn unique_failing_tests(&self, project_id: i64, window: &Window) -> Result<u64> {
        let conn = self.lock()?;
        let (since, until) = window.bounds();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM (
                SELECT DISTINCT c.class_name, c.test_name
                FROM cases c JOIN runs r ON r.id = c.run_id
                WHERE r.project_id = ?1 AND r.executed_at > ?2 AND r.executed_at <= ?3
                  AND c.status = 'FAILED'
             )",
            params![project_id, since, until],
            |r| r.get(0),
        )?;
        Ok(n as u64)
    }

    /// Failures ranked by how many in-window cases link to them. Ties are
    /// broken by hash so the order is stable.
    pub fn top_failures(
        &self,
        project_id: i64,
        window: &Window,
        limit: u32,
    ) -> Result<Vec<FailureCount>> {
        let conn = self.lock()?;
        let (since, until) = window.bounds();
        let mut stmt = conn.prepare(
            "SELECT f.id, f.failure_hash, f.message, COUNT(*) AS n
             FROM cases c
             JOIN runs r ON r.id = c.run_id
             JOIN failures f ON f.id = c.failure_id
             WHERE r.project_id = ?1 AND r.executed_at > ?2 AND r.executed_at <= ?3
               AND c.status = 'FAILED'
             GROUP BY f.id, f.failure_hash, f.message
             ORDER BY n DESC, f.failure_hash ASC
             LIMIT ?4",
        )?;
        let rows = stmt
            .query_map(params![project_id, since, until, limit], |r| {
                Ok(FailureCount {
                    failure_id: r.get(0)?,
                    hash: r.get(1)?,
                    message: r.get(2)?,
                    count: r.get::<_, i64>(3)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn flaky_candidates(&self, project_id: i64, window: &Window) -> Result<Vec<FlakyCandidate>> {
        let conn = self.lock()?;
        let (since, until) = window.bounds();
        let mut stmt = conn.prepare(
            "SELECT c.class_name, c.test_name, COUNT(*) AS total,
                    SUM(CASE WHEN c.status = 'FAILED' THEN 1 ELSE 0 END) AS failures
             FROM cases c JOIN runs r ON r.id = c.run_id
             WHERE r.project_id = ?1 AND r.executed_at > ?2 AND r.executed_at <= ?3
             GROUP BY c.class_name, c.test_name
             HAVING SUM(c.status = 'PASSED') > 0 AND SUM(c.status = 'FAILED') > 0
             ORDER BY c.class_name, c.test_name",
        )?;
        let rows = stmt
            .query_map(params![project_id, since, until], |r| {
                Ok(FlakyCandidate {
                    class_name: r.get(0)?,
                    test_name: r.get(1)?,
                    total: r.get::<_, i64>(2)? as u64,
                    failures: r.get::<_, i64>(3)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn earlier_by(t: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    t.checked_sub_signed(by).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_preceding_window_is_adjacent() {
        let now = Utc.with_ymd_and_hms(2025, 3, 15, 12, 0, 0).unwrap();
        let w = Window::last_days(7, now);
        let prev = w.preceding();
        assert_eq!(prev.until, w.since);
        assert_eq!(prev.since, now - Duration::days(14));
    }

    #[test]
    fn test_huge_day_counts_clamp_to_all_history() {
        let now = Utc.with_ymd_and_hms(2025, 3, 15, 12, 0, 0).unwrap();
        let w = Window::last_days(u32::MAX, now);
        assert_eq!(w.since, DateTime::<Utc>::MIN_UTC);
        assert_eq!(w.until, now);

        let prev = w.preceding();
        assert_eq!((prev.since, prev.until), (DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MIN_UTC));

        // fits once, but not twice
        let prev = Window::last_days(60_000_000, now).preceding();
        assert_eq!(prev.since, DateTime::<Utc>::MIN_UTC);

        // the clamped lower bound still sorts before any stored timestamp
        let (since, until) = w.bounds();
        assert!(since < format_ts(&Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap()));
        assert!(since < until);
    }

    #[test]
    fn test_empty_store_queries_return_nothing() {
        let s = Store::memory().unwrap();
        s.init_schema().unwrap();
        let w = Window::last_days(30, Utc::now());
        assert!(s.runs_in_window(1, &w).unwrap().is_empty());
        assert!(s.case_durations(1, &w).unwrap().is_empty());
        assert_eq!(s.unique_failing_tests(1, &w).unwrap(), 0);
        assert!(s.top_failures(1, &w, 10).unwrap().is_empty());
        assert!(s.flaky_candidates(1, &w).unwrap().is_empty());
    }
}
