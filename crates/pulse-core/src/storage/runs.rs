//! Run graph writes. Every function here runs on a connection the caller
//! already holds, normally inside the ingestion transaction.

use super::rows::{format_day, format_ts, row_to_case, row_to_run, CASE_COLUMNS, RUN_COLUMNS};
use crate::errors::Result;
use crate::model::{Case, CaseStatus, ParsedReport, Run};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};

pub(crate) fn project_exists(conn: &Connection, project_id: i64) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM projects WHERE id = ?1",
            params![project_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Earliest run of the project on the given day.
pub(crate) fn find_run_on_day(
    conn: &Connection,
    project_id: i64,
    day: NaiveDate,
) -> Result<Option<Run>> {
    let sql = format!(
        "SELECT {} FROM runs WHERE project_id = ?1 AND run_day = ?2 ORDER BY id ASC LIMIT 1",
        RUN_COLUMNS
    );
    let run = conn
        .query_row(&sql, params![project_id, format_day(&day)], row_to_run)
        .optional()?;
    Ok(run)
}

pub(crate) fn insert_run(
    conn: &Connection,
    project_id: i64,
    executed_at: &DateTime<Utc>,
    report: &ParsedReport,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO runs(project_id, executed_at, run_day, total_tests, pass_count, fail_count,
                          skip_count, total_duration)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            project_id,
            format_ts(executed_at),
            format_day(&executed_at.date_naive()),
            report.total_tests,
            report.pass_count,
            report.fail_count,
            report.skip_count,
            report.total_duration,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) struct CaseWriter<'c> {
    stmt: rusqlite::Statement<'c>,
    run_id: i64,
}

impl<'c> CaseWriter<'c> {
    pub(crate) fn new(conn: &'c Connection, run_id: i64) -> Result<Self> {
        let stmt = conn.prepare(
            "INSERT INTO cases(run_id, test_name, class_name, duration, status, failure_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        Ok(Self { stmt, run_id })
    }

    pub(crate) fn insert(
        &mut self,
        test_name: &str,
        class_name: &str,
        duration: f64,
        status: CaseStatus,
        failure_id: Option<i64>,
    ) -> Result<()> {
        self.stmt.execute(params![
            self.run_id,
            test_name,
            class_name,
            duration,
            status.as_str(),
            failure_id
        ])?;
        Ok(())
    }
}

pub(crate) fn failing_cases(conn: &Connection, run_id: i64) -> Result<Vec<Case>> {
    let sql = format!(
        "SELECT {} FROM cases WHERE run_id = ?1 AND status = 'FAILED' ORDER BY id ASC",
        CASE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let cases = stmt
        .query_map(params![run_id], row_to_case)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(cases)
}

/// Flips one FAILED case to PASSED and drops its failure link. Returns false
/// when the case was no longer FAILED.
pub(crate) fn mark_passed(conn: &Connection, case_id: i64) -> Result<bool> {
    let n = conn.execute(
        "UPDATE cases SET status = 'PASSED', failure_id = NULL
         WHERE id = ?1 AND status = 'FAILED'",
        params![case_id],
    )?;
    Ok(n == 1)
}

/// Moves `flipped` cases from the fail column to the pass column. The fail
/// count never drops below zero.
pub(crate) fn apply_flips(conn: &Connection, run_id: i64, flipped: u32) -> Result<()> {
    conn.execute(
        "UPDATE runs
         SET pass_count = pass_count + ?1,
             fail_count = MAX(0, fail_count - ?1)
         WHERE id = ?2",
        params![flipped, run_id],
    )?;
    Ok(())
}
