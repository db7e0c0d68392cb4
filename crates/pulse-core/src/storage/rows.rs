//! Row mapping shared by the store modules.

use crate::model::{Case, CaseStatus, FailureRecord, FlakyManagement, ResolutionStatus, Run};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;

pub(crate) const RUN_COLUMNS: &str = "id, project_id, executed_at, run_day, total_tests, \
     pass_count, fail_count, skip_count, total_duration, ai_analysis";

pub(crate) const CASE_COLUMNS: &str =
    "id, run_id, test_name, class_name, duration, status, failure_id";

pub(crate) const FAILURE_COLUMNS: &str = "id, failure_hash, message, stack_trace";

pub(crate) const FLAKY_COLUMNS: &str =
    "id, class_name, test_name, acknowledged, resolution_status, assignee, notes";

/// Fixed-width UTC timestamps so that text comparison orders chronologically.
pub(crate) fn format_ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn format_day(day: &NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

pub(crate) fn now_ts() -> String {
    format_ts(&Utc::now())
}

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn invalid_text(idx: usize, what: &str, value: &str) -> rusqlite::Error {
    let msg = format!("invalid {}: {}", what, value);
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        Box::<dyn std::error::Error + Send + Sync>::from(msg),
    )
}

fn get_ts(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

pub(crate) fn get_day(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| conversion_error(idx, e))
}

pub(crate) fn row_to_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<Run> {
    Ok(Run {
        id: row.get(0)?,
        project_id: row.get(1)?,
        executed_at: get_ts(row, 2)?,
        run_day: get_day(row, 3)?,
        total_tests: row.get(4)?,
        pass_count: row.get(5)?,
        fail_count: row.get(6)?,
        skip_count: row.get(7)?,
        total_duration: row.get(8)?,
        ai_analysis: row.get(9)?,
    })
}

pub(crate) fn row_to_case(row: &rusqlite::Row<'_>) -> rusqlite::Result<Case> {
    let raw: String = row.get(5)?;
    let status = CaseStatus::parse(&raw).ok_or_else(|| invalid_text(5, "case status", &raw))?;
    Ok(Case {
        id: row.get(0)?,
        run_id: row.get(1)?,
        test_name: row.get(2)?,
        class_name: row.get(3)?,
        duration: row.get(4)?,
        status,
        failure_id: row.get(6)?,
    })
}

pub(crate) fn row_to_failure(row: &rusqlite::Row<'_>) -> rusqlite::Result<FailureRecord> {
    Ok(FailureRecord {
        id: row.get(0)?,
        failure_hash: row.get(1)?,
        message: row.get(2)?,
        stack_trace: row.get(3)?,
    })
}

pub(crate) fn row_to_flaky(row: &rusqlite::Row<'_>) -> rusqlite::Result<FlakyManagement> {
    let raw: String = row.get(4)?;
    let resolution_status = ResolutionStatus::parse(&raw)
        .ok_or_else(|| invalid_text(4, "resolution status", &raw))?;
    Ok(FlakyManagement {
        id: Some(row.get(0)?),
        class_name: row.get(1)?,
        test_name: row.get(2)?,
        acknowledged: row.get(3)?,
        resolution_status,
        assignee: row.get(5)?,
        notes: row.get(6)?,
    })
}
