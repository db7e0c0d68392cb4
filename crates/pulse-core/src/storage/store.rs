use super::rows::{
    format_day, format_ts, now_ts, row_to_case, row_to_failure, row_to_run, CASE_COLUMNS,
    FAILURE_COLUMNS, RUN_COLUMNS,
};
use crate::errors::{PulseError, Result};
use crate::model::{Case, FailureRecord, Project, Run, RunDetail};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct Store {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub projects: u64,
    pub runs: u64,
    pub cases: u64,
    pub failures: u64,
    pub last_run_at: Option<String>,
}

impl Store {
    /// Opens a file database in WAL mode, so a second `Store` on the same
    /// path can serve analytics reads while ingestion writes.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |r| r.get(0))?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(super::schema::DDL)?;
        Ok(())
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| PulseError::LockPoisoned)
    }

    // projects

    pub fn create_project(&self, name: &str, description: Option<&str>) -> Result<Project> {
        let conn = self.lock()?;
        let created_at = now_ts();
        conn.execute(
            "INSERT INTO projects(name, description, created_at) VALUES (?1, ?2, ?3)",
            params![name, description, created_at],
        )?;
        Ok(Project {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            description: description.map(str::to_string),
            created_at,
        })
    }

    pub fn get_project(&self, id: i64) -> Result<Option<Project>> {
        let conn = self.lock()?;
        let project = conn
            .query_row(
                "SELECT id, name, description, created_at FROM projects WHERE id = ?1",
                params![id],
                |r| {
                    Ok(Project {
                        id: r.get(0)?,
                        name: r.get(1)?,
                        description: r.get(2)?,
                        created_at: r.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(project)
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT id, name, description, created_at FROM projects ORDER BY id")?;
        let rows = stmt
            .query_map([], |r| {
                Ok(Project {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    description: r.get(2)?,
                    created_at: r.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // runs

    pub fn get_run(&self, run_id: i64) -> Result<Option<Run>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS);
        let run = conn.query_row(&sql, params![run_id], row_to_run).optional()?;
        Ok(run)
    }

    pub fn run_detail(&self, run_id: i64) -> Result<RunDetail> {
        let run = self
            .get_run(run_id)?
            .ok_or(PulseError::RunNotFound(run_id))?;
        let cases = self.cases_for_run(run_id)?;
        Ok(RunDetail {
            health: run.health(),
            run,
            cases,
        })
    }

    pub fn cases_for_run(&self, run_id: i64) -> Result<Vec<Case>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM cases WHERE run_id = ?1 ORDER BY id ASC",
            CASE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let cases = stmt
            .query_map(params![run_id], row_to_case)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(cases)
    }

    /// FAILED cases of a run with their linked failure record, in case order.
    pub fn failed_cases_with_failures(
        &self,
        run_id: i64,
    ) -> Result<Vec<(Case, Option<FailureRecord>)>> {
        let cases = self.cases_for_run(run_id)?;
        let conn = self.lock()?;
        let sql = format!("SELECT {} FROM failures WHERE id = ?1", FAILURE_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;

        let mut out = Vec::new();
        for case in cases
            .into_iter()
            .filter(|c| c.status == crate::model::CaseStatus::Failed)
        {
            let failure = match case.failure_id {
                Some(id) => stmt.query_row(params![id], row_to_failure).optional()?,
                None => None,
            };
            out.push((case, failure));
        }
        Ok(out)
    }

    /// Most recent first. `since` is exclusive.
    pub fn list_runs(
        &self,
        project_id: i64,
        limit: Option<u32>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Run>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM runs
             WHERE project_id = ?1 AND (?2 IS NULL OR executed_at > ?2)
             ORDER BY executed_at DESC, id DESC
             LIMIT ?3",
            RUN_COLUMNS
        );
        let limit = limit.map(i64::from).unwrap_or(-1);
        let since = since.as_ref().map(format_ts);
        let mut stmt = conn.prepare(&sql)?;
        let runs = stmt
            .query_map(params![project_id, since, limit], row_to_run)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    pub fn delete_run(&self, run_id: i64) -> Result<()> {
        let conn = self.lock()?;
        let n = conn.execute("DELETE FROM runs WHERE id = ?1", params![run_id])?;
        if n == 0 {
            return Err(PulseError::RunNotFound(run_id));
        }
        tracing::info!(event = "run.deleted", run_id);
        Ok(())
    }

    pub fn delete_runs_on(&self, project_id: i64, date: NaiveDate) -> Result<usize> {
        let conn = self.lock()?;
        let n = conn.execute(
            "DELETE FROM runs WHERE project_id = ?1 AND run_day = ?2",
            params![project_id, format_day(&date)],
        )?;
        if n == 0 {
            return Err(PulseError::NoRunsOnDate { project_id, date });
        }
        tracing::info!(event = "run.deleted_by_date", project_id, %date, runs = n);
        Ok(n)
    }

    pub fn set_run_analysis(&self, run_id: i64, analysis: &str) -> Result<()> {
        let conn = self.lock()?;
        let n = conn.execute(
            "UPDATE runs SET ai_analysis = ?1 WHERE id = ?2",
            params![analysis, run_id],
        )?;
        if n == 0 {
            return Err(PulseError::RunNotFound(run_id));
        }
        Ok(())
    }

    pub fn stats_best_effort(&self) -> Result<StoreStats> {
        let conn = self.lock()?;
        let count = |table: &str| -> u64 {
            let sql = format!("SELECT COUNT(*) FROM {}", table);
            conn.query_row(&sql, [], |r| r.get::<_, i64>(0))
                .map(|n| n as u64)
                .unwrap_or(0)
        };

        let last_run_at: Option<String> = conn
            .query_row(
                "SELECT executed_at FROM runs ORDER BY executed_at DESC LIMIT 1",
                [],
                |r| r.get(0),
            )
            .ok();

        Ok(StoreStats {
            projects: count("projects"),
            runs: count("runs"),
            cases: count("cases"),
            failures: count("failures"),
            last_run_at,
        })
    }
}
