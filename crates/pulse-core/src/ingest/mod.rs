//! Turns parsed reports into persisted run graphs.
//!
//! At most one run exists per (project, UTC day). The first report of a day
//! creates it; later reports of the same day are folded into it by
//! [`merge::plan_flips`]. Each report is applied inside one `BEGIN IMMEDIATE`
//! transaction, which is what serializes concurrent create-vs-merge decisions.

pub mod merge;

use crate::config::IngestConfig;
use crate::errors::{ConfigError, PulseError, Result};
use crate::model::{CaseDetail, CaseStatus, ParsedReport};
use crate::parser;
use crate::storage::failures::get_or_create_in;
use crate::storage::runs::{self, CaseWriter};
use crate::storage::Store;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

pub use merge::{
    AbsentTestPolicy, IdentityNormalizer, KeyNormalizer, NormalizerConfig, RegexNormalizer,
    SuffixMarkerNormalizer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    Created { run_id: i64 },
    Merged { run_id: i64, flipped: u32 },
    /// A run existed for the day and the report fixed nothing.
    Unchanged { run_id: i64 },
}

impl IngestOutcome {
    pub fn run_id(&self) -> i64 {
        match *self {
            IngestOutcome::Created { run_id }
            | IngestOutcome::Merged { run_id, .. }
            | IngestOutcome::Unchanged { run_id } => run_id,
        }
    }
}

#[derive(Clone)]
pub struct Coordinator {
    store: Store,
    normalizer: Arc<dyn KeyNormalizer>,
    absent_policy: AbsentTestPolicy,
}

impl Coordinator {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            normalizer: Arc::new(SuffixMarkerNormalizer::default()),
            absent_policy: AbsentTestPolicy::default(),
        }
    }

    pub fn from_config(store: Store, cfg: &IngestConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            store,
            normalizer: cfg.key_normalizer.build()?,
            absent_policy: cfg.absent_policy,
        })
    }

    pub fn with_normalizer(mut self, normalizer: Arc<dyn KeyNormalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_absent_policy(mut self, policy: AbsentTestPolicy) -> Self {
        self.absent_policy = policy;
        self
    }

    /// Parses every document, then applies them in order. Returns one run id
    /// per document; documents landing on the same day share a run id.
    ///
    /// A document that fails to parse aborts the whole call before anything
    /// is written.
    pub fn ingest<D: AsRef<[u8]>>(&self, project_id: i64, documents: &[D]) -> Result<Vec<i64>> {
        let reports = documents
            .iter()
            .enumerate()
            .map(|(index, doc)| {
                parser::parse(doc.as_ref()).map_err(|source| PulseError::Parse { index, source })
            })
            .collect::<Result<Vec<_>>>()?;

        {
            let conn = self.store.lock()?;
            if !runs::project_exists(&conn, project_id)? {
                return Err(PulseError::ProjectNotFound(project_id));
            }
        }

        let mut run_ids = Vec::with_capacity(reports.len());
        for report in &reports {
            run_ids.push(self.ingest_report(project_id, report)?.run_id());
        }
        Ok(run_ids)
    }

    pub fn ingest_report(&self, project_id: i64, report: &ParsedReport) -> Result<IngestOutcome> {
        self.ingest_report_at(project_id, report, Utc::now())
    }

    /// Like [`Self::ingest_report`], with `now` standing in for the execution
    /// time of reports that carry no timestamp.
    pub fn ingest_report_at(
        &self,
        project_id: i64,
        report: &ParsedReport,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome> {
        let executed_at = report.timestamp.unwrap_or(now);
        let day = executed_at.date_naive();

        let mut conn = self.store.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if !runs::project_exists(&tx, project_id)? {
            return Err(PulseError::ProjectNotFound(project_id));
        }

        let outcome = match runs::find_run_on_day(&tx, project_id, day)? {
            None => {
                let run_id = create_run(&tx, project_id, &executed_at, report)?;
                IngestOutcome::Created { run_id }
            }
            Some(existing) => {
                let failing = runs::failing_cases(&tx, existing.id)?;
                let planned = merge::plan_flips(
                    &failing,
                    report,
                    self.normalizer.as_ref(),
                    self.absent_policy,
                );
                let mut flipped = 0u32;
                for case_id in planned {
                    if runs::mark_passed(&tx, case_id)? {
                        flipped += 1;
                    }
                }
                if flipped > 0 {
                    runs::apply_flips(&tx, existing.id, flipped)?;
                    IngestOutcome::Merged {
                        run_id: existing.id,
                        flipped,
                    }
                } else {
                    IngestOutcome::Unchanged {
                        run_id: existing.id,
                    }
                }
            }
        };

        tx.commit()?;

        match outcome {
            IngestOutcome::Created { run_id } => tracing::info!(
                event = "ingest.run_created",
                project_id,
                run_id,
                %day,
                total = report.total_tests,
                failed = report.fail_count,
            ),
            IngestOutcome::Merged { run_id, flipped } => tracing::info!(
                event = "ingest.run_merged",
                project_id,
                run_id,
                %day,
                flipped,
            ),
            IngestOutcome::Unchanged { run_id } => {
                tracing::debug!(event = "ingest.merge_noop", project_id, run_id, %day)
            }
        }
        Ok(outcome)
    }
}

fn create_run(
    conn: &Connection,
    project_id: i64,
    executed_at: &DateTime<Utc>,
    report: &ParsedReport,
) -> Result<i64> {
    let run_id = runs::insert_run(conn, project_id, executed_at, report)?;
    let mut writer = CaseWriter::new(conn, run_id)?;

    // catalog ref -> failure row id, resolved once per report
    let mut resolved: HashMap<&str, i64> = HashMap::new();

    for detail in &report.passed_tests {
        write_case(&mut writer, detail, CaseStatus::Passed, None)?;
    }
    for detail in &report.failed_tests {
        let failure_id = match detail.failure_ref_id.as_deref() {
            Some(fref) => match resolved.get(fref) {
                Some(&id) => Some(id),
                None => match report.catalog_entry(fref) {
                    Some(def) => {
                        let rec = get_or_create_in(conn, &def.stack_trace, &def.message)?;
                        resolved.insert(fref, rec.id);
                        Some(rec.id)
                    }
                    None => {
                        tracing::warn!(
                            event = "ingest.dangling_failure_ref",
                            failure_ref = fref,
                            class_name = %detail.class_name,
                            test_name = %detail.test_name,
                        );
                        None
                    }
                },
            },
            None => None,
        };
        write_case(&mut writer, detail, CaseStatus::Failed, failure_id)?;
    }
    for detail in &report.skipped_tests {
        write_case(&mut writer, detail, CaseStatus::Skipped, None)?;
    }
    Ok(run_id)
}

fn write_case(
    writer: &mut CaseWriter<'_>,
    detail: &CaseDetail,
    status: CaseStatus,
    failure_id: Option<i64>,
) -> Result<()> {
    writer.insert(
        &detail.test_name,
        &detail.class_name,
        detail.duration,
        status,
        failure_id,
    )
}
