//! AI summaries of a single run.
//!
//! The summary is cached on the run row. Anything that goes wrong while
//! talking to the model (errors, timeouts, cancellation) becomes
//! [`AnalysisOutcome::Failed`] and is never cached.

pub mod fake;
pub mod openai;

use crate::config::{AnalysisConfig, AnalysisProvider};
use crate::errors::{PulseError, Result};
use crate::model::{CaseDetail, CaseStatus, FailureDefinition, Run};
use crate::storage::Store;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

#[async_trait]
pub trait AnalysisClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String>;
    fn provider_name(&self) -> &'static str;
}

/// Stands in when no model is configured; every request fails with `reason`.
pub struct UnavailableClient {
    reason: String,
}

impl UnavailableClient {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl AnalysisClient for UnavailableClient {
    async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
        anyhow::bail!("{}", self.reason)
    }

    fn provider_name(&self) -> &'static str {
        "unavailable"
    }
}

pub fn client_from_config(cfg: &AnalysisConfig) -> Arc<dyn AnalysisClient> {
    match (cfg.provider, cfg.api_key.as_ref()) {
        (AnalysisProvider::Disabled, _) => Arc::new(UnavailableClient::new("analysis is disabled")),
        (AnalysisProvider::Openai, None) => Arc::new(UnavailableClient::new(
            "no API key (set PULSE_ANALYSIS_API_KEY or OPENAI_API_KEY)",
        )),
        (AnalysisProvider::Openai, Some(key)) => Arc::new(openai::OpenAiClient::new(
            cfg.model.clone(),
            key.clone(),
            cfg.base_url.clone(),
        )),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "text", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    /// Stored text from an earlier request.
    Cached(String),
    Generated(String),
    /// Marker text describing why no analysis was produced.
    Failed(String),
}

impl AnalysisOutcome {
    pub fn text(&self) -> &str {
        match self {
            AnalysisOutcome::Cached(t) | AnalysisOutcome::Generated(t) | AnalysisOutcome::Failed(t) => t,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, AnalysisOutcome::Failed(_))
    }
}

/// Run rebuilt from storage in the shape the model is prompted with. Passed
/// and skipped cases are left out; only their counts are kept.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisContext {
    pub total_tests: u32,
    pub pass_count: u32,
    pub fail_count: u32,
    pub skip_count: u32,
    pub total_duration: f64,
    /// Keyed by failure hash.
    pub failure_catalog: Vec<FailureDefinition>,
    pub failed_tests: Vec<CaseDetail>,
}

pub fn reconstruct(store: &Store, run: &Run) -> Result<AnalysisContext> {
    let mut catalog: Vec<FailureDefinition> = Vec::new();
    let mut by_hash: HashMap<String, usize> = HashMap::new();
    let mut failed_tests = Vec::new();

    for (case, failure) in store.failed_cases_with_failures(run.id)? {
        let failure_ref_id = failure.map(|f| {
            match by_hash.get(&f.failure_hash) {
                Some(&idx) => catalog[idx].occurrence_count += 1,
                None => {
                    by_hash.insert(f.failure_hash.clone(), catalog.len());
                    catalog.push(FailureDefinition {
                        id: f.failure_hash.clone(),
                        message: f.message,
                        stack_trace: f.stack_trace,
                        occurrence_count: 1,
                    });
                }
            }
            f.failure_hash
        });
        failed_tests.push(CaseDetail {
            test_name: case.test_name,
            class_name: case.class_name,
            duration: case.duration,
            status: CaseStatus::Failed,
            failure_ref_id,
        });
    }

    Ok(AnalysisContext {
        total_tests: run.total_tests,
        pass_count: run.pass_count,
        fail_count: run.fail_count,
        skip_count: run.skip_count,
        total_duration: run.total_duration,
        failure_catalog: catalog,
        failed_tests,
    })
}

const PROMPT_TEMPLATE: &str = r#"You are a senior QA automation lead reviewing a test execution report given as JSON.

Analyze the failures and return a structured summary.

1. Use 'failureCatalog' to understand the root causes.
2. Group 'failedTests' by those root causes via 'failureRefId'.
3. Use the counts only as pass rate context.

Return valid JSON only, without markdown formatting, shaped as:
{
  "executiveSummary": "Two sentences on overall build health.",
  "failureAnalysis": [
    {
      "rootCause": "Short description of the error",
      "count": 5,
      "affectedFeatures": ["Login"],
      "suggestedFix": "What the developer should check"
    }
  ],
  "flakinessCheck": "Whether any failures look like timing issues or flakiness."
}

Report data:
"#;

pub fn build_prompt(ctx: &AnalysisContext) -> Result<String> {
    let json = serde_json::to_string(ctx)?;
    Ok(format!("{}{}", PROMPT_TEMPLATE, json))
}

/// Drops a surrounding Markdown code fence (optionally tagged `json`).
pub fn strip_code_fences(text: &str) -> String {
    let mut s = text.trim();
    if let Some(rest) = s.strip_prefix("```") {
        s = rest.strip_prefix("json").unwrap_or(rest).trim_start();
    }
    if let Some(rest) = s.trim_end().strip_suffix("```") {
        s = rest.trim_end();
    }
    s.to_string()
}

#[derive(Clone)]
pub struct AnalysisService {
    store: Store,
    client: Arc<dyn AnalysisClient>,
    timeout: Duration,
}

impl AnalysisService {
    pub fn new(store: Store, client: Arc<dyn AnalysisClient>, timeout: Duration) -> Self {
        Self {
            store,
            client,
            timeout,
        }
    }

    pub fn from_config(store: Store, cfg: &AnalysisConfig) -> Self {
        Self::new(
            store,
            client_from_config(cfg),
            Duration::from_secs(cfg.timeout_secs),
        )
    }

    /// Starts the analysis on the current tokio runtime.
    pub fn spawn(&self, run_id: i64) -> AnalysisTask {
        let svc = self.clone();
        AnalysisTask {
            run_id,
            handle: tokio::spawn(async move { svc.analyze(run_id).await }),
        }
    }

    /// Errors only when the run does not exist or storage fails.
    pub async fn analyze(&self, run_id: i64) -> Result<AnalysisOutcome> {
        let run = self
            .blocking(move |store| store.get_run(run_id))
            .await?
            .ok_or(PulseError::RunNotFound(run_id))?;

        if let Some(text) = run.ai_analysis.as_deref().filter(|t| !t.trim().is_empty()) {
            tracing::debug!(event = "analysis.cache_hit", run_id);
            return Ok(AnalysisOutcome::Cached(text.to_string()));
        }

        let ctx = self.blocking(move |store| reconstruct(store, &run)).await?;
        let prompt = build_prompt(&ctx)?;
        tracing::info!(
            event = "analysis.requested",
            run_id,
            provider = self.client.provider_name(),
            prompt_chars = prompt.len(),
            unique_failures = ctx.failure_catalog.len(),
        );

        let reply = match tokio::time::timeout(self.timeout, self.client.complete(&prompt)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                tracing::warn!(event = "analysis.failed", run_id, error = %e);
                return Ok(AnalysisOutcome::Failed(format!("AI analysis failed: {}", e)));
            }
            Err(_) => {
                tracing::warn!(event = "analysis.timeout", run_id, timeout_secs = self.timeout.as_secs());
                return Ok(AnalysisOutcome::Failed(format!(
                    "AI analysis timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        let text = strip_code_fences(&reply);
        let stored = text.clone();
        self.blocking(move |store| store.set_run_analysis(run_id, &stored))
            .await?;
        tracing::info!(event = "analysis.stored", run_id, chars = text.len());
        Ok(AnalysisOutcome::Generated(text))
    }

    /// Store access holds a mutex and runs SQLite; keep it off the async
    /// worker threads.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Store) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || f(&store)).await?
    }
}

pub struct AnalysisTask {
    run_id: i64,
    handle: JoinHandle<Result<AnalysisOutcome>>,
}

impl AnalysisTask {
    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn wait(self) -> Result<AnalysisOutcome> {
        match self.handle.await {
            Ok(res) => res,
            Err(e) if e.is_cancelled() => {
                tracing::info!(event = "analysis.cancelled", run_id = self.run_id);
                Ok(AnalysisOutcome::Failed("AI analysis cancelled".to_string()))
            }
            Err(e) => Ok(AnalysisOutcome::Failed(format!("AI analysis task failed: {}", e))),
        }
    }
}
