//! Read-side aggregation over persisted runs.
//!
//! Nothing here writes except [`AnalyticsEngine::update_flaky_status`]. Empty
//! windows produce zero-valued results; only an unknown project is an error.

mod flaky;
mod patterns;
mod trends;

pub use flaky::{FlakyMetrics, FlakyTest, FlakyTestsResponse};
pub use patterns::{classify, FailurePattern, PatternCategory};
pub use trends::{DashboardMetrics, TrendPoint, TrendsResponse};

use crate::errors::{PulseError, Result};
use crate::model::{FlakyManagement, FlakyStatusUpdate};
use crate::storage::{Store, Window};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of top failures fed into pattern classification.
pub const PATTERN_SAMPLE: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureStat {
    pub failure_id: i64,
    pub hash: String,
    pub message: String,
    pub count: u64,
}

#[derive(Clone)]
pub struct AnalyticsEngine {
    store: Store,
}

impl AnalyticsEngine {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn trends(&self, project_id: i64, days: u32) -> Result<TrendsResponse> {
        self.trends_at(project_id, days, Utc::now())
    }

    pub fn trends_at(&self, project_id: i64, days: u32, now: DateTime<Utc>) -> Result<TrendsResponse> {
        let window = self.window(project_id, days, now)?;
        trends::compute(&self.store, project_id, &window)
    }

    pub fn top_failures(&self, project_id: i64, days: u32, limit: u32) -> Result<Vec<FailureStat>> {
        self.top_failures_at(project_id, days, limit, Utc::now())
    }

    pub fn top_failures_at(
        &self,
        project_id: i64,
        days: u32,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<FailureStat>> {
        let window = self.window(project_id, days, now)?;
        let rows = self.store.top_failures(project_id, &window, limit)?;
        Ok(rows
            .into_iter()
            .map(|r| FailureStat {
                failure_id: r.failure_id,
                hash: r.hash,
                message: r.message,
                count: r.count,
            })
            .collect())
    }

    pub fn flaky_tests(&self, project_id: i64, days: u32, threshold: f64) -> Result<FlakyTestsResponse> {
        self.flaky_tests_at(project_id, days, threshold, Utc::now())
    }

    pub fn flaky_tests_at(
        &self,
        project_id: i64,
        days: u32,
        threshold: f64,
        now: DateTime<Utc>,
    ) -> Result<FlakyTestsResponse> {
        let window = self.window(project_id, days, now)?;
        flaky::compute(&self.store, project_id, &window, threshold)
    }

    pub fn failure_patterns(&self, project_id: i64, days: u32) -> Result<Vec<FailurePattern>> {
        self.failure_patterns_at(project_id, days, Utc::now())
    }

    pub fn failure_patterns_at(
        &self,
        project_id: i64,
        days: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<FailurePattern>> {
        let top = self.top_failures_at(project_id, days, PATTERN_SAMPLE, now)?;
        Ok(patterns::bucket(&top))
    }

    fn window(&self, project_id: i64, days: u32, now: DateTime<Utc>) -> Result<Window> {
        if self.store.get_project(project_id)?.is_none() {
            return Err(PulseError::ProjectNotFound(project_id));
        }
        Ok(Window::last_days(days, now))
    }

    pub fn update_flaky_status(
        &self,
        class_name: &str,
        test_name: &str,
        update: &FlakyStatusUpdate,
    ) -> Result<FlakyManagement> {
        self.store
            .upsert_flaky_management(class_name, test_name, update)
    }
}

pub(crate) fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
