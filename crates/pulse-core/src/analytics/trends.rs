use super::{round1, round2};
use crate::errors::Result;
use crate::model::{pass_rate, Run};
use crate::storage::{Store, Window};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendsResponse {
    pub metrics: DashboardMetrics,
    pub daily_trends: Vec<TrendPoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardMetrics {
    pub total_runs: u64,
    /// Σpass / Σ(total - skip) over the window, not a mean of per-run rates.
    pub avg_pass_rate: f64,
    pub latest_pass_rate: f64,
    /// Current window rate minus the rate of the window just before it.
    pub pass_rate_trend: f64,
    pub total_unique_failures: u64,
    pub avg_execution_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub total_tests: u64,
    pub pass_count: u64,
    pub fail_count: u64,
    pub skip_count: u64,
    pub pass_rate: f64,
    pub avg_duration: f64,
    pub min_duration: f64,
    pub max_duration: f64,
}

#[derive(Debug, Default, Clone, Copy)]
struct Totals {
    total: u64,
    pass: u64,
    fail: u64,
    skip: u64,
}

impl Totals {
    fn add(&mut self, run: &Run) {
        self.total += u64::from(run.total_tests);
        self.pass += u64::from(run.pass_count);
        self.fail += u64::from(run.fail_count);
        self.skip += u64::from(run.skip_count);
    }

    fn of(runs: &[Run]) -> Self {
        let mut t = Self::default();
        for r in runs {
            t.add(r);
        }
        t
    }

    fn pass_rate(&self) -> f64 {
        pass_rate(self.pass, self.total, self.skip)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct DurationStats {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl DurationStats {
    fn push(&mut self, d: f64) {
        if self.count == 0 {
            self.min = d;
            self.max = d;
        } else {
            self.min = self.min.min(d);
            self.max = self.max.max(d);
        }
        self.count += 1;
        self.sum += d;
    }

    fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

pub(super) fn compute(store: &Store, project_id: i64, window: &Window) -> Result<TrendsResponse> {
    let runs = store.runs_in_window(project_id, window)?;
    let durations = store.case_durations(project_id, window)?;
    let previous = store.runs_in_window(project_id, &window.preceding())?;
    let unique_failures = store.unique_failing_tests(project_id, window)?;

    let mut per_day: BTreeMap<NaiveDate, (Totals, DurationStats)> = BTreeMap::new();
    for run in &runs {
        per_day.entry(run.run_day).or_default().0.add(run);
    }
    let mut overall = DurationStats::default();
    for (day, d) in &durations {
        per_day.entry(*day).or_default().1.push(*d);
        overall.push(*d);
    }

    let daily_trends = per_day
        .into_iter()
        .map(|(date, (t, d))| TrendPoint {
            date,
            total_tests: t.total,
            pass_count: t.pass,
            fail_count: t.fail,
            skip_count: t.skip,
            pass_rate: round1(t.pass_rate()),
            avg_duration: round2(d.mean()),
            min_duration: round2(d.min),
            max_duration: round2(d.max),
        })
        .collect();

    let current_rate = Totals::of(&runs).pass_rate();
    let previous_rate = Totals::of(&previous).pass_rate();
    // runs are ordered most recent first
    let latest_pass_rate = runs.first().map(Run::pass_rate).unwrap_or(0.0);

    let metrics = DashboardMetrics {
        total_runs: runs.len() as u64,
        avg_pass_rate: round1(current_rate),
        latest_pass_rate: round1(latest_pass_rate),
        pass_rate_trend: round1(current_rate - previous_rate),
        total_unique_failures: unique_failures,
        avg_execution_time: round2(overall.mean()),
    };

    Ok(TrendsResponse {
        metrics,
        daily_trends,
    })
}
