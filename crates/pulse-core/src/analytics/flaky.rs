use super::round2;
use crate::errors::Result;
use crate::model::ResolutionStatus;
use crate::storage::{Store, Window};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlakyTest {
    pub test_name: String,
    pub class_name: String,
    pub total_executions: u64,
    pub fail_count: u64,
    pub pass_count: u64,
    pub flakiness_score: f64,
    /// `None` while the test has never been triaged.
    pub management_id: Option<i64>,
    pub acknowledged: bool,
    pub resolution_status: ResolutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlakyMetrics {
    pub total_flaky_tests: u64,
    pub acknowledged_count: u64,
    pub resolved_count: u64,
    pub in_progress_count: u64,
    pub investigating_count: u64,
    pub unresolved_count: u64,
}

impl FlakyMetrics {
    fn of(tests: &[FlakyTest]) -> Self {
        let mut m = Self {
            total_flaky_tests: tests.len() as u64,
            ..Default::default()
        };
        for t in tests {
            if t.acknowledged {
                m.acknowledged_count += 1;
            }
            match t.resolution_status {
                ResolutionStatus::Resolved => m.resolved_count += 1,
                ResolutionStatus::InProgress => m.in_progress_count += 1,
                ResolutionStatus::Investigating => m.investigating_count += 1,
                ResolutionStatus::Unresolved => m.unresolved_count += 1,
            }
        }
        m
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlakyTestsResponse {
    pub metrics: FlakyMetrics,
    pub tests: Vec<FlakyTest>,
}

pub(super) fn compute(
    store: &Store,
    project_id: i64,
    window: &Window,
    threshold: f64,
) -> Result<FlakyTestsResponse> {
    let mut tests = Vec::new();
    for c in store.flaky_candidates(project_id, window)? {
        if c.total == 0 {
            continue;
        }
        let score = round2(c.failures as f64 / c.total as f64 * 100.0);
        if score < threshold {
            continue;
        }
        let mgmt = store.flaky_management(&c.class_name, &c.test_name)?;
        tests.push(FlakyTest {
            pass_count: c.total - c.failures,
            test_name: c.test_name,
            class_name: c.class_name,
            total_executions: c.total,
            fail_count: c.failures,
            flakiness_score: score,
            management_id: mgmt.id,
            acknowledged: mgmt.acknowledged,
            resolution_status: mgmt.resolution_status,
            assignee: mgmt.assignee,
            notes: mgmt.notes,
        });
    }

    // stable: equal scores keep (class, test) order from the query
    tests.sort_by(|a, b| b.flakiness_score.total_cmp(&a.flakiness_score));

    Ok(FlakyTestsResponse {
        metrics: FlakyMetrics::of(&tests),
        tests,
    })
}
