use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseStatus {
    Passed,
    Failed,
    Skipped,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Passed => "PASSED",
            CaseStatus::Failed => "FAILED",
            CaseStatus::Skipped => "SKIPPED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PASSED" | "PASS" => Some(CaseStatus::Passed),
            "FAILED" | "FAIL" => Some(CaseStatus::Failed),
            "SKIPPED" | "SKIP" => Some(CaseStatus::Skipped),
            _ => None,
        }
    }
}

impl std::fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unique failure seen inside a single report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureDefinition {
    pub id: String,
    pub message: String,
    pub stack_trace: String,
    pub occurrence_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseDetail {
    pub test_name: String,
    pub class_name: String,
    pub duration: f64,
    pub status: CaseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_ref_id: Option<String>,
}

impl CaseDetail {
    /// `className#testName`, the identity used when folding reruns.
    pub fn key(&self) -> String {
        case_key(&self.class_name, &self.test_name)
    }
}

pub fn case_key(class_name: &str, test_name: &str) -> String {
    format!("{}#{}", class_name, test_name)
}

/// Canonical in-memory form of one report document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedReport {
    pub total_tests: u32,
    pub pass_count: u32,
    pub fail_count: u32,
    pub skip_count: u32,
    pub total_duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub failure_catalog: Vec<FailureDefinition>,
    pub passed_tests: Vec<CaseDetail>,
    pub failed_tests: Vec<CaseDetail>,
    pub skipped_tests: Vec<CaseDetail>,
}

impl ParsedReport {
    pub fn catalog_entry(&self, id: &str) -> Option<&FailureDefinition> {
        self.failure_catalog.iter().find(|f| f.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunHealth {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: i64,
    pub project_id: i64,
    pub executed_at: DateTime<Utc>,
    pub run_day: NaiveDate,
    pub total_tests: u32,
    pub pass_count: u32,
    pub fail_count: u32,
    pub skip_count: u32,
    pub total_duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_analysis: Option<String>,
}

impl Run {
    pub fn pass_rate(&self) -> f64 {
        pass_rate(
            self.pass_count as u64,
            self.total_tests as u64,
            self.skip_count as u64,
        )
    }

    pub fn health(&self) -> RunHealth {
        if self.total_tests > 0 && self.pass_rate() > 85.0 {
            RunHealth::Healthy
        } else {
            RunHealth::Unhealthy
        }
    }
}

/// pass / (total - skip) as a percentage; 0 when nothing was executed.
pub fn pass_rate(pass: u64, total: u64, skip: u64) -> f64 {
    let executed = total.saturating_sub(skip);
    if executed == 0 {
        return 0.0;
    }
    pass as f64 / executed as f64 * 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub id: i64,
    pub run_id: i64,
    pub test_name: String,
    pub class_name: String,
    pub duration: f64,
    pub status: CaseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDetail {
    #[serde(flatten)]
    pub run: Run,
    pub health: RunHealth,
    pub cases: Vec<Case>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub id: i64,
    pub failure_hash: String,
    pub message: String,
    pub stack_trace: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionStatus {
    #[default]
    Unresolved,
    Investigating,
    InProgress,
    Resolved,
}

impl ResolutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStatus::Unresolved => "unresolved",
            ResolutionStatus::Investigating => "investigating",
            ResolutionStatus::InProgress => "in-progress",
            ResolutionStatus::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unresolved" => Some(ResolutionStatus::Unresolved),
            "investigating" => Some(ResolutionStatus::Investigating),
            "in-progress" | "in_progress" => Some(ResolutionStatus::InProgress),
            "resolved" => Some(ResolutionStatus::Resolved),
            _ => None,
        }
    }
}

impl std::str::FromStr for ResolutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            format!(
                "unknown resolution status '{}' (expected unresolved|investigating|in-progress|resolved)",
                s
            )
        })
    }
}

/// Triage state of a (class, test) pair. `id` is `None` until the record is
/// first written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlakyManagement {
    pub id: Option<i64>,
    pub class_name: String,
    pub test_name: String,
    pub acknowledged: bool,
    pub resolution_status: ResolutionStatus,
    pub assignee: Option<String>,
    pub notes: Option<String>,
}

impl FlakyManagement {
    pub fn unmanaged(class_name: &str, test_name: &str) -> Self {
        Self {
            id: None,
            class_name: class_name.to_string(),
            test_name: test_name.to_string(),
            acknowledged: false,
            resolution_status: ResolutionStatus::Unresolved,
            assignee: None,
            notes: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlakyStatusUpdate {
    pub acknowledged: bool,
    pub status: Option<ResolutionStatus>,
    pub assignee: Option<String>,
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_rate_excludes_skipped() {
        assert_eq!(pass_rate(8, 10, 0), 80.0);
        assert_eq!(pass_rate(4, 5, 1), 100.0);
        assert_eq!(pass_rate(0, 3, 3), 0.0);
        assert_eq!(pass_rate(0, 0, 0), 0.0);
    }

    #[test]
    fn test_resolution_status_serde() {
        let s: ResolutionStatus = serde_json::from_str("\"in-progress\"").unwrap();
        assert_eq!(s, ResolutionStatus::InProgress);
        assert_eq!(
            serde_json::to_string(&ResolutionStatus::Unresolved).unwrap(),
            "\"unresolved\""
        );
        assert!("bogus".parse::<ResolutionStatus>().is_err());
    }

    #[test]
    fn test_run_health_threshold() {
        let mut run = Run {
            id: 1,
            project_id: 1,
            executed_at: Utc::now(),
            run_day: Utc::now().date_naive(),
            total_tests: 100,
            pass_count: 86,
            fail_count: 14,
            skip_count: 0,
            total_duration: 1.0,
            ai_analysis: None,
        };
        assert_eq!(run.health(), RunHealth::Healthy);
        run.pass_count = 85;
        assert_eq!(run.health(), RunHealth::Unhealthy);
        run.total_tests = 0;
        run.pass_count = 0;
        assert_eq!(run.health(), RunHealth::Unhealthy);
    }
}
