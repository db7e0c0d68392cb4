//! JUnit-style XML → [`ParsedReport`].
//!
//! Every `<testcase>` in the document is visited regardless of how suites are
//! nested. A case with a `<failure>` or `<error>` child is FAILED, one with a
//! `<skipped>` child is SKIPPED, anything else is PASSED. Failure traces are
//! bounded to [`crate::fingerprint::MAX_TRACE_CHARS`] and deduplicated within
//! the document into the report's failure catalog.

pub mod catalog;
mod junit;

use crate::errors::ParseError;
use crate::model::ParsedReport;

pub use catalog::FailureCatalog;

pub fn parse(bytes: &[u8]) -> Result<ParsedReport, ParseError> {
    let report = junit::parse_junit(bytes)?;
    tracing::debug!(
        event = "report.parsed",
        total = report.total_tests,
        passed = report.pass_count,
        failed = report.fail_count,
        skipped = report.skip_count,
        unique_failures = report.failure_catalog.len(),
    );
    Ok(report)
}
