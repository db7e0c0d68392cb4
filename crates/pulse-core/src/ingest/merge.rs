//! Folding a rerun report into the run already recorded for the same day.
//!
//! Only FAILED cases of the existing run are considered. A rerun can fix a
//! failure but never introduce one, add cases, or touch skip counts.

use crate::errors::ConfigError;
use crate::model::{case_key, Case, CaseDetail, CaseStatus, ParsedReport};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

pub const DEFAULT_SUFFIX_MARKER: &str = "_KAN";

/// Maps the `class#test` key of an already stored failing case onto the key
/// a rerun report would use for the same test.
pub trait KeyNormalizer: Send + Sync {
    fn normalize<'a>(&self, key: &'a str) -> Cow<'a, str>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityNormalizer;

impl KeyNormalizer for IdentityNormalizer {
    fn normalize<'a>(&self, key: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(key)
    }
}

/// Drops everything from the first occurrence of `marker` onwards.
#[derive(Debug, Clone)]
pub struct SuffixMarkerNormalizer {
    marker: String,
}

impl SuffixMarkerNormalizer {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }
}

impl Default for SuffixMarkerNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_SUFFIX_MARKER)
    }
}

impl KeyNormalizer for SuffixMarkerNormalizer {
    fn normalize<'a>(&self, key: &'a str) -> Cow<'a, str> {
        if self.marker.is_empty() {
            return Cow::Borrowed(key);
        }
        match key.find(&self.marker) {
            Some(idx) => Cow::Borrowed(&key[..idx]),
            None => Cow::Borrowed(key),
        }
    }
}

/// Removes every match of a pattern from the key.
#[derive(Debug, Clone)]
pub struct RegexNormalizer {
    pattern: Regex,
}

impl RegexNormalizer {
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        let pattern = Regex::new(pattern)
            .map_err(|e| ConfigError(format!("invalid key normalizer pattern: {}", e)))?;
        Ok(Self { pattern })
    }
}

impl KeyNormalizer for RegexNormalizer {
    fn normalize<'a>(&self, key: &'a str) -> Cow<'a, str> {
        self.pattern.replace_all(key, "")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum NormalizerConfig {
    Identity,
    Suffix {
        #[serde(default = "default_marker")]
        marker: String,
    },
    Regex {
        pattern: String,
    },
}

fn default_marker() -> String {
    DEFAULT_SUFFIX_MARKER.to_string()
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        NormalizerConfig::Suffix {
            marker: default_marker(),
        }
    }
}

impl NormalizerConfig {
    pub fn build(&self) -> Result<Arc<dyn KeyNormalizer>, ConfigError> {
        Ok(match self {
            NormalizerConfig::Identity => Arc::new(IdentityNormalizer),
            NormalizerConfig::Suffix { marker } => Arc::new(SuffixMarkerNormalizer::new(marker)),
            NormalizerConfig::Regex { pattern } => Arc::new(RegexNormalizer::new(pattern)?),
        })
    }
}

/// What to do with a stored failure whose test does not appear in the rerun.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AbsentTestPolicy {
    /// The test passed in some intermediate run that was never uploaded.
    #[default]
    AssumeFixed,
    KeepFailed,
}

struct RerunOutcome {
    status: CaseStatus,
    has_failure_ref: bool,
}

/// Normalized `class#test` -> outcome over the passed and failed buckets of
/// the rerun. Within a bucket the first occurrence wins; a failed entry
/// replaces a passed one for the same key.
fn rerun_lookup(
    report: &ParsedReport,
    normalizer: &dyn KeyNormalizer,
) -> HashMap<String, RerunOutcome> {
    let bucket = |details: &[CaseDetail]| {
        let mut out = HashMap::with_capacity(details.len());
        for d in details {
            let key = d.key();
            out.entry(normalizer.normalize(&key).into_owned())
                .or_insert(RerunOutcome {
                    status: d.status,
                    has_failure_ref: d.failure_ref_id.is_some(),
                });
        }
        out
    };

    let mut lookup = bucket(&report.passed_tests);
    lookup.extend(bucket(&report.failed_tests));
    lookup
}

/// Ids of the failing cases the rerun turns into passes.
pub fn plan_flips(
    failing: &[Case],
    rerun: &ParsedReport,
    normalizer: &dyn KeyNormalizer,
    policy: AbsentTestPolicy,
) -> Vec<i64> {
    let lookup = rerun_lookup(rerun, normalizer);
    failing
        .iter()
        .filter(|case| case.status == CaseStatus::Failed)
        .filter(|case| {
            let key = case_key(&case.class_name, &case.test_name);
            match lookup.get(&*normalizer.normalize(&key)) {
                None => policy == AbsentTestPolicy::AssumeFixed,
                Some(o) => o.status == CaseStatus::Passed || !o.has_failure_ref,
            }
        })
        .map(|case| case.id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failing(id: i64, class: &str, test: &str) -> Case {
        Case {
            id,
            run_id: 1,
            test_name: test.into(),
            class_name: class.into(),
            duration: 0.1,
            status: CaseStatus::Failed,
            failure_id: Some(1),
        }
    }

    fn detail(class: &str, test: &str, status: CaseStatus, fref: Option<&str>) -> CaseDetail {
        CaseDetail {
            test_name: test.into(),
            class_name: class.into(),
            duration: 0.1,
            status,
            failure_ref_id: fref.map(str::to_string),
        }
    }

    #[test]
    fn test_suffix_marker_strips_from_first_occurrence() {
        let n = SuffixMarkerNormalizer::default();
        assert_eq!(n.normalize("a.Login#signIn_KAN-12_KAN-13"), "a.Login#signIn");
        assert_eq!(n.normalize("a.Login#signIn"), "a.Login#signIn");
        assert_eq!(SuffixMarkerNormalizer::new("").normalize("x_KAN"), "x_KAN");
    }

    #[test]
    fn test_regex_normalizer_removes_matches() {
        let n = RegexNormalizer::new(r"\[\d+\]").unwrap();
        assert_eq!(n.normalize("a.B#param[3]"), "a.B#param");
        assert!(RegexNormalizer::new("(").is_err());
    }

    #[test]
    fn test_flips_absent_and_passed_keeps_refailed() {
        let existing = vec![
            failing(1, "a.B", "fixed"),
            failing(2, "a.B", "missing"),
            failing(3, "a.B", "still_broken"),
        ];
        let rerun = ParsedReport {
            passed_tests: vec![detail("a.B", "fixed", CaseStatus::Passed, None)],
            failed_tests: vec![detail("a.B", "still_broken", CaseStatus::Failed, Some("ERR_1"))],
            ..Default::default()
        };

        let flips = plan_flips(
            &existing,
            &rerun,
            &IdentityNormalizer,
            AbsentTestPolicy::AssumeFixed,
        );
        assert_eq!(flips, vec![1, 2]);

        let flips = plan_flips(
            &existing,
            &rerun,
            &IdentityNormalizer,
            AbsentTestPolicy::KeepFailed,
        );
        assert_eq!(flips, vec![1]);
    }

    #[test]
    fn test_failed_without_reference_counts_as_fixed() {
        let existing = vec![failing(7, "a.B", "t")];
        let rerun = ParsedReport {
            failed_tests: vec![detail("a.B", "t", CaseStatus::Failed, None)],
            ..Default::default()
        };
        let flips = plan_flips(&existing, &rerun, &IdentityNormalizer, AbsentTestPolicy::KeepFailed);
        assert_eq!(flips, vec![7]);
    }

    #[test]
    fn test_failed_entry_overrides_passed_entry() {
        let existing = vec![failing(1, "a.B", "t")];
        let rerun = ParsedReport {
            passed_tests: vec![detail("a.B", "t", CaseStatus::Passed, None)],
            failed_tests: vec![detail("a.B", "t", CaseStatus::Failed, Some("ERR_1"))],
            ..Default::default()
        };
        let flips = plan_flips(&existing, &rerun, &IdentityNormalizer, AbsentTestPolicy::AssumeFixed);
        assert!(flips.is_empty());
    }

    #[test]
    fn test_stored_key_is_normalized_before_lookup() {
        let existing = vec![failing(4, "a.Login", "signIn_KAN-99")];
        let rerun = ParsedReport {
            failed_tests: vec![detail("a.Login", "signIn", CaseStatus::Failed, Some("ERR_1"))],
            ..Default::default()
        };
        let flips = plan_flips(
            &existing,
            &rerun,
            &SuffixMarkerNormalizer::default(),
            AbsentTestPolicy::AssumeFixed,
        );
        assert!(flips.is_empty());

        // without normalization the stored key is absent, so it counts as fixed
        let flips = plan_flips(&existing, &rerun, &IdentityNormalizer, AbsentTestPolicy::AssumeFixed);
        assert_eq!(flips, vec![4]);
    }

    #[test]
    fn test_rerun_keys_are_normalized_too() {
        let existing = vec![failing(5, "a.Login", "signIn_KAN-101")];
        let rerun = ParsedReport {
            failed_tests: vec![detail("a.Login", "signIn_KAN-101", CaseStatus::Failed, Some("ERR_1"))],
            ..Default::default()
        };
        let flips = plan_flips(
            &existing,
            &rerun,
            &SuffixMarkerNormalizer::default(),
            AbsentTestPolicy::AssumeFixed,
        );
        assert!(flips.is_empty());

        let rerun = ParsedReport {
            passed_tests: vec![detail("a.Login", "signIn_KAN-202", CaseStatus::Passed, None)],
            ..Default::default()
        };
        let flips = plan_flips(
            &existing,
            &rerun,
            &SuffixMarkerNormalizer::default(),
            AbsentTestPolicy::KeepFailed,
        );
        assert_eq!(flips, vec![5]);
    }

    #[test]
    fn test_normalizer_config_yaml() {
        let cfg: NormalizerConfig = serde_yaml::from_str("kind: regex\npattern: '_v\\d+$'").unwrap();
        assert_eq!(
            cfg,
            NormalizerConfig::Regex {
                pattern: "_v\\d+$".into()
            }
        );
        let cfg: NormalizerConfig = serde_yaml::from_str("kind: suffix").unwrap();
        assert_eq!(cfg, NormalizerConfig::default());
        assert!(cfg.build().is_ok());
    }
}
