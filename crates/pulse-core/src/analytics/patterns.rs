//! Keyword heuristics over failure short messages. Not authoritative.

use super::FailureStat;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatternCategory {
    Timeout,
    Assertion,
    NullReference,
    StaleElement,
    Connectivity,
    Other,
}

impl PatternCategory {
    pub const ALL: [PatternCategory; 6] = [
        PatternCategory::Timeout,
        PatternCategory::Assertion,
        PatternCategory::NullReference,
        PatternCategory::StaleElement,
        PatternCategory::Connectivity,
        PatternCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PatternCategory::Timeout => "timeout",
            PatternCategory::Assertion => "assertion",
            PatternCategory::NullReference => "null-reference",
            PatternCategory::StaleElement => "stale-element",
            PatternCategory::Connectivity => "connectivity",
            PatternCategory::Other => "other",
        }
    }
}

// checked in order, first hit wins
const RULES: &[(PatternCategory, &[&str])] = &[
    (PatternCategory::Timeout, &["timeout", "nosuchelement"]),
    (PatternCategory::Assertion, &["assertion", "expected"]),
    (PatternCategory::NullReference, &["nullpointer", "null reference"]),
    (PatternCategory::StaleElement, &["stale", "detached"]),
    (PatternCategory::Connectivity, &["connection", "http"]),
];

pub fn classify(message: &str) -> PatternCategory {
    let msg = message.to_lowercase();
    RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| msg.contains(k)))
        .map(|(cat, _)| *cat)
        .unwrap_or(PatternCategory::Other)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailurePattern {
    pub category: PatternCategory,
    pub count: u64,
}

pub(super) fn bucket(failures: &[FailureStat]) -> Vec<FailurePattern> {
    let mut counts = [0u64; PatternCategory::ALL.len()];
    for f in failures {
        let cat = classify(&f.message);
        if let Some(idx) = PatternCategory::ALL.iter().position(|c| *c == cat) {
            counts[idx] += f.count;
        }
    }

    let mut out: Vec<FailurePattern> = PatternCategory::ALL
        .iter()
        .zip(counts)
        .filter(|(_, n)| *n > 0)
        .map(|(category, count)| FailurePattern {
            category: *category,
            count,
        })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count));
    out
}
