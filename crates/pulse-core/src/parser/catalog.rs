//! Request-scoped failure dedup.
//!
//! Lives for one parsed document only. Cross-run dedup is the job of
//! [`crate::storage::failures`].

use crate::fingerprint::dedup_content;
use crate::model::FailureDefinition;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct FailureCatalog {
    by_key: HashMap<String, usize>,
    entries: Vec<FailureDefinition>,
}

impl FailureCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one failing case and returns the synthetic id (`ERR_n`) of
    /// its catalog entry. `trace` must already be trimmed and truncated.
    pub fn record(&mut self, message: &str, trace: &str) -> String {
        let key = dedup_content(trace, message);
        if let Some(&idx) = self.by_key.get(key) {
            let entry = &mut self.entries[idx];
            entry.occurrence_count += 1;
            return entry.id.clone();
        }

        let id = format!("ERR_{}", self.entries.len() + 1);
        self.by_key.insert(key.to_string(), self.entries.len());
        self.entries.push(FailureDefinition {
            id: id.clone(),
            message: message.to_string(),
            stack_trace: trace.to_string(),
            occurrence_count: 1,
        });
        id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<FailureDefinition> {
        self.entries
    }
}
