use serde::Serialize;
use std::collections::BTreeSet;

/// Set difference between local live keys and external keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffResult {
    /// Present locally (not struck), absent externally.
    pub new_locally: Vec<String>,
    /// Present externally, absent or only struck locally.
    pub missing_locally: Vec<String>,
    pub matched: Vec<String>,
}

impl DiffResult {
    pub fn is_clean(&self) -> bool {
        self.new_locally.is_empty() && self.missing_locally.is_empty()
    }
}

/// Compare two key sets. All three lists come out sorted.
pub fn diff(local: &BTreeSet<String>, external: &BTreeSet<String>) -> DiffResult {
    DiffResult {
        new_locally: local.difference(external).cloned().collect(),
        missing_locally: external.difference(local).cloned().collect(),
        matched: local.intersection(external).cloned().collect(),
    }
}
