use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::Diagnostics;

/// Outcome of one named validation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Human-readable step name.
    pub display_name: String,
    /// Diagnostics produced by the step.
    pub logs: Diagnostics,
}

/// Results of a validation run keyed by step identifier.
///
/// Aggregates are always derived from the stored results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationResults {
    results: BTreeMap<String, ValidationResult>,
}

impl ValidationResults {
    /// Creates an empty result set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome of one step.
    pub fn insert(&mut self, step_id: impl Into<String>, result: ValidationResult) {
        self.results.insert(step_id.into(), result);
    }

    /// Returns the outcome of one step.
    #[must_use]
    pub fn get(&self, step_id: &str) -> Option<&ValidationResult> {
        self.results.get(step_id)
    }

    /// Iterates results ordered by step identifier.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ValidationResult)> {
        self.results.iter()
    }

    /// Returns the number of recorded steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Returns true when no step was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Returns true when any step logged an error.
    #[must_use]
    pub fn failed(&self) -> bool {
        self.results
            .values()
            .any(|result| !result.logs.has_succeeded())
    }

    /// Returns the display names of failed steps, one per line.
    #[must_use]
    pub fn failure_message(&self) -> String {
        self.results
            .values()
            .filter(|result| !result.logs.has_succeeded())
            .map(|result| format!("{}\n", result.display_name))
            .collect()
    }
}
