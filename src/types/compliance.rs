//! Compliance validation results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ingredient::NoteClass;

/// An ingredient found above its category ceiling, or the allergen total
/// found above its finished-product limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub ingredient: String,
    pub limit_pct: f64,
    /// Concentration before the validator reduced it.
    pub observed_pct: f64,
    pub category: String,
}

/// Outcome of validating a draft formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceResult {
    /// True only when no violation was recorded.
    pub valid: bool,
    pub violations: Vec<Violation>,
    /// Advisory findings that do not affect `valid`.
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Allergen mass in the finished product, percent.
    pub allergen_total_pct: f64,
    pub allergen_limit_pct: f64,
    /// Excess that could not be redistributed, per note class.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub truncated_pct: BTreeMap<NoteClass, f64>,
    /// Redistribution passes run.
    pub passes: usize,
}

impl ComplianceResult {
    pub fn violation_for(&self, ingredient: &str) -> Option<&Violation> {
        self.violations.iter().find(|v| v.ingredient == ingredient)
    }
}
