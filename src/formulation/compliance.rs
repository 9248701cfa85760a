//! Compliance validation against regulatory category ceilings.
//!
//! An ingredient above its category ceiling is reduced to the ceiling and
//! recorded as a violation. The removed mass goes back to compliant
//! ingredients of the same note class in a bounded number of passes, never
//! past a recipient's own ceiling or catalog maximum. Whatever cannot be
//! placed after the last pass is removed and reported.
//!
//! Category, allergen flag and catalog maximum come from the catalog's own
//! record for each ingredient name. A caller's record is only trusted for
//! names the catalog does not know.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::catalog::IngredientCatalog;
use crate::config::ComplianceSettings;
use crate::molecular::MolecularPropertyCalculator;
use crate::types::{
    ComplianceResult, DraftFormula, FormulaEntry, IngredientRecord, NoteClass, Violation,
};
use crate::utilities::errors::FormulationError;
use crate::utilities::paths::{resolve_data_file, BUILTIN_COMPLIANCE, COMPLIANCE_FILE};

/// Concentration differences below this are rounding noise.
const EPSILON_PCT: f64 = 1e-9;

/// Violation category for the finished-product allergen total.
pub const ALLERGEN_AGGREGATE: &str = "allergen-aggregate";

/// Violation `ingredient` label for the allergen total.
pub const ALLERGEN_TOTAL: &str = "allergen total";

fn default_allergen_limit() -> f64 {
    1.0
}

fn default_high_concentration_warning() -> f64 {
    20.0
}

/// Category ceilings and advisory limits, percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceTable {
    #[serde(default)]
    pub categories: BTreeMap<String, f64>,
    /// Aggregate allergen limit in the finished product.
    #[serde(default = "default_allergen_limit")]
    pub allergen_limit_pct: f64,
    /// Single-ingredient share of the concentrate that triggers a warning.
    #[serde(default = "default_high_concentration_warning")]
    pub high_concentration_warning_pct: f64,
}

impl Default for ComplianceTable {
    fn default() -> Self {
        Self {
            categories: BTreeMap::new(),
            allergen_limit_pct: default_allergen_limit(),
            high_concentration_warning_pct: default_high_concentration_warning(),
        }
    }
}

impl ComplianceTable {
    pub fn builtin() -> Result<Self, FormulationError> {
        Self::from_yaml_str(BUILTIN_COMPLIANCE, "builtin:compliance.yaml")
    }

    /// Load `compliance.yaml` from `data_dir`, or the built-in copy.
    pub fn load(data_dir: Option<&Path>) -> Result<Self, FormulationError> {
        let file = resolve_data_file(data_dir, COMPLIANCE_FILE, BUILTIN_COMPLIANCE)?;
        Self::from_yaml_str(&file.text, &file.origin)
    }

    pub fn from_yaml_str(yaml: &str, origin: &str) -> Result<Self, FormulationError> {
        let table: ComplianceTable = serde_yaml::from_str(yaml)?;
        for (category, limit) in &table.categories {
            if !(limit.is_finite() && *limit > 0.0 && *limit <= 100.0) {
                return Err(FormulationError::DataLoad {
                    path: origin.to_string(),
                    reason: format!("{category}: limit {limit} is outside (0, 100]"),
                });
            }
        }
        log::debug!(
            "Loaded {} compliance categories from {origin}",
            table.categories.len()
        );
        Ok(table)
    }

    pub fn with_category(mut self, category: impl Into<String>, limit_pct: f64) -> Self {
        self.categories.insert(category.into(), limit_pct);
        self
    }

    /// Ceiling of a record's category; `None` when unrestricted.
    pub fn ceiling(&self, record: &IngredientRecord) -> Option<(&str, f64)> {
        let category = record.compliance_category.as_deref()?;
        match self.categories.get_key_value(category) {
            Some((name, limit)) => Some((name.as_str(), *limit)),
            None => {
                log::warn!(
                    "{}: unknown compliance category {category}; treating as unrestricted",
                    record.name
                );
                None
            }
        }
    }

    /// Most a record may hold: its category ceiling or its catalog maximum.
    fn allowance(&self, record: &IngredientRecord) -> f64 {
        let ceiling = self.ceiling(record).map_or(f64::INFINITY, |(_, limit)| limit);
        ceiling.min(record.max_concentration_pct)
    }
}

/// Validates draft formulas and rewrites violating concentrations.
#[derive(Debug, Clone)]
pub struct ComplianceValidator {
    table: ComplianceTable,
    catalog: Arc<IngredientCatalog>,
    calculator: Arc<MolecularPropertyCalculator>,
    settings: ComplianceSettings,
}

impl ComplianceValidator {
    pub fn new(
        table: ComplianceTable,
        catalog: Arc<IngredientCatalog>,
        calculator: Arc<MolecularPropertyCalculator>,
        settings: ComplianceSettings,
    ) -> Self {
        Self {
            table,
            catalog,
            calculator,
            settings,
        }
    }

    pub fn table(&self) -> &ComplianceTable {
        &self.table
    }

    /// Validate `draft`, returning the adjusted formula and the result.
    ///
    /// The input is never modified. A balanced formula without violations
    /// comes back unchanged, so validating a validated formula is a no-op.
    pub fn validate(&self, draft: &DraftFormula) -> (DraftFormula, ComplianceResult) {
        let mut formula = draft.clone();
        let mut violations = Vec::new();
        let mut warnings = Vec::new();
        let mut truncated_pct = BTreeMap::new();
        let mut passes = 0;

        for (_, entry) in draft.entries() {
            if self.catalog.lookup(entry.name()).is_none() {
                log::warn!(
                    "{} is not in the catalog; validating against the supplied record",
                    entry.name()
                );
            }
        }

        for note_class in NoteClass::ALL {
            let share = note_class.target_share_pct();
            let partition = formula.partition_mut(note_class);

            let mut capped = vec![false; partition.len()];
            for (i, entry) in partition.iter_mut().enumerate() {
                let Some((category, limit)) = self.table.ceiling(self.reference(entry)) else {
                    continue;
                };
                if entry.concentration_pct > limit + EPSILON_PCT {
                    log::info!(
                        "{} at {:.3}% exceeds the {category} ceiling of {limit}%",
                        entry.name(),
                        entry.concentration_pct
                    );
                    violations.push(Violation {
                        ingredient: entry.name().to_string(),
                        limit_pct: limit,
                        observed_pct: entry.concentration_pct,
                        category: category.to_string(),
                    });
                    entry.concentration_pct = limit;
                    capped[i] = true;
                }
            }

            let sum: f64 = partition.iter().map(|e| e.concentration_pct).sum();
            let deficit = share - sum;
            if deficit < -EPSILON_PCT {
                warnings.push(format!(
                    "{note_class} notes sum to {sum:.3}%, above their {share}% share"
                ));
                continue;
            }
            if deficit <= EPSILON_PCT {
                continue;
            }

            let (residual, used) = self.redistribute(note_class, partition, &mut capped, deficit);
            passes = passes.max(used);
            if residual > EPSILON_PCT {
                log::warn!(
                    "{residual:.3}% of the {note_class} share could not be redistributed after {used} passes"
                );
                truncated_pct.insert(note_class, residual);
            }
        }

        let allergen_total_pct = self.allergen_total(&formula);
        if allergen_total_pct > self.table.allergen_limit_pct + EPSILON_PCT {
            log::info!(
                "Allergens total {allergen_total_pct:.3}% of the product, above the {}% limit",
                self.table.allergen_limit_pct
            );
            violations.push(Violation {
                ingredient: ALLERGEN_TOTAL.to_string(),
                limit_pct: self.table.allergen_limit_pct,
                observed_pct: allergen_total_pct,
                category: ALLERGEN_AGGREGATE.to_string(),
            });
        }
        for (_, entry) in formula.entries() {
            if entry.concentration_pct > self.table.high_concentration_warning_pct {
                warnings.push(format!(
                    "{} at {:.1}% exceeds {}% of the concentrate",
                    entry.name(),
                    entry.concentration_pct,
                    self.table.high_concentration_warning_pct
                ));
            }
        }

        let result = ComplianceResult {
            valid: violations.is_empty(),
            violations,
            warnings,
            allergen_total_pct,
            allergen_limit_pct: self.table.allergen_limit_pct,
            truncated_pct,
            passes,
        };
        (formula, result)
    }

    /// The catalog's record for an entry, or the entry's own for unknown names.
    fn reference<'a>(&'a self, entry: &'a FormulaEntry) -> &'a IngredientRecord {
        self.catalog
            .lookup(entry.name())
            .unwrap_or(&entry.ingredient)
    }

    /// Spread `deficit` over the uncapped entries of one partition.
    /// Returns the mass left over and the number of passes run.
    fn redistribute(
        &self,
        note_class: NoteClass,
        partition: &mut Vec<FormulaEntry>,
        capped: &mut Vec<bool>,
        deficit: f64,
    ) -> (f64, usize) {
        let mut remaining = deficit;
        let mut passes = 0;
        let mut neutral_added = false;

        while passes < self.settings.max_passes && remaining > EPSILON_PCT {
            let mut recipients: Vec<(usize, f64)> = self.recipients(partition, capped);
            if recipients.is_empty() && !neutral_added {
                neutral_added = true;
                recipients = self.add_neutral(note_class, partition, capped);
            }
            if recipients.is_empty() {
                break;
            }
            passes += 1;

            let weight_total: f64 = recipients
                .iter()
                .map(|(i, _)| partition[*i].concentration_pct)
                .sum();
            let pool = remaining;
            for (i, headroom) in &recipients {
                let weight = if weight_total > EPSILON_PCT {
                    partition[*i].concentration_pct / weight_total
                } else {
                    1.0 / recipients.len() as f64
                };
                let give = (pool * weight).min(*headroom);
                partition[*i].concentration_pct += give;
                remaining -= give;
            }
        }
        partition.retain(|e| e.concentration_pct > 0.0);
        (remaining.max(0.0), passes)
    }

    fn recipients(&self, partition: &[FormulaEntry], capped: &[bool]) -> Vec<(usize, f64)> {
        partition
            .iter()
            .enumerate()
            .filter(|(i, _)| !capped[*i])
            .map(|(i, e)| (i, self.table.allowance(self.reference(e)) - e.concentration_pct))
            .filter(|(_, headroom)| *headroom > EPSILON_PCT)
            .collect()
    }

    /// Bring the class's neutral ingredient in at 0% as a last-resort recipient.
    fn add_neutral(
        &self,
        note_class: NoteClass,
        partition: &mut Vec<FormulaEntry>,
        capped: &mut Vec<bool>,
    ) -> Vec<(usize, f64)> {
        let neutral = self.catalog.neutral(note_class);
        if partition.iter().any(|e| e.name() == neutral.name) {
            return Vec::new();
        }
        let headroom = self.table.allowance(neutral);
        if headroom <= EPSILON_PCT {
            return Vec::new();
        }
        log::debug!("Adding neutral {} to absorb {note_class} excess", neutral.name);
        let props = self.calculator.properties_or_default(neutral);
        partition.push(FormulaEntry::new(neutral.clone(), 0.0, Some(props)));
        capped.push(false);
        vec![(partition.len() - 1, headroom)]
    }

    /// Allergen mass in the finished product, percent.
    fn allergen_total(&self, formula: &DraftFormula) -> f64 {
        let concentrate: f64 = formula
            .entries()
            .filter(|(_, e)| self.reference(e).allergen)
            .map(|(_, e)| e.concentration_pct)
            .sum();
        concentrate * self.settings.product_concentration_pct / 100.0
    }
}
