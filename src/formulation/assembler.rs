//! Formula assembler.
//!
//! Selects catalog ingredients for the weighted accords, proportions them so
//! each note class fills exactly its target share, then applies correction
//! directives as share-preserving relative adjustments.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::Serialize;

use crate::catalog::IngredientCatalog;
use crate::emotion::WeightedAccords;
use crate::molecular::MolecularPropertyCalculator;
use crate::types::{
    CorrectionDirective, CorrectionTarget, DirectiveFocus, DraftFormula, FormulaEntry,
    IngredientRecord, MolecularProperties, NoteClass, ScentFamily,
};

/// Weight multiplier for a match on a secondary (non-primary) family tag.
const SECONDARY_FAMILY_FACTOR: f64 = 0.5;
/// Below this a concentration is treated as zero.
const EPSILON_PCT: f64 = 1e-9;

/// Runtime degradations observed while assembling one formula.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssemblyReport {
    /// Ingredients left out because their descriptor could not be computed.
    pub excluded_ingredients: Vec<String>,
    /// Note classes filled with the catalog's neutral ingredient.
    pub neutral_fallbacks: Vec<NoteClass>,
    /// Directives that could not be applied, with the reason.
    pub skipped_directives: Vec<String>,
}

/// Builds draft formulas from accords and directives.
#[derive(Debug, Clone)]
pub struct FormulaAssembler {
    catalog: Arc<IngredientCatalog>,
    calculator: Arc<MolecularPropertyCalculator>,
    max_per_class: usize,
}

impl FormulaAssembler {
    pub fn new(
        catalog: Arc<IngredientCatalog>,
        calculator: Arc<MolecularPropertyCalculator>,
        max_per_class: usize,
    ) -> Self {
        Self {
            catalog,
            calculator,
            max_per_class: max_per_class.max(1),
        }
    }

    /// Select, proportion and correct a draft formula.
    pub fn assemble(
        &self,
        accords: &WeightedAccords,
        directives: &[CorrectionDirective],
    ) -> DraftFormula {
        self.assemble_with_report(accords, directives).0
    }

    pub fn assemble_with_report(
        &self,
        accords: &WeightedAccords,
        directives: &[CorrectionDirective],
    ) -> (DraftFormula, AssemblyReport) {
        let mut report = AssemblyReport::default();
        let mut draft = self.select(accords, &mut report);
        for directive in directives {
            if let Err(reason) = apply_directive(&mut draft, directive) {
                log::info!("Skipping directive {}: {reason}", directive.rule_id);
                report
                    .skipped_directives
                    .push(format!("{}: {reason}", directive.rule_id));
            }
        }
        (draft, report)
    }

    /// Selection and proportioning only; every partition sums to its share.
    pub fn select(&self, accords: &WeightedAccords, report: &mut AssemblyReport) -> DraftFormula {
        let mut draft = DraftFormula::new();
        for note_class in NoteClass::ALL {
            let share = note_class.target_share_pct();

            let mut scored: Vec<(&IngredientRecord, MolecularProperties, f64)> = Vec::new();
            for record in self.catalog.in_class(note_class) {
                let weight = accord_weight(record, accords);
                if weight <= 0.0 {
                    continue;
                }
                match self.calculator.properties_for(record) {
                    Ok(props) => {
                        scored.push((record, props, weight * share * record.base_concentration_pct))
                    }
                    Err(err) => {
                        log::warn!("Excluding {}: {err}", record.name);
                        report.excluded_ingredients.push(record.name.clone());
                    }
                }
            }
            scored.sort_by(|a, b| {
                b.2.partial_cmp(&a.2)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.0.name.cmp(&b.0.name))
            });
            scored.truncate(self.max_per_class);

            let partition = draft.partition_mut(note_class);
            let total: f64 = scored.iter().map(|s| s.2).sum();
            if scored.is_empty() || total <= 0.0 {
                let neutral = self.catalog.neutral(note_class);
                log::debug!("No {note_class} candidates; using neutral {}", neutral.name);
                let props = self.calculator.properties_or_default(neutral);
                partition.push(FormulaEntry::new(neutral.clone(), share, Some(props)));
                report.neutral_fallbacks.push(note_class);
                continue;
            }
            for (record, props, raw) in scored {
                partition.push(FormulaEntry::new(record.clone(), share * raw / total, Some(props)));
            }
            settle(partition, share);
        }
        draft
    }
}

/// Accord weight of a record: best family match, secondary tags discounted.
fn accord_weight(record: &IngredientRecord, accords: &WeightedAccords) -> f64 {
    record
        .families
        .iter()
        .enumerate()
        .map(|(i, family)| {
            let w = accords.weight(*family);
            if i == 0 {
                w
            } else {
                w * SECONDARY_FAMILY_FACTOR
            }
        })
        .fold(0.0, f64::max)
}

/// Push floating-point residue onto the largest entry so the sum is exact.
fn settle(partition: &mut [FormulaEntry], share: f64) {
    let sum: f64 = partition.iter().map(|e| e.concentration_pct).sum();
    let residue = share - sum;
    if residue != 0.0 {
        if let Some(largest) = partition.iter_mut().max_by(|a, b| {
            a.concentration_pct
                .partial_cmp(&b.concentration_pct)
                .unwrap_or(Ordering::Equal)
        }) {
            largest.concentration_pct += residue;
        }
    }
}

/// Scale `members` by `factor` and absorb the delta proportionally in the
/// remaining entries of the partition. Fails if the others cannot absorb it.
fn scale_within(
    partition: &mut [FormulaEntry],
    is_member: impl Fn(usize, &FormulaEntry) -> bool,
    factor: f64,
) -> Result<(), String> {
    let members: f64 = partition
        .iter()
        .enumerate()
        .filter(|(i, e)| is_member(*i, e))
        .map(|(_, e)| e.concentration_pct)
        .sum();
    let others: f64 = partition
        .iter()
        .enumerate()
        .filter(|(i, e)| !is_member(*i, e))
        .map(|(_, e)| e.concentration_pct)
        .sum();
    if others <= EPSILON_PCT {
        return Err("no other ingredient in the class to rebalance against".to_string());
    }
    let delta = members * (factor - 1.0);
    if delta >= others {
        return Err(format!(
            "adjustment of {delta:.3}% exceeds the {others:.3}% held by the rest of the class"
        ));
    }
    let others_factor = (others - delta) / others;
    let share: f64 = members + others;
    for (i, entry) in partition.iter_mut().enumerate() {
        if is_member(i, entry) {
            entry.concentration_pct *= factor;
        } else {
            entry.concentration_pct *= others_factor;
        }
    }
    settle(partition, share);
    Ok(())
}

fn focus_index(partition: &[FormulaEntry], focus: DirectiveFocus) -> Option<usize> {
    let key = |e: &FormulaEntry| {
        let props = e.properties_or_default();
        match focus {
            DirectiveFocus::Fixative => props.log_p,
            DirectiveFocus::Diffusive => props.volatility_score,
        }
    };
    partition
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, e)| {
            let k = key(e);
            match best {
                Some((_, bk)) if bk >= k => best,
                _ => Some((i, k)),
            }
        })
        .map(|(i, _)| i)
}

/// Apply one directive in place, preserving every partition sum.
///
/// Returns the reason when the directive cannot be applied; the draft is
/// left unchanged in that case.
pub fn apply_directive(
    draft: &mut DraftFormula,
    directive: &CorrectionDirective,
) -> Result<(), String> {
    let factor = 1.0 + directive.adjustment_pct / 100.0;
    if !factor.is_finite() || factor <= 0.0 {
        return Err(format!("adjustment {}% is not applicable", directive.adjustment_pct));
    }

    match directive.target {
        CorrectionTarget::NoteClass { note_class, focus } => {
            let partition = draft.partition_mut(note_class);
            let target =
                focus_index(partition, focus).ok_or_else(|| format!("{note_class} is empty"))?;
            let name = partition[target].name().to_string();
            scale_within(partition, |i, _| i == target, factor)?;
            draft.corrections_applied.push(format!(
                "{}: {:+.0}% {} ({name})",
                directive.rationale, directive.adjustment_pct, directive.target
            ));
        }
        CorrectionTarget::Family { family } => {
            let touched = family_classes(draft, family);
            if touched.is_empty() {
                return Err(format!("no {family} ingredient in the formula"));
            }
            let mut staged = draft.clone();
            for note_class in &touched {
                scale_within(
                    staged.partition_mut(*note_class),
                    |_, e| e.ingredient.has_family(family),
                    factor,
                )
                .map_err(|reason| format!("{note_class}: {reason}"))?;
            }
            staged.corrections_applied.push(format!(
                "{}: {:+.0}% {}",
                directive.rationale, directive.adjustment_pct, directive.target
            ));
            *draft = staged;
        }
    }
    Ok(())
}

fn family_classes(draft: &DraftFormula, family: ScentFamily) -> Vec<NoteClass> {
    NoteClass::ALL
        .into_iter()
        .filter(|nc| {
            draft
                .partition(*nc)
                .iter()
                .any(|e| e.ingredient.has_family(family))
        })
        .collect()
}
