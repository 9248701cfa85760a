//! Quality metrics of a validated formula. Every metric lies in [0, 1].

use std::collections::BTreeSet;

use crate::catalog::IngredientCatalog;
use crate::types::{
    ComplianceResult, DraftFormula, FormulaEntry, FormulaMetrics, NoteClass, ScentFamily,
};

/// LogP at which longevity saturates.
const LONGEVITY_LOG_P: f64 = 6.0;

fn mass_weighted<'a>(
    entries: impl Iterator<Item = &'a FormulaEntry>,
    value: impl Fn(&FormulaEntry) -> f64,
) -> Option<f64> {
    let (mut weighted, mut mass) = (0.0, 0.0);
    for entry in entries {
        weighted += entry.concentration_pct * value(entry);
        mass += entry.concentration_pct;
    }
    (mass > 0.0).then(|| weighted / mass)
}

/// Compute longevity, projection, uniqueness, sustainability and the
/// compliance score for `formula`.
pub fn compute_metrics(
    formula: &DraftFormula,
    compliance: &ComplianceResult,
    catalog: &IngredientCatalog,
) -> FormulaMetrics {
    let all = || formula.entries().map(|(_, e)| e);

    let longevity = mass_weighted(all(), |e| e.properties_or_default().log_p)
        .map_or(0.0, |log_p| log_p / LONGEVITY_LOG_P);

    let volatility = |nc: NoteClass| {
        mass_weighted(formula.partition(nc).iter(), |e| {
            e.properties_or_default().volatility_score
        })
        .unwrap_or(0.0)
    };
    let projection = volatility(NoteClass::Top) - volatility(NoteClass::Base);

    let families: BTreeSet<ScentFamily> = all()
        .flat_map(|e| e.ingredient.families.iter().copied())
        .collect();
    let diversity = families.len() as f64 / ScentFamily::ALL.len() as f64;
    let catalog_size = catalog.len().max(1) as f64;
    let rarity = mass_weighted(all(), |e| {
        e.ingredient.primary_family().map_or(0.0, |family| {
            let carriers = catalog.list().iter().filter(|r| r.has_family(family)).count();
            1.0 - carriers as f64 / catalog_size
        })
    })
    .unwrap_or(0.0);
    let uniqueness = 0.5 * diversity + 0.5 * rarity;

    let sustainability = mass_weighted(all(), |e| {
        if e.ingredient.sustainable {
            1.0
        } else {
            0.0
        }
    })
    .unwrap_or(0.0);

    let count = formula.ingredient_count();
    let compliance_score = if count == 0 {
        if compliance.violations.is_empty() {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - compliance.violations.len() as f64 / count as f64
    };

    FormulaMetrics {
        longevity: longevity.clamp(0.0, 1.0),
        projection: projection.clamp(0.0, 1.0),
        uniqueness: uniqueness.clamp(0.0, 1.0),
        sustainability: sustainability.clamp(0.0, 1.0),
        compliance_score: compliance_score.clamp(0.0, 1.0),
    }
}
