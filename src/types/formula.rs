//! Formula composition types: correction directives, draft and final formulas.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ingredient::{IngredientRecord, MolecularProperties, NoteClass, ScentFamily};

/// Absolute tolerance (percentage points) for partition sums.
pub const PARTITION_TOLERANCE_PCT: f64 = 1e-6;

// ---------------------------------------------------------------------------
// Correction directives
// ---------------------------------------------------------------------------

/// Which ingredient inside a note class a class-targeted directive acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectiveFocus {
    /// The highest-LogP ingredient of the class.
    Fixative,
    /// The most volatile ingredient of the class.
    Diffusive,
}

/// What a correction directive adjusts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CorrectionTarget {
    NoteClass {
        note_class: NoteClass,
        focus: DirectiveFocus,
    },
    Family {
        family: ScentFamily,
    },
}

impl std::fmt::Display for CorrectionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CorrectionTarget::NoteClass { note_class, focus } => {
                let focus = match focus {
                    DirectiveFocus::Fixative => "fixative",
                    DirectiveFocus::Diffusive => "diffusive",
                };
                write!(f, "{note_class} {focus}")
            }
            CorrectionTarget::Family { family } => write!(f, "{family} family"),
        }
    }
}

/// A physiological correction retrieved for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionDirective {
    pub rule_id: String,
    pub target: CorrectionTarget,
    /// Signed relative adjustment, e.g. `12.0` scales the target by 1.12.
    pub adjustment_pct: f64,
    pub rationale: String,
    /// Retrieval relevance in [0, 1].
    pub relevance_score: f64,
}

// ---------------------------------------------------------------------------
// Formula entries and partitions
// ---------------------------------------------------------------------------

/// One ingredient in a formula with its share of the whole concentrate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaEntry {
    pub ingredient: IngredientRecord,
    pub concentration_pct: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<MolecularProperties>,
}

impl FormulaEntry {
    pub fn new(
        ingredient: IngredientRecord,
        concentration_pct: f64,
        properties: Option<MolecularProperties>,
    ) -> Self {
        Self {
            ingredient,
            concentration_pct,
            properties,
        }
    }

    pub fn name(&self) -> &str {
        &self.ingredient.name
    }

    /// Computed properties, or the note-class defaults when none were computed.
    pub fn properties_or_default(&self) -> MolecularProperties {
        self.properties
            .unwrap_or_else(|| MolecularProperties::catalog_default(self.ingredient.note_class))
    }
}

/// Ingredient list partitioned by note class.
///
/// Built by the assembler, adjusted in place by correction directives, and
/// frozen once handed to the compliance validator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DraftFormula {
    #[serde(default)]
    pub top: Vec<FormulaEntry>,
    #[serde(default, alias = "heart")]
    pub middle: Vec<FormulaEntry>,
    #[serde(default)]
    pub base: Vec<FormulaEntry>,
    /// Human-readable corrections applied, in application order.
    #[serde(default)]
    pub corrections_applied: Vec<String>,
}

impl DraftFormula {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn partition(&self, note_class: NoteClass) -> &[FormulaEntry] {
        match note_class {
            NoteClass::Top => &self.top,
            NoteClass::Middle => &self.middle,
            NoteClass::Base => &self.base,
        }
    }

    pub fn partition_mut(&mut self, note_class: NoteClass) -> &mut Vec<FormulaEntry> {
        match note_class {
            NoteClass::Top => &mut self.top,
            NoteClass::Middle => &mut self.middle,
            NoteClass::Base => &mut self.base,
        }
    }

    pub fn partition_sum(&self, note_class: NoteClass) -> f64 {
        self.partition(note_class)
            .iter()
            .map(|e| e.concentration_pct)
            .sum()
    }

    /// True if every partition sums to its target share within tolerance.
    pub fn partitions_balanced(&self) -> bool {
        NoteClass::ALL.iter().all(|nc| {
            (self.partition_sum(*nc) - nc.target_share_pct()).abs() <= PARTITION_TOLERANCE_PCT
        })
    }

    /// All entries, top to base, with their note class.
    pub fn entries(&self) -> impl Iterator<Item = (NoteClass, &FormulaEntry)> {
        NoteClass::ALL
            .into_iter()
            .flat_map(move |nc| self.partition(nc).iter().map(move |e| (nc, e)))
    }

    pub fn ingredient_count(&self) -> usize {
        self.top.len() + self.middle.len() + self.base.len()
    }

    pub fn total_pct(&self) -> f64 {
        NoteClass::ALL.iter().map(|nc| self.partition_sum(*nc)).sum()
    }

    pub fn find(&self, name: &str) -> Option<&FormulaEntry> {
        self.entries().map(|(_, e)| e).find(|e| e.name() == name)
    }
}

// ---------------------------------------------------------------------------
// Final formula
// ---------------------------------------------------------------------------

/// Percentage of the formula in each note class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NotePyramid {
    pub top: f64,
    pub middle: f64,
    pub base: f64,
}

impl NotePyramid {
    pub fn of(draft: &DraftFormula) -> Self {
        let total = draft.total_pct();
        let pct = |nc: NoteClass| {
            if total > 0.0 {
                draft.partition_sum(nc) / total * 100.0
            } else {
                0.0
            }
        };
        Self {
            top: pct(NoteClass::Top),
            middle: pct(NoteClass::Middle),
            base: pct(NoteClass::Base),
        }
    }
}

/// Quality metrics, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FormulaMetrics {
    pub longevity: f64,
    pub projection: f64,
    pub uniqueness: f64,
    pub sustainability: f64,
    pub compliance_score: f64,
}

/// A formula that has passed through the compliance validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Formula {
    pub formula_id: String,
    /// SHA-256 over ingredient names and rounded concentrations.
    pub fingerprint: String,
    pub name: String,
    pub description: String,
    #[serde(flatten)]
    pub composition: DraftFormula,
    pub note_pyramid: NotePyramid,
    pub metrics: FormulaMetrics,
    pub generated_at: DateTime<Utc>,
}

impl Formula {
    pub fn partition(&self, note_class: NoteClass) -> &[FormulaEntry] {
        self.composition.partition(note_class)
    }

    pub fn entries(&self) -> impl Iterator<Item = (NoteClass, &FormulaEntry)> {
        self.composition.entries()
    }

    pub fn ingredient_count(&self) -> usize {
        self.composition.ingredient_count()
    }
}
