//! Shared data types for the formulation pipeline.

pub mod compliance;
pub mod formula;
pub mod ingredient;
pub mod profile;

pub use compliance::{ComplianceResult, Violation};
pub use formula::{
    CorrectionDirective, CorrectionTarget, DirectiveFocus, DraftFormula, Formula, FormulaEntry,
    FormulaMetrics, NotePyramid, PARTITION_TOLERANCE_PCT,
};
pub use ingredient::{IngredientRecord, IngredientSource, MolecularProperties, NoteClass, ScentFamily};
pub use profile::{BiochemicalProfile, EmotionalTarget, PhBand, SkinType, TemperatureBand};
