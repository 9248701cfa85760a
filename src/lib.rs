//! # Aether
//!
//! Personalized fragrance formulation. A biochemical profile (skin pH, skin
//! type, temperature) and an emotional target (valence/arousal, optionally
//! derived from a free-text brief) are turned into a validated formula:
//!
//! 1. the emotion mapper weights scent families from the valence/arousal point,
//! 2. Physio-RAG retrieves physiological correction rules for the profile,
//! 3. the assembler selects and proportions catalog ingredients and applies
//!    the corrections,
//! 4. the compliance validator enforces category ceilings,
//! 5. the engine computes quality metrics and formula identity.
//!
//! Reference data (ingredient catalog, rule corpus, compliance table) is
//! loaded once and shared read-only between requests.

pub mod catalog;
pub mod config;
pub mod emotion;
pub mod formulation;
pub mod molecular;
pub mod rag;
pub mod server;
pub mod types;
pub mod utilities;

pub use catalog::IngredientCatalog;
pub use config::{RetrievalMode, Settings};
pub use emotion::{EmotionMapper, WeightedAccords};
pub use formulation::{ComplianceValidator, FormulaAssembler, FormulationEngine};
pub use molecular::MolecularPropertyCalculator;
pub use rag::{RuleCorpus, RuleRetriever};
pub use types::{
    BiochemicalProfile, ComplianceResult, DraftFormula, EmotionalTarget, Formula, SkinType,
};
pub use utilities::errors::FormulationError;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
