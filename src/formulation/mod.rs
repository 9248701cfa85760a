//! Formula assembly, compliance validation, metrics and the orchestrating
//! engine.

pub mod assembler;
pub mod compliance;
pub mod engine;
pub mod metrics;

pub use assembler::{apply_directive, AssemblyReport, FormulaAssembler};
pub use compliance::{ComplianceTable, ComplianceValidator, ALLERGEN_AGGREGATE, ALLERGEN_TOTAL};
pub use engine::{fingerprint, formula_name, FormulationEngine, FormulationOutput, PipelineDiagnostics};
pub use metrics::compute_metrics;
