//! Error types for the formulation pipeline.

use thiserror::Error;

use crate::types::NoteClass;

/// A structural descriptor that could not be turned into molecular properties.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot compute properties for descriptor '{descriptor}': {reason}")]
pub struct PropertyComputationError {
    /// The offending descriptor.
    pub descriptor: String,
    pub reason: String,
}

impl PropertyComputationError {
    pub fn new(descriptor: &str, reason: impl Into<String>) -> Self {
        Self {
            descriptor: descriptor.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors from an embedding provider.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The provider is not configured (e.g. missing API key).
    #[error("Embedding provider not configured: {0}")]
    NotConfigured(String),

    /// Transport-level failure.
    #[error("Embedding request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with something unusable.
    #[error("Invalid embedding response: {0}")]
    InvalidResponse(String),
}

/// Errors that make semantic retrieval fall back to keyword mode.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The embedding provider did not answer within the configured bound.
    #[error("Embedding provider timed out after {0} ms")]
    Timeout(u64),

    /// The embedding provider failed.
    #[error("Embedding provider unavailable: {0}")]
    Unavailable(#[from] EmbeddingError),
}

/// Top-level pipeline errors.
#[derive(Debug, Error)]
pub enum FormulationError {
    /// A profile or target value outside its physical bounds. Logged; the value is clamped.
    #[error("{field} = {value} is outside [{min}, {max}]")]
    InvalidInputRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Malformed ingredient descriptor.
    #[error(transparent)]
    PropertyComputation(#[from] PropertyComputationError),

    /// Semantic retrieval could not run.
    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// The ingredient catalog has no entries.
    #[error("Ingredient catalog is empty")]
    CatalogEmpty,

    /// The configured rule corpus has no rules.
    #[error("Physiological rule corpus is empty")]
    CorpusEmpty,

    /// No neutral fallback ingredient is designated for a note class.
    #[error("Ingredient catalog has no neutral {0} ingredient")]
    MissingNeutral(NoteClass),

    /// A data file is structurally valid YAML but semantically wrong.
    #[error("Invalid data in {path}: {reason}")]
    DataLoad { path: String, reason: String },

    /// YAML parsing failed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RetrievalError> for FormulationError {
    fn from(err: RetrievalError) -> Self {
        FormulationError::RetrievalUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = FormulationError::InvalidInputRange {
            field: "ph",
            value: 9.5,
            min: 3.0,
            max: 9.0,
        };
        assert_eq!(err.to_string(), "ph = 9.5 is outside [3, 9]");

        let err: FormulationError = PropertyComputationError::new("C(C", "unclosed branch").into();
        assert!(err.to_string().contains("'C(C'"));

        let err: FormulationError = RetrievalError::Timeout(250).into();
        assert_eq!(
            err.to_string(),
            "Retrieval unavailable: Embedding provider timed out after 250 ms"
        );

        assert_eq!(
            FormulationError::MissingNeutral(NoteClass::Base).to_string(),
            "Ingredient catalog has no neutral base ingredient"
        );
    }
}
