//! Runtime settings.
//!
//! Every field has a serde default, so an empty YAML document and an empty
//! environment both produce a working configuration. Environment variables
//! override file values; unparseable values are logged and ignored.
//!
//! | Env var | Field |
//! |---|---|
//! | `AETHER_DATA_DIR` | `data_dir` |
//! | `AETHER_RETRIEVAL_MODE` | `retrieval.mode` |
//! | `AETHER_TOP_K` | `retrieval.top_k` |
//! | `AETHER_MIN_RELEVANCE` | `retrieval.min_relevance` |
//! | `AETHER_EMBEDDING_TIMEOUT_MS` | `retrieval.embedding_timeout_ms` |
//! | `AETHER_EMBEDDING_PROVIDER` | `embedding.provider` |
//! | `AETHER_EMBEDDING_MODEL` | `embedding.model` |
//! | `OPENAI_API_KEY` | `embedding.api_key` |
//! | `OPENAI_BASE_URL` | `embedding.base_url` |
//! | `AETHER_COMPLIANCE_MAX_PASSES` | `compliance.max_passes` |
//! | `AETHER_PRODUCT_CONCENTRATION_PCT` | `compliance.product_concentration_pct` |
//! | `AETHER_MAX_INGREDIENTS_PER_CLASS` | `formulation.max_ingredients_per_class` |
//! | `PORT` | `port` |

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::utilities::errors::FormulationError;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which retriever the engine is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    /// Embedding similarity, falling back to keywords on provider failure.
    #[default]
    Semantic,
    /// Keyword overlap only.
    Keyword,
}

impl FromStr for RetrievalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "semantic" => Ok(RetrievalMode::Semantic),
            "keyword" => Ok(RetrievalMode::Keyword),
            other => Err(format!("unknown retrieval mode '{other}'")),
        }
    }
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetrievalMode::Semantic => write!(f, "semantic"),
            RetrievalMode::Keyword => write!(f, "keyword"),
        }
    }
}

/// Embedding backend used in semantic mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// Local feature-hashing embedder; no network.
    #[default]
    Hashing,
    /// OpenAI-compatible `/embeddings` endpoint.
    #[serde(alias = "open_ai")]
    OpenAi,
}

impl FromStr for EmbeddingProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hashing" => Ok(EmbeddingProviderKind::Hashing),
            "openai" | "open_ai" => Ok(EmbeddingProviderKind::OpenAi),
            other => Err(format!("unknown embedding provider '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Physio-RAG retrieval tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalSettings {
    #[serde(default)]
    pub mode: RetrievalMode,
    /// Maximum number of directives returned.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Rules scoring below this are dropped.
    #[serde(default)]
    pub min_relevance: f64,
    /// Bound on one embedding round trip before falling back to keywords.
    #[serde(default = "default_embedding_timeout_ms")]
    pub embedding_timeout_ms: u64,
}

fn default_top_k() -> usize {
    3
}

fn default_embedding_timeout_ms() -> u64 {
    2000
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            mode: RetrievalMode::default(),
            top_k: default_top_k(),
            min_relevance: 0.0,
            embedding_timeout_ms: default_embedding_timeout_ms(),
        }
    }
}

/// Embedding provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default)]
    pub provider: EmbeddingProviderKind,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Vector length of the hashing embedder.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_dimensions() -> usize {
    256
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::default(),
            model: default_embedding_model(),
            api_key: None,
            base_url: default_base_url(),
            dimensions: default_dimensions(),
        }
    }
}

/// Compliance validator tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceSettings {
    /// Redistribution passes before residual excess is removed.
    #[serde(default = "default_max_passes")]
    pub max_passes: usize,
    /// Concentrate share of the finished product, used for the allergen aggregate.
    #[serde(default = "default_product_concentration")]
    pub product_concentration_pct: f64,
}

fn default_max_passes() -> usize {
    3
}

fn default_product_concentration() -> f64 {
    15.0
}

impl Default for ComplianceSettings {
    fn default() -> Self {
        Self {
            max_passes: default_max_passes(),
            product_concentration_pct: default_product_concentration(),
        }
    }
}

/// Formula assembler tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulationSettings {
    #[serde(default = "default_max_ingredients")]
    pub max_ingredients_per_class: usize,
}

fn default_max_ingredients() -> usize {
    4
}

impl Default for FormulationSettings {
    fn default() -> Self {
        Self {
            max_ingredients_per_class: default_max_ingredients(),
        }
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Top-level settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Directory holding `catalog.yaml`, `physio_rules.yaml` and
    /// `compliance.yaml`. Missing files fall back to the built-in copies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub retrieval: RetrievalSettings,
    #[serde(default)]
    pub embedding: EmbeddingSettings,
    #[serde(default)]
    pub compliance: ComplianceSettings,
    #[serde(default)]
    pub formulation: FormulationSettings,
}

fn default_port() -> u16 {
    8080
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: None,
            port: default_port(),
            retrieval: RetrievalSettings::default(),
            embedding: EmbeddingSettings::default(),
            compliance: ComplianceSettings::default(),
            formulation: FormulationSettings::default(),
        }
    }
}

impl Settings {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Self {
        Self::default().apply_env(|key| std::env::var(key).ok())
    }

    /// Load a YAML settings file, then apply environment overrides.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, FormulationError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let settings: Settings = if text.trim().is_empty() {
            Settings::default()
        } else {
            serde_yaml::from_str(&text)?
        };
        Ok(settings.apply_env(|key| std::env::var(key).ok()))
    }

    /// Apply overrides from `lookup` (normally the process environment).
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup("AETHER_DATA_DIR").filter(|d| !d.trim().is_empty()) {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(mode) = parse_var(&lookup, "AETHER_RETRIEVAL_MODE") {
            self.retrieval.mode = mode;
        }
        if let Some(top_k) = parse_var(&lookup, "AETHER_TOP_K") {
            self.retrieval.top_k = top_k;
        }
        if let Some(min) = parse_var(&lookup, "AETHER_MIN_RELEVANCE") {
            self.retrieval.min_relevance = min;
        }
        if let Some(ms) = parse_var(&lookup, "AETHER_EMBEDDING_TIMEOUT_MS") {
            self.retrieval.embedding_timeout_ms = ms;
        }
        if let Some(provider) = parse_var(&lookup, "AETHER_EMBEDDING_PROVIDER") {
            self.embedding.provider = provider;
        }
        if let Some(model) = lookup("AETHER_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|k| !k.is_empty()) {
            self.embedding.api_key = Some(key);
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            self.embedding.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(passes) = parse_var(&lookup, "AETHER_COMPLIANCE_MAX_PASSES") {
            self.compliance.max_passes = passes;
        }
        if let Some(pct) = parse_var(&lookup, "AETHER_PRODUCT_CONCENTRATION_PCT") {
            self.compliance.product_concentration_pct = pct;
        }
        if let Some(max) = parse_var(&lookup, "AETHER_MAX_INGREDIENTS_PER_CLASS") {
            self.formulation.max_ingredients_per_class = max;
        }
        if let Some(port) = parse_var(&lookup, "PORT") {
            self.port = port;
        }
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn with_retrieval_mode(mut self, mode: RetrievalMode) -> Self {
        self.retrieval.mode = mode;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.retrieval.top_k = top_k;
        self
    }

    pub fn with_embedding_timeout_ms(mut self, ms: u64) -> Self {
        self.retrieval.embedding_timeout_ms = ms;
        self
    }

    pub fn with_max_passes(mut self, passes: usize) -> Self {
        self.compliance.max_passes = passes;
        self
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(err) => {
            log::warn!("Ignoring {key}={raw:?}: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.retrieval.mode, RetrievalMode::Semantic);
        assert_eq!(settings.retrieval.top_k, 3);
        assert_eq!(settings.retrieval.min_relevance, 0.0);
        assert_eq!(settings.compliance.max_passes, 3);
        assert_eq!(settings.embedding.provider, EmbeddingProviderKind::Hashing);
        assert!(settings.data_dir.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let settings = Settings::default().apply_env(env(&[
            ("AETHER_RETRIEVAL_MODE", "Keyword"),
            ("AETHER_TOP_K", "5"),
            ("AETHER_EMBEDDING_PROVIDER", "openai"),
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_BASE_URL", "http://localhost:9999/v1/"),
            ("PORT", "9000"),
        ]));
        assert_eq!(settings.retrieval.mode, RetrievalMode::Keyword);
        assert_eq!(settings.retrieval.top_k, 5);
        assert_eq!(settings.embedding.provider, EmbeddingProviderKind::OpenAi);
        assert_eq!(settings.embedding.api_key.as_deref(), Some("sk-test"));
        assert_eq!(settings.embedding.base_url, "http://localhost:9999/v1");
        assert_eq!(settings.port, 9000);
    }

    #[test]
    fn test_unparseable_env_is_ignored() {
        let settings = Settings::default().apply_env(env(&[
            ("AETHER_TOP_K", "many"),
            ("AETHER_RETRIEVAL_MODE", "telepathy"),
        ]));
        assert_eq!(settings.retrieval.top_k, 3);
        assert_eq!(settings.retrieval.mode, RetrievalMode::Semantic);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "retrieval:\n  top_k: 4\ncompliance:\n  max_passes: 5\n";
        let settings: Settings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(settings.retrieval.top_k, 4);
        assert_eq!(settings.retrieval.embedding_timeout_ms, 2000);
        assert_eq!(settings.compliance.max_passes, 5);
        assert_eq!(settings.compliance.product_concentration_pct, 15.0);
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port: 7070\nformulation:\n  max_ingredients_per_class: 2").unwrap();
        let settings = Settings::from_yaml_file(file.path()).unwrap();
        assert_eq!(settings.formulation.max_ingredients_per_class, 2);
    }

    #[test]
    fn test_api_key_never_serialized() {
        let mut settings = Settings::default();
        settings.embedding.api_key = Some("sk-secret".into());
        let json = serde_json::to_string(&settings).unwrap();
        assert!(!json.contains("sk-secret"));
    }
}
