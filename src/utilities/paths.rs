//! Data file resolution.
//!
//! Reference data (catalog, rule corpus, compliance table) ships compiled
//! into the binary. A configured data directory overrides individual files:
//! a file present there wins, a missing one falls back to the built-in copy.

use std::borrow::Cow;
use std::path::Path;

use crate::utilities::errors::FormulationError;

/// Catalog file name inside a data directory.
pub const CATALOG_FILE: &str = "catalog.yaml";
/// Rule corpus file name inside a data directory.
pub const RULES_FILE: &str = "physio_rules.yaml";
/// Compliance table file name inside a data directory.
pub const COMPLIANCE_FILE: &str = "compliance.yaml";

pub(crate) const BUILTIN_CATALOG: &str = include_str!("../../data/catalog.yaml");
pub(crate) const BUILTIN_RULES: &str = include_str!("../../data/physio_rules.yaml");
pub(crate) const BUILTIN_COMPLIANCE: &str = include_str!("../../data/compliance.yaml");

/// Text of one data file together with where it came from.
#[derive(Debug, Clone)]
pub struct DataFile {
    /// `builtin:<name>` or the filesystem path.
    pub origin: String,
    pub text: Cow<'static, str>,
}

impl DataFile {
    pub fn builtin(file_name: &str, text: &'static str) -> Self {
        Self {
            origin: format!("builtin:{file_name}"),
            text: Cow::Borrowed(text),
        }
    }

    pub fn read(path: &Path) -> Result<Self, FormulationError> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self {
            origin: path.display().to_string(),
            text: Cow::Owned(text),
        })
    }
}

/// Resolve `file_name` against `data_dir`, falling back to `builtin`.
pub fn resolve_data_file(
    data_dir: Option<&Path>,
    file_name: &str,
    builtin: &'static str,
) -> Result<DataFile, FormulationError> {
    match data_dir.map(|dir| dir.join(file_name)) {
        Some(path) if path.is_file() => {
            log::info!("Loading {}", path.display());
            DataFile::read(&path)
        }
        Some(path) => {
            log::debug!("{} not found; using built-in {file_name}", path.display());
            Ok(DataFile::builtin(file_name, builtin))
        }
        None => Ok(DataFile::builtin(file_name, builtin)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_when_no_dir() {
        let file = resolve_data_file(None, CATALOG_FILE, BUILTIN_CATALOG).unwrap();
        assert_eq!(file.origin, "builtin:catalog.yaml");
        assert!(file.text.contains("ingredients:"));
    }

    #[test]
    fn test_dir_overrides_and_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(RULES_FILE), "rules: []\n").unwrap();

        let rules = resolve_data_file(Some(dir.path()), RULES_FILE, BUILTIN_RULES).unwrap();
        assert_eq!(rules.text, "rules: []\n");
        assert!(rules.origin.ends_with(RULES_FILE));

        let compliance =
            resolve_data_file(Some(dir.path()), COMPLIANCE_FILE, BUILTIN_COMPLIANCE).unwrap();
        assert!(compliance.origin.starts_with("builtin:"));
    }
}
