//! Ingredient catalog.
//!
//! Static reference data loaded once at startup and shared read-only by
//! every request. Startup validation guarantees a non-empty catalog with
//! unique names and one neutral fallback ingredient per note class.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;

use crate::molecular::MolecularPropertyCalculator;
use crate::types::{IngredientRecord, NoteClass};
use crate::utilities::errors::FormulationError;
use crate::utilities::paths::{resolve_data_file, BUILTIN_CATALOG, CATALOG_FILE};
use crate::utilities::string_utils::normalize_key;

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    ingredients: Vec<IngredientRecord>,
}

/// Read-only ingredient catalog.
#[derive(Debug, Clone)]
pub struct IngredientCatalog {
    records: Vec<IngredientRecord>,
    /// Normalized name -> index into `records`.
    index: HashMap<String, usize>,
    neutrals: BTreeMap<NoteClass, usize>,
}

impl IngredientCatalog {
    /// The catalog compiled into the crate.
    pub fn builtin() -> Result<Self, FormulationError> {
        Self::from_yaml_str(BUILTIN_CATALOG, "builtin:catalog.yaml")
    }

    /// Load `catalog.yaml` from `data_dir`, or the built-in copy.
    pub fn load(data_dir: Option<&Path>) -> Result<Self, FormulationError> {
        let file = resolve_data_file(data_dir, CATALOG_FILE, BUILTIN_CATALOG)?;
        Self::from_yaml_str(&file.text, &file.origin)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, FormulationError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text, &path.display().to_string())
    }

    /// Parse and validate catalog YAML. `origin` is used in error messages.
    pub fn from_yaml_str(yaml: &str, origin: &str) -> Result<Self, FormulationError> {
        let file: CatalogFile = serde_yaml::from_str(yaml)?;
        Self::from_records(file.ingredients, origin)
    }

    pub fn from_records(
        records: Vec<IngredientRecord>,
        origin: &str,
    ) -> Result<Self, FormulationError> {
        if records.is_empty() {
            return Err(FormulationError::CatalogEmpty);
        }

        let invalid = |reason: String| FormulationError::DataLoad {
            path: origin.to_string(),
            reason,
        };

        let mut index = HashMap::with_capacity(records.len());
        let mut neutrals = BTreeMap::new();
        for (i, record) in records.iter().enumerate() {
            let key = normalize_key(&record.name);
            if key.is_empty() {
                return Err(invalid(format!("ingredient #{i} has no name")));
            }
            if record.families.is_empty() {
                return Err(invalid(format!("{} has no scent family", record.name)));
            }
            if !(record.base_concentration_pct > 0.0 && record.base_concentration_pct <= 100.0) {
                return Err(invalid(format!(
                    "{}: base_concentration_pct {} is outside (0, 100]",
                    record.name, record.base_concentration_pct
                )));
            }
            if record.max_concentration_pct < record.base_concentration_pct
                || record.max_concentration_pct > 100.0
            {
                return Err(invalid(format!(
                    "{}: max_concentration_pct {} must lie in [base, 100]",
                    record.name, record.max_concentration_pct
                )));
            }
            if index.insert(key, i).is_some() {
                return Err(invalid(format!("duplicate ingredient {}", record.name)));
            }
            if record.neutral {
                if let Some(&first) = neutrals.get(&record.note_class) {
                    let first: &IngredientRecord = &records[first];
                    log::warn!(
                        "{origin}: {} is a second neutral {} ingredient; keeping {}",
                        record.name,
                        record.note_class,
                        first.name
                    );
                } else {
                    neutrals.insert(record.note_class, i);
                }
            }
        }

        if let Some(missing) = NoteClass::ALL
            .into_iter()
            .find(|nc| !neutrals.contains_key(nc))
        {
            return Err(FormulationError::MissingNeutral(missing));
        }

        log::debug!("Loaded {} ingredients from {origin}", records.len());
        Ok(Self {
            records,
            index,
            neutrals,
        })
    }

    /// All records in declaration order.
    pub fn list(&self) -> &[IngredientRecord] {
        &self.records
    }

    /// Case- and whitespace-insensitive lookup by name.
    pub fn lookup(&self, name: &str) -> Option<&IngredientRecord> {
        self.index
            .get(&normalize_key(name))
            .map(|&i| &self.records[i])
    }

    /// The designated fallback for `note_class`.
    pub fn neutral(&self, note_class: NoteClass) -> &IngredientRecord {
        // Every class has an entry after `from_records` validation.
        &self.records[self.neutrals[&note_class]]
    }

    pub fn in_class(&self, note_class: NoteClass) -> impl Iterator<Item = &IngredientRecord> {
        self.records
            .iter()
            .filter(move |r| r.note_class == note_class)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Log records whose declared note class disagrees with their computed
    /// volatility. Returns the number of disagreements.
    pub fn audit_note_classes(&self, calculator: &MolecularPropertyCalculator) -> usize {
        let mut mismatches = 0;
        for record in &self.records {
            let Ok(props) = calculator.properties_for(record) else {
                log::warn!(
                    "{}: descriptor '{}' cannot be parsed; it will be excluded from formulas",
                    record.name,
                    record.structural_descriptor
                );
                continue;
            };
            let suggested = props.suggested_note_class();
            if suggested != record.note_class {
                mismatches += 1;
                log::debug!(
                    "{} is declared {} but its volatility {:.2} suggests {}",
                    record.name,
                    record.note_class,
                    props.volatility_score,
                    suggested
                );
            }
        }
        mismatches
    }
}
