//! Ingredient reference data and per-ingredient molecular descriptors.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Volatility tier of an ingredient within a formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteClass {
    Top,
    #[serde(alias = "heart")]
    Middle,
    Base,
}

impl NoteClass {
    /// All note classes, top to base.
    pub const ALL: [NoteClass; 3] = [NoteClass::Top, NoteClass::Middle, NoteClass::Base];

    /// Share of the whole formula (percent) this class must sum to.
    pub fn target_share_pct(&self) -> f64 {
        match self {
            NoteClass::Top => 20.0,
            NoteClass::Middle => 35.0,
            NoteClass::Base => 45.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NoteClass::Top => "top",
            NoteClass::Middle => "middle",
            NoteClass::Base => "base",
        }
    }
}

impl fmt::Display for NoteClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scent family tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScentFamily {
    Citrus,
    Floral,
    Fruity,
    Woody,
    Musk,
    Amber,
    Spicy,
    Green,
    Aromatic,
    Resinous,
    Smoky,
    Leather,
    Aldehydic,
}

impl ScentFamily {
    pub const ALL: [ScentFamily; 13] = [
        ScentFamily::Citrus,
        ScentFamily::Floral,
        ScentFamily::Fruity,
        ScentFamily::Woody,
        ScentFamily::Musk,
        ScentFamily::Amber,
        ScentFamily::Spicy,
        ScentFamily::Green,
        ScentFamily::Aromatic,
        ScentFamily::Resinous,
        ScentFamily::Smoky,
        ScentFamily::Leather,
        ScentFamily::Aldehydic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScentFamily::Citrus => "citrus",
            ScentFamily::Floral => "floral",
            ScentFamily::Fruity => "fruity",
            ScentFamily::Woody => "woody",
            ScentFamily::Musk => "musk",
            ScentFamily::Amber => "amber",
            ScentFamily::Spicy => "spicy",
            ScentFamily::Green => "green",
            ScentFamily::Aromatic => "aromatic",
            ScentFamily::Resinous => "resinous",
            ScentFamily::Smoky => "smoky",
            ScentFamily::Leather => "leather",
            ScentFamily::Aldehydic => "aldehydic",
        }
    }
}

impl fmt::Display for ScentFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Origin of a raw material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum IngredientSource {
    Natural,
    BioBased,
    Upcycled,
    #[default]
    Synthetic,
}

/// A catalog entry. Read-only outside the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientRecord {
    /// Unique key.
    pub name: String,
    /// Family tags; the first one is the primary family.
    pub families: Vec<ScentFamily>,
    pub note_class: NoteClass,
    /// Default share used when proportioning a formula.
    pub base_concentration_pct: f64,
    /// Catalog maximum; compliance redistribution never pushes past it.
    #[serde(default = "default_max_concentration")]
    pub max_concentration_pct: f64,
    /// SMILES-style structural descriptor.
    #[serde(rename = "descriptor")]
    pub structural_descriptor: String,
    pub sustainable: bool,
    #[serde(default)]
    pub source: IngredientSource,
    /// Counted towards the aggregate allergen limit.
    #[serde(default)]
    pub allergen: bool,
    /// Regulatory category for ceiling lookup; uncategorised entries are unrestricted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance_category: Option<String>,
    /// Designated fallback for its note class.
    #[serde(default)]
    pub neutral: bool,
}

fn default_max_concentration() -> f64 {
    100.0
}

impl IngredientRecord {
    pub fn primary_family(&self) -> Option<ScentFamily> {
        self.families.first().copied()
    }

    pub fn has_family(&self, family: ScentFamily) -> bool {
        self.families.contains(&family)
    }
}

/// Quantitative descriptors derived from a structural descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MolecularProperties {
    /// Octanol-water partition coefficient; higher persists longer on skin.
    pub log_p: f64,
    pub molecular_weight_da: f64,
    /// In [0, 1]; higher evaporates faster.
    pub volatility_score: f64,
}

impl MolecularProperties {
    /// Volatility at or above which a material behaves as a top note.
    pub const TOP_VOLATILITY: f64 = 0.6;
    /// Volatility below which a material behaves as a base note.
    pub const BASE_VOLATILITY: f64 = 0.3;

    /// Note class implied by volatility alone.
    pub fn suggested_note_class(&self) -> NoteClass {
        if self.volatility_score >= Self::TOP_VOLATILITY {
            NoteClass::Top
        } else if self.volatility_score < Self::BASE_VOLATILITY {
            NoteClass::Base
        } else {
            NoteClass::Middle
        }
    }

    /// Typical values used when an ingredient's descriptor cannot be computed.
    pub fn catalog_default(note_class: NoteClass) -> Self {
        match note_class {
            NoteClass::Top => Self {
                log_p: 2.5,
                molecular_weight_da: 140.0,
                volatility_score: 0.75,
            },
            NoteClass::Middle => Self {
                log_p: 3.0,
                molecular_weight_da: 180.0,
                volatility_score: 0.45,
            },
            NoteClass::Base => Self {
                log_p: 4.5,
                molecular_weight_da: 240.0,
                volatility_score: 0.15,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_shares_sum_to_hundred() {
        let total: f64 = NoteClass::ALL.iter().map(|c| c.target_share_pct()).sum();
        assert!((total - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_heart_alias() {
        let nc: NoteClass = serde_json::from_str("\"heart\"").unwrap();
        assert_eq!(nc, NoteClass::Middle);
        assert_eq!(serde_json::to_string(&nc).unwrap(), "\"middle\"");
    }

    #[test]
    fn test_catalog_defaults_agree_with_suggestion() {
        for nc in NoteClass::ALL {
            assert_eq!(MolecularProperties::catalog_default(nc).suggested_note_class(), nc);
        }
    }

    #[test]
    fn test_record_deserializes_with_defaults() {
        let yaml = r#"
name: Hedione
families: [floral]
note_class: middle
base_concentration_pct: 10.0
descriptor: "CCCCCC1CCC(=O)C1CC(=O)OC"
sustainable: false
"#;
        let record: IngredientRecord = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(record.primary_family(), Some(ScentFamily::Floral));
        assert_eq!(record.max_concentration_pct, 100.0);
        assert_eq!(record.source, IngredientSource::Synthetic);
        assert!(!record.neutral);
        assert!(record.compliance_category.is_none());
    }
}
