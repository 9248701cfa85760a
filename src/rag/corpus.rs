//! Physiological rule corpus.
//!
//! Rules are data: a description for retrieval, an applicability predicate
//! over the profile, and the adjustment to apply. Both retrieval modes read
//! the same records.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::{BiochemicalProfile, CorrectionDirective, CorrectionTarget, SkinType};
use crate::utilities::errors::FormulationError;
use crate::utilities::paths::{resolve_data_file, BUILTIN_RULES, RULES_FILE};

/// Conditions on the profile. Omitted fields always match; bounds are strict.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RulePredicate {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skin_types: Vec<SkinType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ph_below: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ph_above: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature_below: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature_above: Option<f64>,
}

impl RulePredicate {
    pub fn matches(&self, profile: &BiochemicalProfile) -> bool {
        (self.skin_types.is_empty() || self.skin_types.contains(&profile.skin_type()))
            && self.ph_below.map_or(true, |limit| profile.ph() < limit)
            && self.ph_above.map_or(true, |limit| profile.ph() > limit)
            && self
                .temperature_below
                .map_or(true, |limit| profile.temperature_c() < limit)
            && self
                .temperature_above
                .map_or(true, |limit| profile.temperature_c() > limit)
    }
}

/// One curated correction rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysioRule {
    pub id: String,
    /// Declared tie-break: among equally relevant rules the lower order wins.
    #[serde(default)]
    pub order: u32,
    pub description: String,
    #[serde(default)]
    pub when: RulePredicate,
    pub target: CorrectionTarget,
    pub adjustment_pct: f64,
    pub rationale: String,
}

impl PhysioRule {
    /// Text matched against the profile by both retrieval modes.
    pub fn text(&self) -> String {
        format!("{} {}", self.description.trim(), self.rationale.trim())
    }

    pub fn applies_to(&self, profile: &BiochemicalProfile) -> bool {
        self.when.matches(profile)
    }

    pub fn directive(&self, relevance_score: f64) -> CorrectionDirective {
        CorrectionDirective {
            rule_id: self.id.clone(),
            target: self.target,
            adjustment_pct: self.adjustment_pct,
            rationale: self.rationale.clone(),
            relevance_score,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RulesFile {
    #[serde(default)]
    rules: Vec<PhysioRule>,
}

/// Read-only rule set, kept in declared (order, id) sequence.
#[derive(Debug, Clone, Default)]
pub struct RuleCorpus {
    rules: Vec<PhysioRule>,
}

impl RuleCorpus {
    pub fn builtin() -> Result<Self, FormulationError> {
        Self::from_yaml_str(BUILTIN_RULES, "builtin:physio_rules.yaml")
    }

    /// Load `physio_rules.yaml` from `data_dir`, or the built-in copy.
    pub fn load(data_dir: Option<&Path>) -> Result<Self, FormulationError> {
        let file = resolve_data_file(data_dir, RULES_FILE, BUILTIN_RULES)?;
        Self::from_yaml_str(&file.text, &file.origin)
    }

    pub fn from_yaml_str(yaml: &str, origin: &str) -> Result<Self, FormulationError> {
        let file: RulesFile = serde_yaml::from_str(yaml)?;
        Self::from_rules(file.rules, origin)
    }

    /// Validate and order rules. An empty list is accepted here; the engine
    /// decides whether that is fatal.
    pub fn from_rules(mut rules: Vec<PhysioRule>, origin: &str) -> Result<Self, FormulationError> {
        let mut seen = HashSet::new();
        for rule in &rules {
            let invalid = |reason: String| FormulationError::DataLoad {
                path: origin.to_string(),
                reason,
            };
            if rule.id.trim().is_empty() {
                return Err(invalid("rule without id".to_string()));
            }
            if !seen.insert(rule.id.as_str()) {
                return Err(invalid(format!("duplicate rule id {}", rule.id)));
            }
            if !rule.adjustment_pct.is_finite() || rule.adjustment_pct <= -100.0 {
                return Err(invalid(format!(
                    "{}: adjustment_pct {} must be finite and above -100",
                    rule.id, rule.adjustment_pct
                )));
            }
        }
        rules.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        log::debug!("Loaded {} physiological rules from {origin}", rules.len());
        Ok(Self { rules })
    }

    pub fn list(&self) -> &[PhysioRule] {
        &self.rules
    }

    pub fn get(&self, id: &str) -> Option<&PhysioRule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// Rules whose predicate holds for `profile`, in declared order.
    pub fn applicable<'a>(
        &'a self,
        profile: &'a BiochemicalProfile,
    ) -> impl Iterator<Item = &'a PhysioRule> + 'a {
        self.rules.iter().filter(move |r| r.applies_to(profile))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DirectiveFocus, NoteClass, ScentFamily};

    #[test]
    fn test_builtin_corpus_loads_in_declared_order() {
        let corpus = RuleCorpus::builtin().unwrap();
        assert!(corpus.len() >= 8);
        let orders: Vec<u32> = corpus.list().iter().map(|r| r.order).collect();
        let mut sorted = orders.clone();
        sorted.sort();
        assert_eq!(orders, sorted);

        let dry = corpus.get("dry-skin-fixative-boost").unwrap();
        assert_eq!(
            dry.target,
            CorrectionTarget::NoteClass {
                note_class: NoteClass::Base,
                focus: DirectiveFocus::Fixative
            }
        );
        let musk = corpus.get("oily-skin-musk-reduction").unwrap();
        assert_eq!(musk.target, CorrectionTarget::Family { family: ScentFamily::Musk });
        assert!(musk.adjustment_pct < 0.0);
    }

    #[test]
    fn test_predicates() {
        let corpus = RuleCorpus::builtin().unwrap();
        let dry = BiochemicalProfile::new(5.5, SkinType::Dry, 36.5);
        let ids: Vec<&str> = corpus.applicable(&dry).map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["dry-skin-fixative-boost"]);

        let oily_warm_acidic = BiochemicalProfile::new(4.2, SkinType::Oily, 37.6);
        let ids: Vec<&str> = corpus
            .applicable(&oily_warm_acidic)
            .map(|r| r.id.as_str())
            .collect();
        assert!(ids.contains(&"oily-skin-musk-reduction"));
        assert!(ids.contains(&"warm-skin-top-frontload"));
        assert!(ids.contains(&"acidic-ph-aldehyde-reduction"));
        assert!(!ids.contains(&"alkaline-ph-floral-boost"));
    }

    #[test]
    fn test_predicate_bounds_are_strict() {
        let predicate = RulePredicate {
            temperature_above: Some(37.2),
            ..Default::default()
        };
        assert!(!predicate.matches(&BiochemicalProfile::new(5.5, SkinType::Normal, 37.2)));
        assert!(predicate.matches(&BiochemicalProfile::new(5.5, SkinType::Normal, 37.3)));
    }

    #[test]
    fn test_empty_corpus_is_accepted() {
        let corpus = RuleCorpus::from_yaml_str("rules: []", "test").unwrap();
        assert!(corpus.is_empty());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let corpus = RuleCorpus::builtin().unwrap();
        let mut rules = corpus.list().to_vec();
        rules.push(rules[0].clone());
        let err = RuleCorpus::from_rules(rules, "test").unwrap_err();
        assert!(err.to_string().contains("duplicate rule id"));
    }
}
