//! Molecular property calculator.
//!
//! Derives LogP, molecular weight and a volatility score from an ingredient's
//! structural descriptor (SMILES). Computation is pure; results are cached by
//! ingredient name because catalog entries never change within a process.
//!
//! LogP uses a reduced atom-contribution table in the style of Wildman and
//! Crippen. It preserves the ordering downstream code depends on (longer
//! hydrocarbon skeletons score higher, polar groups lower) rather than
//! reproducing measured values.

pub(crate) mod smiles;

use dashmap::DashMap;

use crate::types::{IngredientRecord, MolecularProperties};
use crate::utilities::errors::PropertyComputationError;

use smiles::{BondOrder, Element, Molecule};

/// Molecular weight (Da) at which volatility is 0.5.
const VOLATILITY_MIDPOINT_DA: f64 = 200.0;
/// Width of the logistic volatility curve, Da.
const VOLATILITY_SCALE_DA: f64 = 35.0;

/// Compute properties for a structural descriptor.
///
/// Deterministic: the same descriptor always yields the same output.
pub fn compute_properties(descriptor: &str) -> Result<MolecularProperties, PropertyComputationError> {
    let molecule = smiles::parse(descriptor)?;
    let molecular_weight_da = molecular_weight(&molecule);
    Ok(MolecularProperties {
        log_p: log_p(&molecule),
        molecular_weight_da,
        volatility_score: volatility(molecular_weight_da),
    })
}

fn molecular_weight(molecule: &Molecule) -> f64 {
    (0..molecule.atoms.len())
        .map(|i| {
            molecule.atoms[i].element.mass() + f64::from(molecule.hydrogens(i)) * Element::H.mass()
        })
        .sum()
}

/// Logistic in molecular weight: strictly decreasing, in (0, 1).
fn volatility(molecular_weight_da: f64) -> f64 {
    1.0 / (1.0 + ((molecular_weight_da - VOLATILITY_MIDPOINT_DA) / VOLATILITY_SCALE_DA).exp())
}

fn log_p(molecule: &Molecule) -> f64 {
    (0..molecule.atoms.len())
        .map(|i| atom_contribution(molecule, i))
        .sum()
}

fn atom_contribution(molecule: &Molecule, i: usize) -> f64 {
    let atom = &molecule.atoms[i];
    let hydrogens = f64::from(molecule.hydrogens(i));
    let hetero_neighbour = molecule
        .neighbours(i)
        .any(|(j, _)| molecule.atoms[j].element.is_hetero());
    let unsaturated = molecule
        .neighbours(i)
        .any(|(_, order)| matches!(order, BondOrder::Double | BondOrder::Triple));

    let heavy = match atom.element {
        Element::C if atom.aromatic => {
            if hetero_neighbour {
                0.1360
            } else {
                0.1581
            }
        }
        Element::C if hetero_neighbour => -0.2035,
        Element::C if unsaturated => 0.1360,
        Element::C => 0.1441,
        Element::O if atom.aromatic => 0.1552,
        Element::O if hydrogens > 0.0 => -0.2893,
        Element::O if unsaturated => -0.1526,
        Element::O => -0.0684,
        Element::N if atom.aromatic => -0.4806,
        Element::N if hydrogens > 0.0 => -1.0190,
        Element::N => -0.3187,
        Element::S => 0.6482,
        Element::F => 0.4202,
        Element::Cl => 0.6895,
        Element::Br => 0.8456,
        Element::I => 0.8857,
        Element::H | Element::B | Element::Si | Element::P | Element::Se => 0.0,
    };

    let hydrogen = match atom.element {
        Element::C => 0.1230,
        _ => -0.2677,
    };
    let ionized = if atom.charge != 0 { -1.0 } else { 0.0 };

    heavy + hydrogens * hydrogen + ionized
}

/// Property calculator with a name-keyed cache safe to share across requests.
#[derive(Debug, Default)]
pub struct MolecularPropertyCalculator {
    cache: DashMap<String, MolecularProperties>,
}

impl MolecularPropertyCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Properties for a catalog record, computed once per ingredient name.
    pub fn properties_for(
        &self,
        record: &IngredientRecord,
    ) -> Result<MolecularProperties, PropertyComputationError> {
        if let Some(cached) = self.cache.get(&record.name) {
            return Ok(*cached);
        }
        let properties = compute_properties(&record.structural_descriptor)?;
        self.cache.insert(record.name.clone(), properties);
        Ok(properties)
    }

    /// Properties for a record, falling back to the note-class defaults.
    pub fn properties_or_default(&self, record: &IngredientRecord) -> MolecularProperties {
        self.properties_for(record).unwrap_or_else(|err| {
            log::warn!("{}: {err}; using {} defaults", record.name, record.note_class);
            MolecularProperties::catalog_default(record.note_class)
        })
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IngredientSource, NoteClass, ScentFamily};

    fn record(name: &str, descriptor: &str) -> IngredientRecord {
        IngredientRecord {
            name: name.to_string(),
            families: vec![ScentFamily::Musk],
            note_class: NoteClass::Base,
            base_concentration_pct: 5.0,
            max_concentration_pct: 100.0,
            structural_descriptor: descriptor.to_string(),
            sustainable: false,
            source: IngredientSource::Synthetic,
            allergen: false,
            compliance_category: None,
            neutral: false,
        }
    }

    #[test]
    fn test_ethanol_molecular_weight() {
        let props = compute_properties("CCO").unwrap();
        assert!((props.molecular_weight_da - 46.069).abs() < 0.01);
    }

    #[test]
    fn test_citral_molecular_weight() {
        let props = compute_properties("CC(C)=CCCC(C)=CC=O").unwrap();
        assert!((props.molecular_weight_da - 152.24).abs() < 0.05);
        assert!(props.log_p > 2.0 && props.log_p < 4.0, "log_p = {}", props.log_p);
    }

    #[test]
    fn test_log_p_grows_with_chain_length() {
        let short = compute_properties("CCCC").unwrap();
        let long = compute_properties("CCCCCCCCCC").unwrap();
        assert!(long.log_p > short.log_p);
    }

    #[test]
    fn test_polar_groups_lower_log_p() {
        let hexane = compute_properties("CCCCCC").unwrap();
        let hexanol = compute_properties("CCCCCCO").unwrap();
        assert!(hexanol.log_p < hexane.log_p);
    }

    #[test]
    fn test_volatility_decreases_with_weight() {
        let light = compute_properties("CC(C)=CCCC(C)=CC=O").unwrap();
        let heavy = compute_properties("CC1(C)CCCC2(C)C1CCC1(C)OCCC12").unwrap();
        assert!(heavy.molecular_weight_da > light.molecular_weight_da);
        assert!(heavy.volatility_score < light.volatility_score);
        assert!(light.volatility_score > 0.0 && light.volatility_score < 1.0);
    }

    #[test]
    fn test_deterministic() {
        let a = compute_properties("COc1cc(C=O)ccc1O").unwrap();
        let b = compute_properties("COc1cc(C=O)ccc1O").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_error_carries_descriptor() {
        let err = compute_properties("C1CC(").unwrap_err();
        assert_eq!(err.descriptor, "C1CC(");
    }

    #[test]
    fn test_calculator_caches_by_name() {
        let calc = MolecularPropertyCalculator::new();
        let rec = record("Ambroxan", "CC1(C)CCCC2(C)C1CCC1(C)OCCC12");
        let first = calc.properties_for(&rec).unwrap();
        let second = calc.properties_for(&rec).unwrap();
        assert_eq!(first, second);
        assert_eq!(calc.cached_len(), 1);
    }

    #[test]
    fn test_calculator_falls_back_on_bad_descriptor() {
        let calc = MolecularPropertyCalculator::new();
        let rec = record("Broken", "C(C");
        assert!(calc.properties_for(&rec).is_err());
        assert_eq!(
            calc.properties_or_default(&rec),
            MolecularProperties::catalog_default(NoteClass::Base)
        );
        assert_eq!(calc.cached_len(), 0);
    }
}
