//! Minimal SMILES reader producing a heavy-atom graph with hydrogen counts.
//!
//! Supports the organic subset (`B C N O P S F Cl Br I`, aromatic `b c n o p s`),
//! bracket atoms with hydrogen counts and charges, branches, ring closures
//! (`1`-`9`, `%nn`), bond symbols `- = # : / \` and disconnected parts (`.`).
//! Stereo markers are accepted and ignored.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::utilities::errors::PropertyComputationError;

static TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[[^\]]*\]|Br|Cl|[BCNOPSFI]|[bcnops]|%[0-9]{2}|[0-9]|[()=#\-:/\\.]").unwrap()
});

static BRACKET_ATOM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\[(\d+)?(se|[A-Z][a-z]?|[bcnops])(@{0,2})(H\d?)?([+-]+\d*)?(?::\d+)?\]$")
        .unwrap()
});

/// Supported elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Element {
    H,
    B,
    C,
    N,
    O,
    Si,
    P,
    S,
    Se,
    F,
    Cl,
    Br,
    I,
}

impl Element {
    fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol.to_ascii_lowercase().as_str() {
            "h" => Element::H,
            "b" => Element::B,
            "c" => Element::C,
            "n" => Element::N,
            "o" => Element::O,
            "si" => Element::Si,
            "p" => Element::P,
            "s" => Element::S,
            "se" => Element::Se,
            "f" => Element::F,
            "cl" => Element::Cl,
            "br" => Element::Br,
            "i" => Element::I,
            _ => return None,
        })
    }

    /// Standard atomic weight, Da.
    pub(crate) fn mass(&self) -> f64 {
        match self {
            Element::H => 1.008,
            Element::B => 10.81,
            Element::C => 12.011,
            Element::N => 14.007,
            Element::O => 15.999,
            Element::Si => 28.085,
            Element::P => 30.974,
            Element::S => 32.06,
            Element::Se => 78.971,
            Element::F => 18.998,
            Element::Cl => 35.45,
            Element::Br => 79.904,
            Element::I => 126.904,
        }
    }

    /// Allowed valences for implicit-hydrogen completion, ascending.
    fn valences(&self) -> &'static [u8] {
        match self {
            Element::B => &[3],
            Element::C => &[4],
            Element::N => &[3, 5],
            Element::O => &[2],
            Element::P => &[3, 5],
            Element::S => &[2, 4, 6],
            Element::F | Element::Cl | Element::Br | Element::I => &[1],
            Element::H | Element::Si | Element::Se => &[],
        }
    }

    pub(crate) fn is_hetero(&self) -> bool {
        !matches!(self, Element::C | Element::H)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BondOrder {
    Single,
    Double,
    Triple,
    Aromatic,
}

impl BondOrder {
    pub(crate) fn weight(&self) -> f64 {
        match self {
            BondOrder::Single => 1.0,
            BondOrder::Double => 2.0,
            BondOrder::Triple => 3.0,
            BondOrder::Aromatic => 1.5,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Atom {
    pub(crate) element: Element,
    pub(crate) aromatic: bool,
    pub(crate) charge: i8,
    /// Hydrogen count fixed by a bracket atom; `None` means implicit.
    explicit_h: Option<u8>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Bond {
    pub(crate) a: usize,
    pub(crate) b: usize,
    pub(crate) order: BondOrder,
}

/// Parsed heavy-atom graph.
#[derive(Debug, Clone, Default)]
pub(crate) struct Molecule {
    pub(crate) atoms: Vec<Atom>,
    pub(crate) bonds: Vec<Bond>,
}

impl Molecule {
    /// Bonds touching atom `i`, as (neighbour index, order).
    pub(crate) fn neighbours(&self, i: usize) -> impl Iterator<Item = (usize, BondOrder)> + '_ {
        self.bonds.iter().filter_map(move |bond| {
            if bond.a == i {
                Some((bond.b, bond.order))
            } else if bond.b == i {
                Some((bond.a, bond.order))
            } else {
                None
            }
        })
    }

    /// Hydrogens attached to atom `i`, explicit or implied by its valence.
    pub(crate) fn hydrogens(&self, i: usize) -> u8 {
        let atom = &self.atoms[i];
        if let Some(h) = atom.explicit_h {
            return h;
        }
        let bond_sum = self.neighbours(i).map(|(_, o)| o.weight()).sum::<f64>().floor() as u8;
        atom.element
            .valences()
            .iter()
            .find(|v| **v >= bond_sum)
            .map(|v| v - bond_sum)
            .unwrap_or(0)
    }
}

fn error(descriptor: &str, reason: impl Into<String>) -> PropertyComputationError {
    PropertyComputationError::new(descriptor, reason)
}

fn parse_bracket_atom(descriptor: &str, token: &str) -> Result<Atom, PropertyComputationError> {
    let caps = BRACKET_ATOM
        .captures(token)
        .ok_or_else(|| error(descriptor, format!("malformed bracket atom {token}")))?;
    let symbol = &caps[2];
    let element = Element::from_symbol(symbol)
        .ok_or_else(|| error(descriptor, format!("unsupported element {symbol}")))?;
    let aromatic = symbol.chars().next().is_some_and(|c| c.is_ascii_lowercase());

    let explicit_h = match caps.get(4).map(|m| m.as_str()) {
        None => 0,
        Some("H") => 1,
        Some(h) => h[1..]
            .parse::<u8>()
            .map_err(|_| error(descriptor, format!("bad hydrogen count in {token}")))?,
    };

    let charge = match caps.get(5).map(|m| m.as_str()) {
        None => 0,
        Some(c) => {
            let sign: i8 = if c.starts_with('+') { 1 } else { -1 };
            let repeated = c.chars().take_while(|ch| *ch == '+' || *ch == '-').count();
            let digits = &c[repeated..];
            let magnitude = if digits.is_empty() {
                repeated as i8
            } else {
                digits
                    .parse::<i8>()
                    .map_err(|_| error(descriptor, format!("bad charge in {token}")))?
            };
            sign * magnitude
        }
    };

    Ok(Atom {
        element,
        aromatic,
        charge,
        explicit_h: Some(explicit_h),
    })
}

/// Parse a SMILES string.
pub(crate) fn parse(descriptor: &str) -> Result<Molecule, PropertyComputationError> {
    let text = descriptor.trim();
    if text.is_empty() {
        return Err(error(descriptor, "empty descriptor"));
    }

    let mut molecule = Molecule::default();
    let mut previous: Option<usize> = None;
    let mut branches: Vec<Option<usize>> = Vec::new();
    let mut pending: Option<BondOrder> = None;
    let mut rings: HashMap<u16, (usize, Option<BondOrder>)> = HashMap::new();
    let mut cursor = 0;

    for token in TOKEN.find_iter(text) {
        if token.start() != cursor {
            return Err(error(
                descriptor,
                format!("unexpected character at position {cursor}"),
            ));
        }
        cursor = token.end();
        let tok = token.as_str();

        match tok {
            "(" => {
                if previous.is_none() {
                    return Err(error(descriptor, "branch opened before any atom"));
                }
                branches.push(previous);
            }
            ")" => {
                if pending.is_some() {
                    return Err(error(descriptor, "bond symbol before ')'"));
                }
                previous = branches
                    .pop()
                    .ok_or_else(|| error(descriptor, "unmatched ')'"))?;
            }
            "-" | "/" | "\\" | "=" | "#" | ":" => {
                if pending.is_some() {
                    return Err(error(descriptor, "consecutive bond symbols"));
                }
                pending = Some(match tok {
                    "=" => BondOrder::Double,
                    "#" => BondOrder::Triple,
                    ":" => BondOrder::Aromatic,
                    _ => BondOrder::Single,
                });
            }
            "." => {
                if pending.is_some() {
                    return Err(error(descriptor, "bond symbol before '.'"));
                }
                previous = None;
            }
            t if t.starts_with('%') || t.chars().all(|c| c.is_ascii_digit()) => {
                let label: u16 = t
                    .trim_start_matches('%')
                    .parse()
                    .map_err(|_| error(descriptor, format!("bad ring label {t}")))?;
                let current =
                    previous.ok_or_else(|| error(descriptor, "ring closure before any atom"))?;
                match rings.remove(&label) {
                    Some((other, opening_order)) => {
                        if other == current {
                            return Err(error(descriptor, "ring closes on its own atom"));
                        }
                        let order = pending
                            .take()
                            .or(opening_order)
                            .unwrap_or_else(|| default_order(&molecule, other, current));
                        molecule.bonds.push(Bond {
                            a: other,
                            b: current,
                            order,
                        });
                    }
                    None => {
                        rings.insert(label, (current, pending.take()));
                    }
                }
            }
            t => {
                let atom = if t.starts_with('[') {
                    parse_bracket_atom(descriptor, t)?
                } else {
                    let element = Element::from_symbol(t)
                        .ok_or_else(|| error(descriptor, format!("unsupported atom {t}")))?;
                    Atom {
                        element,
                        aromatic: t.chars().all(|c| c.is_ascii_lowercase()),
                        charge: 0,
                        explicit_h: None,
                    }
                };
                molecule.atoms.push(atom);
                let index = molecule.atoms.len() - 1;
                if let Some(prev) = previous {
                    let order = pending
                        .take()
                        .unwrap_or_else(|| default_order(&molecule, prev, index));
                    molecule.bonds.push(Bond {
                        a: prev,
                        b: index,
                        order,
                    });
                } else if pending.is_some() {
                    return Err(error(descriptor, "bond symbol without a preceding atom"));
                }
                previous = Some(index);
            }
        }
    }

    if cursor != text.len() {
        return Err(error(
            descriptor,
            format!("unexpected character at position {cursor}"),
        ));
    }
    if !branches.is_empty() {
        return Err(error(descriptor, "unclosed branch"));
    }
    if let Some(label) = rings.keys().min() {
        return Err(error(descriptor, format!("unclosed ring {label}")));
    }
    if pending.is_some() {
        return Err(error(descriptor, "dangling bond symbol"));
    }
    if molecule.atoms.is_empty() {
        return Err(error(descriptor, "no atoms"));
    }
    Ok(molecule)
}

fn default_order(molecule: &Molecule, a: usize, b: usize) -> BondOrder {
    if molecule.atoms[a].aromatic && molecule.atoms[b].aromatic {
        BondOrder::Aromatic
    } else {
        BondOrder::Single
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total_h(m: &Molecule) -> u32 {
        (0..m.atoms.len()).map(|i| m.hydrogens(i) as u32).sum()
    }

    #[test]
    fn test_citral_formula() {
        let m = parse("CC(C)=CCCC(C)=CC=O").unwrap();
        assert_eq!(m.atoms.len(), 11);
        assert_eq!(total_h(&m), 16);
    }

    #[test]
    fn test_benzene_ring_hydrogens() {
        let m = parse("c1ccccc1").unwrap();
        assert_eq!(m.bonds.len(), 6);
        assert!(m.bonds.iter().all(|b| b.order == BondOrder::Aromatic));
        assert_eq!(total_h(&m), 6);
    }

    #[test]
    fn test_vanillin_hydrogens() {
        // C8H8O3
        let m = parse("COc1cc(C=O)ccc1O").unwrap();
        assert_eq!(m.atoms.len(), 11);
        assert_eq!(total_h(&m), 8);
    }

    #[test]
    fn test_bracket_atoms() {
        let m = parse("c1cc[nH]c1").unwrap();
        assert_eq!(total_h(&m), 5);

        let m = parse("[Na+].[Cl-]");
        assert!(m.is_err(), "sodium is outside the supported set");

        let m = parse("C[N+](C)(C)C").unwrap();
        assert_eq!(m.atoms[1].charge, 1);
        assert_eq!(m.hydrogens(1), 0);
    }

    #[test]
    fn test_two_digit_ring_label() {
        let m = parse("C%10CCCCC%10").unwrap();
        assert_eq!(m.bonds.len(), 6);
    }

    #[test]
    fn test_malformed_inputs() {
        for bad in ["", "C(C", "C)C", "C1CC", "C=", "(C)", "CXC", "C==C"] {
            let err = parse(bad);
            assert!(err.is_err(), "{bad:?} should fail");
        }
        let err = parse("C1CC").unwrap_err();
        assert_eq!(err.descriptor, "C1CC");
        assert!(err.reason.contains("unclosed ring"));
    }
}
