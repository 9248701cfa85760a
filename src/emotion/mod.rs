//! Emotion mapper.
//!
//! Maps a point on the valence/arousal plane to weights over scent
//! families. The plane is split into four quadrants around a neutral band
//! of ±0.15 on each axis (the same band the calibration UI uses to label a
//! point "neutral"):
//!
//! | Quadrant | valence | arousal | families (dominant first) |
//! |---|---|---|---|
//! | Excited/Joyful | > 0.15 | > 0.15 | citrus, floral, fruity |
//! | Calm/Content | > 0.15 | < -0.15 | woody, musk, amber |
//! | Tense/Anxious | < -0.15 | > 0.15 | spicy, green, aromatic |
//! | Sad/Depressed | < -0.15 | < -0.15 | resinous, smoky, leather |
//!
//! A point inside the band on one axis only is split evenly between the two
//! adjacent quadrants; a point inside the band on both axes blends all four.
//! Within a quadrant the dominant family gains weight with distance from
//! the origin.

pub mod lexicon;

pub use lexicon::{AffectInterpreter, LexiconInterpreter, DEFAULT_AFFECT};

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::profile::{clamp_logged, AFFECT_RANGE};
use crate::types::ScentFamily;

/// Half-width of the neutral band on each axis.
pub const NEUTRAL_BAND: f64 = 0.15;

/// A named region of the valence/arousal plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Quadrant {
    #[serde(rename = "Excited/Joyful")]
    ExcitedJoyful,
    #[serde(rename = "Calm/Content")]
    CalmContent,
    #[serde(rename = "Tense/Anxious")]
    TenseAnxious,
    #[serde(rename = "Sad/Depressed")]
    SadDepressed,
}

impl Quadrant {
    pub const ALL: [Quadrant; 4] = [
        Quadrant::ExcitedJoyful,
        Quadrant::CalmContent,
        Quadrant::TenseAnxious,
        Quadrant::SadDepressed,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Quadrant::ExcitedJoyful => "Excited/Joyful",
            Quadrant::CalmContent => "Calm/Content",
            Quadrant::TenseAnxious => "Tense/Anxious",
            Quadrant::SadDepressed => "Sad/Depressed",
        }
    }

    /// Accord character of the quadrant.
    pub fn mood(&self) -> &'static str {
        match self {
            Quadrant::ExcitedJoyful => "bright",
            Quadrant::CalmContent => "calm",
            Quadrant::TenseAnxious => "sharp",
            Quadrant::SadDepressed => "deep",
        }
    }

    /// Families of the quadrant, dominant first.
    pub fn families(&self) -> [ScentFamily; 3] {
        use ScentFamily::*;
        match self {
            Quadrant::ExcitedJoyful => [Citrus, Floral, Fruity],
            Quadrant::CalmContent => [Woody, Musk, Amber],
            Quadrant::TenseAnxious => [Spicy, Green, Aromatic],
            Quadrant::SadDepressed => [Resinous, Smoky, Leather],
        }
    }

    fn from_signs(valence_positive: bool, arousal_positive: bool) -> Self {
        match (valence_positive, arousal_positive) {
            (true, true) => Quadrant::ExcitedJoyful,
            (true, false) => Quadrant::CalmContent,
            (false, true) => Quadrant::TenseAnxious,
            (false, false) => Quadrant::SadDepressed,
        }
    }
}

impl fmt::Display for Quadrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Scent-family weights for one emotional target. Weights sum to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedAccords {
    weights: BTreeMap<ScentFamily, f64>,
    /// Quadrants contributing to the blend and their shares.
    quadrants: Vec<(Quadrant, f64)>,
}

impl WeightedAccords {
    /// Weight of `family`, zero when absent.
    pub fn weight(&self, family: ScentFamily) -> f64 {
        self.weights.get(&family).copied().unwrap_or(0.0)
    }

    pub fn weights(&self) -> &BTreeMap<ScentFamily, f64> {
        &self.weights
    }

    /// Families with a non-zero weight.
    pub fn families(&self) -> impl Iterator<Item = (ScentFamily, f64)> + '_ {
        self.weights
            .iter()
            .filter(|(_, w)| **w > 0.0)
            .map(|(f, w)| (*f, *w))
    }

    pub fn total(&self) -> f64 {
        self.weights.values().sum()
    }

    /// Highest-weighted family; ties go to the earlier family.
    pub fn dominant(&self) -> Option<ScentFamily> {
        self.weights
            .iter()
            .fold(None, |best: Option<(ScentFamily, f64)>, (f, w)| match best {
                Some((_, bw)) if bw >= *w => best,
                _ => Some((*f, *w)),
            })
            .map(|(f, _)| f)
    }

    /// The single quadrant of a point outside the neutral band, if any.
    pub fn quadrant(&self) -> Option<Quadrant> {
        match self.quadrants.as_slice() {
            [(q, _)] => Some(*q),
            _ => None,
        }
    }

    pub fn quadrants(&self) -> &[(Quadrant, f64)] {
        &self.quadrants
    }

    /// Human-readable blend label, e.g. `Excited/Joyful` or `Neutral`.
    pub fn label(&self) -> String {
        match self.quadrants.len() {
            1 => self.quadrants[0].0.label().to_string(),
            4 => "Neutral".to_string(),
            _ => self
                .quadrants
                .iter()
                .map(|(q, _)| q.label())
                .collect::<Vec<_>>()
                .join(" + "),
        }
    }
}

/// Stateless valence/arousal to accord mapper.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmotionMapper;

impl EmotionMapper {
    pub fn new() -> Self {
        Self
    }

    /// Map a valence/arousal pair; out-of-range inputs are clamped.
    pub fn map(&self, valence: f64, arousal: f64) -> WeightedAccords {
        let v = clamp_logged("valence", valence, AFFECT_RANGE.0, AFFECT_RANGE.1, 0.0);
        let a = clamp_logged("arousal", arousal, AFFECT_RANGE.0, AFFECT_RANGE.1, 0.0);

        let v_active = v.abs() > NEUTRAL_BAND;
        let a_active = a.abs() > NEUTRAL_BAND;
        let members: Vec<Quadrant> = match (v_active, a_active) {
            (true, true) => vec![Quadrant::from_signs(v > 0.0, a > 0.0)],
            (true, false) => vec![
                Quadrant::from_signs(v > 0.0, true),
                Quadrant::from_signs(v > 0.0, false),
            ],
            (false, true) => vec![
                Quadrant::from_signs(true, a > 0.0),
                Quadrant::from_signs(false, a > 0.0),
            ],
            (false, false) => Quadrant::ALL.to_vec(),
        };

        let intensity = (v.hypot(a) / std::f64::consts::SQRT_2).min(1.0);
        let dominant_weight = 1.0 / 3.0 + 2.0 * intensity / 3.0;
        let minor_weight = (1.0 - dominant_weight) / 2.0;

        let share = 1.0 / members.len() as f64;
        let mut weights = BTreeMap::new();
        for quadrant in &members {
            for (i, family) in quadrant.families().into_iter().enumerate() {
                let w = if i == 0 { dominant_weight } else { minor_weight };
                *weights.entry(family).or_insert(0.0) += share * w;
            }
        }

        WeightedAccords {
            weights,
            quadrants: members.into_iter().map(|q| (q, share)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_excited_joyful_point() {
        let accords = EmotionMapper::new().map(0.3, 0.2);
        assert_eq!(accords.quadrant(), Some(Quadrant::ExcitedJoyful));
        assert_eq!(accords.dominant(), Some(ScentFamily::Citrus));
        assert_eq!(accords.label(), "Excited/Joyful");
        assert!(accords.weight(ScentFamily::Floral) > 0.0);
        assert_eq!(accords.weight(ScentFamily::Woody), 0.0);
    }

    #[test]
    fn test_quadrant_by_signs() {
        let mapper = EmotionMapper::new();
        assert_eq!(mapper.map(0.6, -0.5).quadrant(), Some(Quadrant::CalmContent));
        assert_eq!(mapper.map(-0.6, 0.5).quadrant(), Some(Quadrant::TenseAnxious));
        assert_eq!(mapper.map(-0.6, -0.5).quadrant(), Some(Quadrant::SadDepressed));
        assert_eq!(
            mapper.map(-0.6, -0.5).dominant(),
            Some(ScentFamily::Resinous)
        );
    }

    #[test]
    fn test_neutral_band_blends_all_quadrants() {
        let accords = EmotionMapper::new().map(0.1, -0.05);
        assert_eq!(accords.quadrant(), None);
        assert_eq!(accords.quadrants().len(), 4);
        assert_eq!(accords.label(), "Neutral");
        assert_eq!(accords.families().count(), 12);
    }

    #[test]
    fn test_single_axis_blends_adjacent_quadrants() {
        let accords = EmotionMapper::new().map(0.5, 0.15);
        assert_eq!(
            accords.quadrants(),
            &[(Quadrant::ExcitedJoyful, 0.5), (Quadrant::CalmContent, 0.5)]
        );
        assert_eq!(accords.label(), "Excited/Joyful + Calm/Content");
        assert!((accords.weight(ScentFamily::Citrus) - accords.weight(ScentFamily::Woody)).abs() < 1e-12);
    }

    #[test]
    fn test_intensity_saturates_dominant_family() {
        let mapper = EmotionMapper::new();
        let mild = mapper.map(0.2, 0.2);
        let strong = mapper.map(1.0, 1.0);
        assert!(strong.weight(ScentFamily::Citrus) > mild.weight(ScentFamily::Citrus));
        assert!((strong.weight(ScentFamily::Citrus) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        let mapper = EmotionMapper::new();
        assert_eq!(mapper.map(4.0, -9.0), mapper.map(1.0, -1.0));
        assert_eq!(mapper.map(f64::NAN, 0.5), mapper.map(0.0, 0.5));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn prop_weights_sum_to_one(v in -1.5f64..1.5, a in -1.5f64..1.5) {
            let accords = EmotionMapper::new().map(v, a);
            prop_assert!((accords.total() - 1.0).abs() < 1e-9);
            for (_, w) in accords.families() {
                prop_assert!((0.0..=1.0).contains(&w));
            }
        }

        #[test]
        fn prop_mapping_is_deterministic(v in -1.0f64..1.0, a in -1.0f64..1.0) {
            let mapper = EmotionMapper::new();
            prop_assert_eq!(mapper.map(v, a), mapper.map(v, a));
        }
    }
}
