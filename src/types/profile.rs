//! Request inputs: the biochemical profile and the emotional target.
//!
//! Both are created once per formulation request. Numeric fields are clamped
//! into their physically meaningful ranges on construction, never rejected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::emotion::lexicon::AffectInterpreter;
use crate::utilities::errors::FormulationError;

/// Skin pH range accepted by the pipeline.
pub const PH_RANGE: (f64, f64) = (3.0, 9.0);
/// Skin surface temperature range in degrees Celsius.
pub const TEMPERATURE_RANGE_C: (f64, f64) = (35.0, 38.0);
/// Valence/arousal range.
pub const AFFECT_RANGE: (f64, f64) = (-1.0, 1.0);

const DEFAULT_PH: f64 = 5.5;
/// Temperature assumed when a request omits it.
pub const DEFAULT_TEMPERATURE_C: f64 = 36.5;

/// Clamp `value` into `[min, max]`, logging when the input was out of range.
///
/// Non-finite values are replaced by `fallback`.
pub(crate) fn clamp_logged(field: &'static str, value: f64, min: f64, max: f64, fallback: f64) -> f64 {
    if !value.is_finite() {
        log::warn!("{field} is not a finite number ({value}); using {fallback}");
        return fallback;
    }
    if value < min || value > max {
        let err = FormulationError::InvalidInputRange {
            field,
            value,
            min,
            max,
        };
        log::warn!("{err}; clamping");
        return value.clamp(min, max);
    }
    value
}

// ---------------------------------------------------------------------------
// Skin type and bands
// ---------------------------------------------------------------------------

/// Skin type reported by the calibration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkinType {
    #[serde(alias = "Dry")]
    Dry,
    #[serde(alias = "Normal")]
    Normal,
    #[serde(alias = "Oily")]
    Oily,
}

impl SkinType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkinType::Dry => "dry",
            SkinType::Normal => "normal",
            SkinType::Oily => "oily",
        }
    }
}

impl fmt::Display for SkinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SkinType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dry" => Ok(SkinType::Dry),
            "normal" => Ok(SkinType::Normal),
            "oily" => Ok(SkinType::Oily),
            other => Err(format!("unknown skin type '{other}'")),
        }
    }
}

/// Discretized skin pH.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhBand {
    Acidic,
    Balanced,
    Alkaline,
}

impl PhBand {
    /// Below this pH the skin is labelled acidic.
    pub const ACIDIC_BELOW: f64 = 4.5;
    /// Above this pH the skin is labelled alkaline.
    pub const ALKALINE_ABOVE: f64 = 6.0;

    pub fn from_ph(ph: f64) -> Self {
        if ph < Self::ACIDIC_BELOW {
            PhBand::Acidic
        } else if ph > Self::ALKALINE_ABOVE {
            PhBand::Alkaline
        } else {
            PhBand::Balanced
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PhBand::Acidic => "acidic",
            PhBand::Balanced => "balanced",
            PhBand::Alkaline => "alkaline",
        }
    }
}

/// Discretized skin temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureBand {
    Cool,
    Temperate,
    Warm,
}

impl TemperatureBand {
    pub const COOL_BELOW_C: f64 = 36.0;
    pub const WARM_ABOVE_C: f64 = 37.2;

    pub fn from_celsius(t: f64) -> Self {
        if t < Self::COOL_BELOW_C {
            TemperatureBand::Cool
        } else if t > Self::WARM_ABOVE_C {
            TemperatureBand::Warm
        } else {
            TemperatureBand::Temperate
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TemperatureBand::Cool => "cool",
            TemperatureBand::Temperate => "temperate",
            TemperatureBand::Warm => "warm",
        }
    }
}

// ---------------------------------------------------------------------------
// BiochemicalProfile
// ---------------------------------------------------------------------------

/// Skin chemistry captured by the calibration step.
///
/// Immutable once built; deserialization goes through [`BiochemicalProfile::new`]
/// so wire input is clamped the same way as programmatic input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "ProfileInput")]
pub struct BiochemicalProfile {
    ph: f64,
    skin_type: SkinType,
    temperature_c: f64,
}

#[derive(Deserialize)]
struct ProfileInput {
    ph: f64,
    skin_type: SkinType,
    #[serde(default = "default_temperature")]
    temperature_c: f64,
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE_C
}

impl From<ProfileInput> for BiochemicalProfile {
    fn from(input: ProfileInput) -> Self {
        BiochemicalProfile::new(input.ph, input.skin_type, input.temperature_c)
    }
}

impl BiochemicalProfile {
    pub fn new(ph: f64, skin_type: SkinType, temperature_c: f64) -> Self {
        Self {
            ph: clamp_logged("ph", ph, PH_RANGE.0, PH_RANGE.1, DEFAULT_PH),
            skin_type,
            temperature_c: clamp_logged(
                "temperature_c",
                temperature_c,
                TEMPERATURE_RANGE_C.0,
                TEMPERATURE_RANGE_C.1,
                DEFAULT_TEMPERATURE_C,
            ),
        }
    }

    pub fn ph(&self) -> f64 {
        self.ph
    }

    pub fn skin_type(&self) -> SkinType {
        self.skin_type
    }

    pub fn temperature_c(&self) -> f64 {
        self.temperature_c
    }

    pub fn ph_band(&self) -> PhBand {
        PhBand::from_ph(self.ph)
    }

    pub fn temperature_band(&self) -> TemperatureBand {
        TemperatureBand::from_celsius(self.temperature_c)
    }

    /// Keywords used by keyword-mode retrieval: skin type, pH band, temperature band.
    pub fn keywords(&self) -> [&'static str; 3] {
        [
            self.skin_type.as_str(),
            self.ph_band().label(),
            self.temperature_band().label(),
        ]
    }

    /// Textual rendering embedded by semantic-mode retrieval.
    pub fn render_text(&self) -> String {
        format!(
            "{} skin, {} skin ph {:.1}, {} skin temperature {:.1} c",
            self.skin_type,
            self.ph_band().label(),
            self.ph,
            self.temperature_band().label(),
            self.temperature_c
        )
    }
}

// ---------------------------------------------------------------------------
// EmotionalTarget
// ---------------------------------------------------------------------------

/// Desired emotional effect on the circumplex (valence/arousal) plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "TargetInput")]
pub struct EmotionalTarget {
    valence: f64,
    arousal: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt: Option<String>,
}

#[derive(Deserialize)]
struct TargetInput {
    valence: f64,
    arousal: f64,
    #[serde(default)]
    prompt: Option<String>,
}

impl From<TargetInput> for EmotionalTarget {
    fn from(input: TargetInput) -> Self {
        let target = EmotionalTarget::new(input.valence, input.arousal);
        match input.prompt {
            Some(prompt) => target.with_prompt(prompt),
            None => target,
        }
    }
}

impl EmotionalTarget {
    pub fn new(valence: f64, arousal: f64) -> Self {
        Self {
            valence: clamp_logged("valence", valence, AFFECT_RANGE.0, AFFECT_RANGE.1, 0.0),
            arousal: clamp_logged("arousal", arousal, AFFECT_RANGE.0, AFFECT_RANGE.1, 0.0),
            prompt: None,
        }
    }

    /// Derive the numeric pair from free text with the given interpreter.
    pub fn from_prompt(prompt: impl Into<String>, interpreter: &dyn AffectInterpreter) -> Self {
        let prompt = prompt.into();
        let (valence, arousal) = interpreter.interpret(&prompt);
        Self::new(valence, arousal).with_prompt(prompt)
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn valence(&self) -> f64 {
        self.valence
    }

    pub fn arousal(&self) -> f64 {
        self.arousal
    }

    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref()
    }
}
