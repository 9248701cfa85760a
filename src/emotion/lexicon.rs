//! Free-text affect interpretation.
//!
//! The primary interpreter is an external language model; this module
//! defines the seam it plugs into and a deterministic lexicon fallback that
//! averages the valence/arousal of known mood words.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::utilities::string_utils::tokenize;

/// Valence/arousal used when nothing in the prompt is recognised.
pub const DEFAULT_AFFECT: (f64, f64) = (0.3, 0.2);

/// Turns a free-text brief into a valence/arousal pair.
pub trait AffectInterpreter: Send + Sync {
    fn interpret(&self, prompt: &str) -> (f64, f64);
}

static LEXICON: Lazy<HashMap<&'static str, (f64, f64)>> = Lazy::new(|| {
    [
        // bright, energetic
        ("fresh", (0.6, 0.4)),
        ("bright", (0.7, 0.5)),
        ("energetic", (0.6, 0.8)),
        ("energy", (0.5, 0.7)),
        ("joyful", (0.8, 0.6)),
        ("happy", (0.8, 0.5)),
        ("playful", (0.7, 0.6)),
        ("sunny", (0.7, 0.5)),
        ("summer", (0.6, 0.5)),
        ("citrus", (0.5, 0.5)),
        ("morning", (0.5, 0.3)),
        ("confident", (0.6, 0.5)),
        ("excited", (0.7, 0.8)),
        ("party", (0.6, 0.9)),
        // calm, content
        ("calm", (0.5, -0.6)),
        ("relaxed", (0.6, -0.6)),
        ("relaxing", (0.6, -0.6)),
        ("peaceful", (0.6, -0.7)),
        ("serene", (0.6, -0.6)),
        ("cozy", (0.7, -0.4)),
        ("warm", (0.5, -0.2)),
        ("soft", (0.4, -0.5)),
        ("comfort", (0.6, -0.5)),
        ("sleep", (0.3, -0.8)),
        ("evening", (0.3, -0.4)),
        ("sensual", (0.5, 0.2)),
        ("romantic", (0.7, 0.3)),
        // tense, sharp
        ("tense", (-0.5, 0.6)),
        ("anxious", (-0.6, 0.7)),
        ("nervous", (-0.5, 0.6)),
        ("stressed", (-0.6, 0.6)),
        ("edgy", (-0.3, 0.6)),
        ("sharp", (-0.2, 0.5)),
        ("angry", (-0.7, 0.8)),
        ("focus", (0.1, 0.5)),
        ("focused", (0.1, 0.5)),
        // deep, sad
        ("sad", (-0.7, -0.5)),
        ("melancholy", (-0.5, -0.4)),
        ("melancholic", (-0.5, -0.4)),
        ("dark", (-0.4, -0.3)),
        ("moody", (-0.4, -0.2)),
        ("smoky", (-0.2, -0.3)),
        ("lonely", (-0.6, -0.5)),
        ("tired", (-0.4, -0.7)),
        ("rainy", (-0.2, -0.4)),
        ("nostalgic", (0.1, -0.3)),
        ("mysterious", (-0.1, 0.1)),
    ]
    .into_iter()
    .collect()
});

const NEGATIONS: [&str; 4] = ["not", "no", "never", "without"];

/// Averages the affect of recognised mood words. A negation directly before
/// a word flips its valence.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexiconInterpreter;

impl LexiconInterpreter {
    pub fn new() -> Self {
        Self
    }
}

impl AffectInterpreter for LexiconInterpreter {
    fn interpret(&self, prompt: &str) -> (f64, f64) {
        let words = tokenize(prompt);
        let mut sum = (0.0, 0.0);
        let mut hits = 0usize;
        for (i, word) in words.iter().enumerate() {
            let Some(&(valence, arousal)) = LEXICON.get(word.as_str()) else {
                continue;
            };
            let negated = i > 0 && NEGATIONS.contains(&words[i - 1].as_str());
            sum.0 += if negated { -valence } else { valence };
            sum.1 += arousal;
            hits += 1;
        }
        if hits == 0 {
            log::debug!("No mood words in prompt; using default affect");
            return DEFAULT_AFFECT;
        }
        let n = hits as f64;
        (sum.0 / n, sum.1 / n)
    }
}
