//! Trust and climate gating of expressive behavior.
//!
//! `evaluate` is pure and recomputed every turn. All thresholds come from
//! [`GuardrailConfig`] so they can be tuned from TOML or the environment.

use serde::Deserialize;

use crate::types::{EmotionalClimate, GuardrailDecision, PresenceMode, Weather};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GuardrailConfig {
    pub vulnerable_trust_threshold: f32,
    pub joy_stability_threshold: f32,
    pub playful_trust_threshold: f32,
    pub playful_affection_threshold: f32,
    pub exhaustion_length_factor: f32,
    pub storm_length_factor: f32,
    pub presence_length_factor: f32,
    /// Length factor used when inputs are missing.
    pub restrictive_length_factor: f32,
    pub min_length_factor: f32,
    pub demo_mode: bool,
    pub exhaustion_mode: bool,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            vulnerable_trust_threshold: 0.6,
            joy_stability_threshold: 0.4,
            playful_trust_threshold: 0.5,
            playful_affection_threshold: 0.5,
            exhaustion_length_factor: 0.6,
            storm_length_factor: 0.7,
            presence_length_factor: 0.85,
            restrictive_length_factor: 0.5,
            min_length_factor: 0.25,
            demo_mode: false,
            exhaustion_mode: false,
        }
    }
}

impl GuardrailConfig {
    pub fn most_restrictive(&self) -> GuardrailDecision {
        GuardrailDecision {
            allow_vulnerable_tone: false,
            allow_high_intensity_joy: false,
            allow_playful_conflict: false,
            max_response_length_factor: self
                .restrictive_length_factor
                .clamp(self.min_length_factor, 1.0),
        }
    }
}

/// Everything the evaluator looks at. `None` means the stage that produces the
/// value failed or never ran.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuardrailInputs {
    pub climate: Option<EmotionalClimate>,
    pub trust: Option<f32>,
    pub affection: Option<f32>,
    pub presence: PresenceMode,
    pub demo_mode: bool,
    pub exhaustion_mode: bool,
}

impl GuardrailInputs {
    pub fn from_config(
        climate: Option<EmotionalClimate>,
        trust: Option<f32>,
        affection: Option<f32>,
        presence: PresenceMode,
        config: &GuardrailConfig,
    ) -> Self {
        Self {
            climate,
            trust,
            affection,
            presence,
            demo_mode: config.demo_mode,
            exhaustion_mode: config.exhaustion_mode,
        }
    }
}

pub fn evaluate(inputs: &GuardrailInputs, config: &GuardrailConfig) -> GuardrailDecision {
    let (climate, trust) = match (inputs.climate, inputs.trust) {
        (Some(c), Some(t)) => (c, t),
        _ => return config.most_restrictive(),
    };
    let affection = inputs.affection.unwrap_or(0.0);
    let storm = climate.weather == Weather::Storm;

    let allow_vulnerable_tone =
        trust >= config.vulnerable_trust_threshold && !storm && !inputs.demo_mode;
    let allow_high_intensity_joy = climate.stability_score >= config.joy_stability_threshold;
    let allow_playful_conflict = trust >= config.playful_trust_threshold
        && affection >= config.playful_affection_threshold;

    let mut factor = 1.0f32;
    if inputs.exhaustion_mode {
        factor *= config.exhaustion_length_factor;
    }
    if storm {
        factor *= config.storm_length_factor;
    }
    if inputs.presence == PresenceMode::On {
        factor *= config.presence_length_factor;
    }

    GuardrailDecision {
        allow_vulnerable_tone,
        allow_high_intensity_joy,
        allow_playful_conflict,
        max_response_length_factor: factor.clamp(config.min_length_factor, 1.0),
    }
}
