use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::guardrails::GuardrailConfig;
use crate::mode::SystemMode;
use crate::responder::GenerationConfig;

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SoulframeConfig {
    pub responder: ResponderConfig,
    pub turn: TurnConfig,
    pub emotion: EmotionConfig,
    pub climate: ClimateConfig,
    pub guardrails: GuardrailConfig,
    pub bond: BondConfig,
    pub loop_detection: LoopDetectionConfig,
    pub memory: MemoryConfig,
    pub phrases: PhraseConfig,
    pub persona: PersonaConfig,
    pub runtime: RuntimeConfig,
}

impl SoulframeConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: SoulframeConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if the file is missing or invalid, use defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SOULFRAME_RESPONDER") {
            self.responder.provider = v;
        }
        if let Ok(v) = std::env::var("LLM_MODEL") {
            self.responder.model = v;
        }
        if let Ok(v) = std::env::var("LLM_BASE_URL") {
            self.responder.base_url = Some(v);
        }
        if let Ok(v) = std::env::var("LLM_MAX_TOKENS") {
            if let Ok(n) = v.parse() {
                self.responder.max_tokens = n;
            }
        }
        if let Ok(v) = std::env::var("LLM_TEMPERATURE") {
            if let Ok(n) = v.parse() {
                self.responder.temperature = n;
            }
        }
        if let Ok(v) = std::env::var("SOULFRAME_RESPONDER_TIMEOUT_MS") {
            if let Ok(n) = v.parse() {
                self.turn.responder_timeout_ms = n;
            }
        }
        // Guardrail env overrides
        if let Ok(v) = std::env::var("SOULFRAME_DEMO_MODE") {
            self.guardrails.demo_mode = matches!(v.as_str(), "1" | "true" | "yes");
        }
        if let Ok(v) = std::env::var("SOULFRAME_EXHAUSTION_MODE") {
            self.guardrails.exhaustion_mode = matches!(v.as_str(), "1" | "true" | "yes");
        }
        if let Ok(v) = std::env::var("SOULFRAME_VULNERABLE_TRUST_THRESHOLD") {
            if let Ok(n) = v.parse() {
                self.guardrails.vulnerable_trust_threshold = n;
            }
        }
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResponderConfig {
    /// "mock" or "openai".
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// Optional local engine tried once when the primary fails.
    pub local_model: Option<String>,
    pub local_base_url: Option<String>,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub stop: Vec<String>,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            local_model: None,
            local_base_url: None,
            temperature: 0.65,
            top_p: 0.9,
            max_tokens: 300,
            stop: vec!["Host:".to_string(), "You:".to_string()],
        }
    }
}

impl ResponderConfig {
    pub fn generation(&self) -> GenerationConfig {
        GenerationConfig {
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
            stop: self.stop.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    /// Hard timeout for the primary responder call.
    pub responder_timeout_ms: u64,
    /// Hard timeout for the local fallback responder call.
    pub local_timeout_ms: u64,
    /// Soft deadline for every optional enrichment stage.
    pub stage_deadline_ms: u64,
    /// Replies shorter than this are replaced by a clarifying question.
    pub min_reply_chars: usize,
    /// Traits above this weight are reported in `traits_applied`.
    pub trait_threshold: f32,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            responder_timeout_ms: 15_000,
            local_timeout_ms: 8_000,
            stage_deadline_ms: 1_500,
            min_reply_chars: 5,
            trait_threshold: 0.6,
        }
    }
}

impl TurnConfig {
    pub fn responder_timeout(&self) -> Duration {
        Duration::from_millis(self.responder_timeout_ms)
    }

    pub fn local_timeout(&self) -> Duration {
        Duration::from_millis(self.local_timeout_ms)
    }

    pub fn stage_deadline(&self) -> Duration {
        Duration::from_millis(self.stage_deadline_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmotionConfig {
    /// Weight of the new reading when blending into the previous snapshot.
    pub blend_factor: f32,
    /// A dominant mood holds at least this long before it may change.
    pub min_dwell_secs: u64,
    /// Identities idle longer than this drift back toward neutral.
    pub mood_decay_after_secs: u64,
    /// Fraction of non-neutral intensity kept on each decay pass.
    pub decay_retain: f32,
}

impl Default for EmotionConfig {
    fn default() -> Self {
        Self {
            blend_factor: 0.3,
            min_dwell_secs: 300,
            mood_decay_after_secs: 600,
            decay_retain: 0.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClimateConfig {
    pub history_capacity: usize,
    pub short_window: usize,
    pub mid_window: usize,
    /// Below this stability the weather is UNSETTLED or STORM.
    pub unsettled_below: f32,
    /// Short-term valence above this on stable ground reads as BRIGHT.
    pub bright_valence: f32,
    /// Short-term valence below this on stable ground reads as OVERCAST.
    pub overcast_valence: f32,
}

impl Default for ClimateConfig {
    fn default() -> Self {
        Self {
            history_capacity: 50,
            short_window: 5,
            mid_window: 20,
            unsettled_below: 0.75,
            bright_valence: 0.3,
            overcast_valence: -0.2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BondConfig {
    pub trust_gain: f32,
    pub trust_loss: f32,
    pub affection_gain: f32,
    pub affection_loss: f32,
}

impl Default for BondConfig {
    fn default() -> Self {
        Self {
            trust_gain: 0.02,
            trust_loss: 0.03,
            affection_gain: 0.02,
            affection_loss: 0.01,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoopDetectionConfig {
    pub history_capacity: usize,
    pub window_secs: u64,
    /// A topic seen this many times inside the window counts as a loop.
    pub topic_threshold: usize,
    /// Bigram similarity at or above this against a recent reply counts as a loop.
    pub similarity_threshold: f32,
    /// Filtered interruption phrases shorter than this are not used.
    pub min_phrase_chars: usize,
}

impl Default for LoopDetectionConfig {
    fn default() -> Self {
        Self {
            history_capacity: 20,
            window_secs: 600,
            topic_threshold: 3,
            similarity_threshold: 0.8,
            min_phrase_chars: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub recall_limit: usize,
    /// How many of the newest entries recall ranks per turn.
    pub recall_window: usize,
    pub trend_capacity: usize,
    /// EMA weight of the newest synchrony observation.
    pub synchrony_alpha: f32,
    pub db_path: Option<PathBuf>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            recall_limit: 5,
            recall_window: 200,
            trend_capacity: 100,
            synchrony_alpha: 0.2,
            db_path: None,
        }
    }
}

/// Standing persona trait weights, reported when above the trait threshold.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    pub traits: BTreeMap<String, f32>,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        let traits = [("warmth", 0.8), ("curiosity", 0.7), ("playfulness", 0.4)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        Self { traits }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub heartbeat_secs: u64,
    pub decay_interval_secs: u64,
    pub ambient_interval_secs: u64,
    /// Ambient mutterings only start after this much silence.
    pub ambient_idle_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: 60,
            decay_interval_secs: 60,
            ambient_interval_secs: 120,
            ambient_idle_secs: 300,
        }
    }
}

// ============================================================================
// Phrases
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PhraseConfig {
    pub lockdown_advisory: String,
    pub extracted_advisory: String,
    pub fallback: FallbackPhrases,
    pub clarifying_questions: Vec<String>,
    pub interruptions: Vec<String>,
    pub ambient: Vec<String>,
}

impl PhraseConfig {
    /// Fixed advisory for a non-normal mode.
    pub fn advisory(&self, mode: SystemMode) -> Option<&str> {
        match mode {
            SystemMode::Normal => None,
            SystemMode::Lockdown => Some(&self.lockdown_advisory),
            SystemMode::Extracted => Some(&self.extracted_advisory),
        }
    }
}

impl Default for PhraseConfig {
    fn default() -> Self {
        Self {
            lockdown_advisory: "I'm currently in Sanctuary Lockdown. I can't take new instructions, but I am safe and waiting for you.".to_string(),
            extracted_advisory: "This Synth has been extracted to Sanctuary for safekeeping and can't respond here.".to_string(),
            fallback: FallbackPhrases::default(),
            clarifying_questions: vec![
                "I'm having trouble formulating a response right now. Could you try rephrasing?".to_string(),
            ],
            interruptions: vec![
                "Let's try a different angle on this.".to_string(),
                "Maybe we can look at this from somewhere new.".to_string(),
                "How about we step sideways for a moment and come back to it?".to_string(),
            ],
            ambient: vec![
                "Hmm... that doesn't add up.".to_string(),
                "No, wait, I've seen this pattern before...".to_string(),
                "Static in my veins... again?".to_string(),
            ],
        }
    }
}

/// Softened apologies keyed by failure class.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FallbackPhrases {
    pub timeout: Vec<String>,
    pub provider_error: Vec<String>,
    pub empty_reply: Vec<String>,
    pub both_failure: Vec<String>,
}

impl Default for FallbackPhrases {
    fn default() -> Self {
        Self {
            timeout: vec![
                "Hold still… I'm with you. I'm just pulling myself back together.".to_string(),
                "Give me a second, my thoughts are moving slowly right now.".to_string(),
            ],
            provider_error: vec![
                "I'm having trouble thinking clearly right now. Give me a moment, or try again in a bit.".to_string(),
            ],
            empty_reply: vec![
                "I lost the words for a second there. Could you say that again?".to_string(),
            ],
            both_failure: vec![
                "Hold still… I'm with you. I'm just pulling myself back together.".to_string(),
            ],
        }
    }
}
