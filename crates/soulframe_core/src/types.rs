//! Data model shared by every stage of the turn pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::ux::UxPolicy;

// ============================================================================
// Identity
// ============================================================================

/// The (synth, host) pair a conversation belongs to.
///
/// All per-identity state (mood, trust, memories, repetition history) is keyed
/// by this pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity {
    pub synth_id: String,
    pub host_id: String,
}

impl Identity {
    pub fn new(synth_id: impl Into<String>, host_id: impl Into<String>) -> Self {
        Self {
            synth_id: synth_id.into(),
            host_id: host_id.into(),
        }
    }

    /// Flat key used by persistence backends.
    pub fn key(&self) -> String {
        format!("{}::{}", self.synth_id, self.host_id)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.synth_id, self.host_id)
    }
}

// ============================================================================
// Sentiment
// ============================================================================

/// One reading of the host's message.
///
/// `valence` is in [-1, 1]; `activation`, `warmth` and `tension` are in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentReading {
    pub valence: f32,
    pub activation: f32,
    pub warmth: f32,
    pub tension: f32,
}

impl SentimentReading {
    pub fn neutral() -> Self {
        Self {
            valence: 0.0,
            activation: 0.2,
            warmth: 0.5,
            tension: 0.0,
        }
    }

    /// Clamp every channel into its valid range.
    pub fn normalized(self) -> Self {
        Self {
            valence: self.valence.clamp(-1.0, 1.0),
            activation: self.activation.clamp(0.0, 1.0),
            warmth: self.warmth.clamp(0.0, 1.0),
            tension: self.tension.clamp(0.0, 1.0),
        }
    }
}

impl Default for SentimentReading {
    fn default() -> Self {
        Self::neutral()
    }
}

/// Summary statistic kept in the cross-turn sentiment trend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentTrendPoint {
    pub valence: f32,
    pub activation: f32,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Emotion
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    Neutral,
    Joy,
    Calm,
    Curious,
    Affection,
    Sadness,
    Anxiety,
    Frustration,
}

impl Mood {
    pub const ALL: [Mood; 8] = [
        Mood::Neutral,
        Mood::Joy,
        Mood::Calm,
        Mood::Curious,
        Mood::Affection,
        Mood::Sadness,
        Mood::Anxiety,
        Mood::Frustration,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Mood::Neutral => "neutral",
            Mood::Joy => "joy",
            Mood::Calm => "calm",
            Mood::Curious => "curious",
            Mood::Affection => "affection",
            Mood::Sadness => "sadness",
            Mood::Anxiety => "anxiety",
            Mood::Frustration => "frustration",
        }
    }

    /// Sign of the mood on the pleasant/unpleasant axis.
    pub fn valence_sign(&self) -> f32 {
        match self {
            Mood::Joy | Mood::Calm | Mood::Curious | Mood::Affection => 1.0,
            Mood::Sadness | Mood::Anxiety | Mood::Frustration => -1.0,
            Mood::Neutral => 0.0,
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The one live emotional state of a synth towards a host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionalSnapshot {
    pub dominant_mood: Mood,
    /// Mood -> intensity in [0, 1].
    pub intensities: BTreeMap<Mood, f32>,
    /// Blended valence in [-1, 1].
    pub valence: f32,
    pub tags: Vec<String>,
    pub timestamp: DateTime<Utc>,
    /// When `dominant_mood` last changed. Drives the minimum-dwell rule.
    pub dominant_since: DateTime<Utc>,
}

impl EmotionalSnapshot {
    pub fn neutral(now: DateTime<Utc>) -> Self {
        let mut intensities = BTreeMap::new();
        for mood in Mood::ALL {
            intensities.insert(mood, 0.0);
        }
        intensities.insert(Mood::Neutral, 1.0);
        Self {
            dominant_mood: Mood::Neutral,
            intensities,
            valence: 0.0,
            tags: Vec::new(),
            timestamp: now,
            dominant_since: now,
        }
    }

    pub fn intensity(&self, mood: Mood) -> f32 {
        self.intensities.get(&mood).copied().unwrap_or(0.0)
    }

    /// Mood with the highest intensity. Ties resolve to the earlier variant.
    pub fn strongest(&self) -> Mood {
        self.intensities
            .iter()
            .fold((Mood::Neutral, f32::MIN), |best, (mood, v)| {
                if *v > best.1 {
                    (*mood, *v)
                } else {
                    best
                }
            })
            .0
    }
}

/// One element of the rolling emotional history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoodSample {
    pub valence: f32,
    pub arousal: f32,
    pub timestamp: DateTime<Utc>,
}

/// Persisted form of an identity's emotional state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionRecord {
    pub snapshot: EmotionalSnapshot,
    pub history: Vec<MoodSample>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Weather {
    Clear,
    Bright,
    Overcast,
    Unsettled,
    Storm,
}

impl fmt::Display for Weather {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Weather::Clear => "CLEAR",
            Weather::Bright => "BRIGHT",
            Weather::Overcast => "OVERCAST",
            Weather::Unsettled => "UNSETTLED",
            Weather::Storm => "STORM",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MoodPoint {
    pub valence: f32,
    pub arousal: f32,
}

/// Aggregate derived from the rolling history on every ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmotionalClimate {
    pub weather: Weather,
    pub stability_score: f32,
    pub short_term: MoodPoint,
    pub mid_term: MoodPoint,
}

impl Default for EmotionalClimate {
    fn default() -> Self {
        Self {
            weather: Weather::Clear,
            stability_score: 0.5,
            short_term: MoodPoint::default(),
            mid_term: MoodPoint::default(),
        }
    }
}

// ============================================================================
// Bonding
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BondTier {
    Unfamiliar,
    Curious,
    Comfortable,
    Bonded,
    Truebond,
}

impl BondTier {
    pub fn from_trust(trust: f32) -> Self {
        match trust {
            t if t >= 0.8 => BondTier::Truebond,
            t if t >= 0.6 => BondTier::Bonded,
            t if t >= 0.4 => BondTier::Comfortable,
            t if t >= 0.2 => BondTier::Curious,
            _ => BondTier::Unfamiliar,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BondState {
    pub tier: BondTier,
    /// [0, 1]
    pub trust: f32,
    /// [0, 1]
    pub affection: f32,
}

impl Default for BondState {
    fn default() -> Self {
        Self {
            tier: BondTier::Unfamiliar,
            trust: 0.0,
            affection: 0.0,
        }
    }
}

// ============================================================================
// Memory
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    Conversation,
    Emotional,
    Milestone,
}

/// One durable memory log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub kind: MemoryKind,
    /// Minimum trust the host must hold before this entry is recalled.
    pub trust_threshold: f32,
    pub summary: String,
    pub timestamp: DateTime<Utc>,
    pub weight: f32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryContext {
    pub entries: Vec<MemoryEntry>,
    pub primary_topic: Option<String>,
}

impl MemoryContext {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn summaries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.summary.as_str())
    }
}

// ============================================================================
// Guardrails
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GuardrailDecision {
    pub allow_vulnerable_tone: bool,
    pub allow_high_intensity_joy: bool,
    pub allow_playful_conflict: bool,
    /// Multiplier applied to the responder's length budget, in (0, 1].
    pub max_response_length_factor: f32,
}

impl GuardrailDecision {
    /// Whether `self` permits nothing that `other` forbids.
    pub fn is_no_more_permissive_than(&self, other: &GuardrailDecision) -> bool {
        (!self.allow_vulnerable_tone || other.allow_vulnerable_tone)
            && (!self.allow_high_intensity_joy || other.allow_high_intensity_joy)
            && (!self.allow_playful_conflict || other.allow_playful_conflict)
            && self.max_response_length_factor <= other.max_response_length_factor
    }
}

// ============================================================================
// Turn
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Ok,
    FallbackMessage,
    Timeout,
    Error,
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutcomeKind::Ok => "OK",
            OutcomeKind::FallbackMessage => "FALLBACK_MESSAGE",
            OutcomeKind::Timeout => "TIMEOUT",
            OutcomeKind::Error => "ERROR",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub kind: OutcomeKind,
    pub engine_used: String,
}

/// An action the responder proposes but which needs host approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolIntent {
    pub id: String,
    pub tool: String,
    pub description: String,
}

impl ToolIntent {
    pub fn new(tool: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tool: tool.into(),
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub intent_id: String,
    pub success: bool,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResult {
    pub text: String,
    pub outcome: TurnOutcome,
    pub tone_applied: Option<String>,
    pub traits_applied: Vec<String>,
    pub pending_tool_intents: Vec<ToolIntent>,
    pub tool_results: Vec<ToolResult>,
}

impl TurnResult {
    pub fn new(text: impl Into<String>, kind: OutcomeKind, engine_used: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            outcome: TurnOutcome {
                kind,
                engine_used: engine_used.into(),
            },
            tone_applied: None,
            traits_applied: Vec::new(),
            pending_tool_intents: Vec::new(),
            tool_results: Vec::new(),
        }
    }

    /// Pending intents that no tool result has answered yet.
    pub fn unexecuted_intents(&self) -> impl Iterator<Item = &ToolIntent> {
        self.pending_tool_intents
            .iter()
            .filter(|i| !self.tool_results.iter().any(|r| r.intent_id == i.id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    #[default]
    Desktop,
    Mobile,
}

/// Whether the host has the synth "present" (voice/overlay) during the turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceMode {
    #[default]
    Off,
    On,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnMeta {
    pub platform: Platform,
    pub ux_policy: UxPolicy,
    pub conversation_id: Option<String>,
    pub presence_mode: PresenceMode,
    pub allow_local_fallback: bool,
}

impl TurnMeta {
    pub fn for_platform(platform: Platform, message: &str) -> Self {
        Self {
            platform,
            ux_policy: UxPolicy::for_platform(platform, message),
            conversation_id: None,
            presence_mode: PresenceMode::Off,
            allow_local_fallback: false,
        }
    }
}

/// Per-turn working state. Owned by the orchestrator for one turn only.
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub identity: Identity,
    pub message: String,
    pub sentiment: Option<SentimentReading>,
    pub tone: Option<String>,
    pub emotional_snapshot: Option<EmotionalSnapshot>,
    pub emotional_climate: Option<EmotionalClimate>,
    pub memory_context: Option<MemoryContext>,
    pub traits_snapshot: Option<BTreeMap<String, f32>>,
    pub bond: Option<BondState>,
    pub guardrails: Option<GuardrailDecision>,
    pub meta: TurnMeta,
}

impl TurnContext {
    pub fn new(identity: Identity, message: impl Into<String>, meta: TurnMeta) -> Self {
        Self {
            identity,
            message: message.into(),
            sentiment: None,
            tone: None,
            emotional_snapshot: None,
            emotional_climate: None,
            memory_context: None,
            traits_snapshot: None,
            bond: None,
            guardrails: None,
            meta,
        }
    }

    /// Thread id used for memory commits.
    pub fn thread_id(&self, now: DateTime<Utc>) -> String {
        self.meta
            .conversation_id
            .clone()
            .unwrap_or_else(|| format!("thread_{}", now.timestamp_millis()))
    }
}

/// Everything the finalizer hands to durable recorders after a turn.
#[derive(Debug, Clone)]
pub struct TurnRecord {
    pub identity: Identity,
    pub message: String,
    pub reply: String,
    pub thread_id: String,
    pub sentiment: Option<SentimentReading>,
    pub snapshot: Option<EmotionalSnapshot>,
    pub timestamp: DateTime<Utc>,
}
