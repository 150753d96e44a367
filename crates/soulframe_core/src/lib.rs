pub mod config;
pub mod error;
pub mod guardrails;
pub mod mode;
pub mod responder;
pub mod sentiment;
pub mod telemetry;
pub mod types;
pub mod ux;

pub use config::SoulframeConfig;
pub use error::{ResponderError, StageError};
pub use mode::{ModeGate, SystemMode};
pub use responder::{GenerationConfig, Responder, ResponderReply};
pub use telemetry::{emit, TelemetryEvent, TelemetrySink};
pub use types::*;
pub use ux::UxPolicy;

use async_trait::async_trait;

/// Durable per-identity state. Every accessor is keyed by [`Identity`];
/// nothing is held in module-level singletons.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load_emotion(&self, identity: &Identity) -> anyhow::Result<Option<EmotionRecord>>;
    async fn save_emotion(&self, identity: &Identity, record: &EmotionRecord) -> anyhow::Result<()>;

    async fn load_bond(&self, identity: &Identity) -> anyhow::Result<Option<BondState>>;
    async fn save_bond(&self, identity: &Identity, bond: &BondState) -> anyhow::Result<()>;

    async fn append_memory(&self, identity: &Identity, entry: &MemoryEntry) -> anyhow::Result<()>;
    async fn memories(&self, identity: &Identity) -> anyhow::Result<Vec<MemoryEntry>>;
    /// The newest `window` entries whose trust threshold is at most
    /// `max_trust`, oldest first.
    async fn recall_candidates(
        &self,
        identity: &Identity,
        max_trust: f32,
        window: usize,
    ) -> anyhow::Result<Vec<MemoryEntry>>;

    /// Append a trend point, keeping at most `capacity` of the newest points.
    async fn append_trend(
        &self,
        identity: &Identity,
        point: &SentimentTrendPoint,
        capacity: usize,
    ) -> anyhow::Result<()>;
    async fn trend(&self, identity: &Identity) -> anyhow::Result<Vec<SentimentTrendPoint>>;

    async fn load_synchrony(&self, identity: &Identity) -> anyhow::Result<Option<f32>>;
    async fn save_synchrony(&self, identity: &Identity, score: f32) -> anyhow::Result<()>;
}

// ============================================================================
// Pipeline capabilities
// ============================================================================

#[async_trait]
pub trait SentimentSource: Send + Sync {
    async fn analyze(&self, identity: &Identity, message: &str) -> anyhow::Result<SentimentReading>;
}

#[async_trait]
pub trait EmotionEngine: Send + Sync {
    async fn ingest(
        &self,
        identity: &Identity,
        message: &str,
        reply: &str,
        hint: Option<&SentimentReading>,
        existing: Option<&EmotionalSnapshot>,
    ) -> anyhow::Result<EmotionalSnapshot>;

    async fn climate(&self, identity: &Identity) -> anyhow::Result<EmotionalClimate>;

    /// Last published snapshot, if any.
    async fn current(&self, identity: &Identity) -> Option<EmotionalSnapshot>;
}

#[async_trait]
pub trait MemoryRecall: Send + Sync {
    async fn build_context(&self, identity: &Identity, message: &str) -> anyhow::Result<MemoryContext>;
}

#[async_trait]
pub trait BondLedger: Send + Sync {
    async fn bond(&self, identity: &Identity) -> anyhow::Result<BondState>;
}

/// Persona pass of the post-processor. May reword or append.
#[async_trait]
pub trait PersonaFilter: Send + Sync {
    async fn apply(&self, text: &str, result: &TurnResult) -> anyhow::Result<String>;
}

/// Durable side effect run by the finalizer once the reply is fixed.
#[async_trait]
pub trait TurnRecorder: Send + Sync {
    fn name(&self) -> &str;
    async fn record(&self, record: &TurnRecord) -> anyhow::Result<()>;
}
