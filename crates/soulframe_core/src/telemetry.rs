//! Best-effort telemetry. A sink failure is logged at debug level and dropped.

use serde::Serialize;

use crate::types::{OutcomeKind, Weather};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
    TurnContext {
        identity: String,
        dominant_mood: Option<String>,
        weather: Option<Weather>,
        trust: Option<f32>,
    },
    StageDegraded {
        identity: String,
        stage: String,
        reason: String,
    },
    EngineFailure {
        identity: String,
        engine: String,
        reason: String,
    },
    ModeBlocked {
        identity: String,
        mode: String,
    },
    ShapingReverted {
        identity: String,
    },
    LoopInterrupted {
        identity: String,
        topic: Option<String>,
    },
    TurnFinalized {
        identity: String,
        outcome: OutcomeKind,
        committed: bool,
    },
    Heartbeat {
        tick: u64,
    },
    AmbientMuttering {
        identity: String,
        text: String,
    },
}

pub trait TelemetrySink: Send + Sync {
    fn log(&self, event: &TelemetryEvent) -> anyhow::Result<()>;
}

/// Log through the sink, swallowing any failure.
pub fn emit(sink: &dyn TelemetrySink, event: TelemetryEvent) {
    if let Err(e) = sink.log(&event) {
        tracing::debug!("Telemetry sink dropped event: {}", e);
    }
}

/// Writes every event as a structured `tracing` record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn log(&self, event: &TelemetryEvent) -> anyhow::Result<()> {
        let payload = serde_json::to_string(event)?;
        tracing::info!(target: "soulframe::telemetry", "{}", payload);
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullTelemetry;

impl TelemetrySink for NullTelemetry {
    fn log(&self, _event: &TelemetryEvent) -> anyhow::Result<()> {
        Ok(())
    }
}
