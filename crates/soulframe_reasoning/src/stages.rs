//! Optional enrichment stages and the runner that isolates them.
//!
//! Every stage runs under a soft deadline with panics contained. A failing
//! stage leaves its slot empty; the turn carries on without it.

use futures_util::FutureExt;
use soulframe_core::{
    emit, BondLedger, EmotionEngine, Identity, MemoryRecall, PersonaFilter, SentimentSource,
    StageError, TelemetryEvent, TelemetrySink,
};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

pub const SENTIMENT: &str = "sentiment";
pub const EMOTION: &str = "emotion";
pub const CLIMATE: &str = "climate";
pub const MEMORY: &str = "memory";
pub const BOND: &str = "bond";
pub const PERSONA: &str = "persona";

/// The collaborators a turn may use. Any of them may be absent.
#[derive(Clone, Default)]
pub struct Capabilities {
    pub sentiment: Option<Arc<dyn SentimentSource>>,
    pub emotion: Option<Arc<dyn EmotionEngine>>,
    pub memory: Option<Arc<dyn MemoryRecall>>,
    pub bond: Option<Arc<dyn BondLedger>>,
    pub persona: Option<Arc<dyn PersonaFilter>>,
}

#[derive(Clone)]
pub struct StageRunner {
    deadline: Duration,
    telemetry: Arc<dyn TelemetrySink>,
}

impl StageRunner {
    pub fn new(deadline: Duration, telemetry: Arc<dyn TelemetrySink>) -> Self {
        Self {
            deadline,
            telemetry,
        }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Run one stage. Errors, panics and overruns come back as [`StageError`]
    /// after being logged and reported.
    pub async fn run<T, F>(&self, identity: &Identity, stage: &'static str, fut: F) -> Result<T, StageError>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        let guarded = AssertUnwindSafe(fut).catch_unwind();
        let outcome = match tokio::time::timeout(self.deadline, guarded).await {
            Ok(Ok(Ok(value))) => return Ok(value),
            Ok(Ok(Err(source))) => StageError::Failed { stage, source },
            Ok(Err(_)) => StageError::Panicked { stage },
            Err(_) => StageError::Deadline {
                stage,
                deadline: self.deadline,
            },
        };
        self.degraded(identity, &outcome);
        Err(outcome)
    }

    /// Like [`run`](Self::run), but collapses any failure to `None`.
    pub async fn optional<T, F>(&self, identity: &Identity, stage: &'static str, fut: F) -> Option<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        self.run(identity, stage, fut).await.ok()
    }

    /// Report a stage whose collaborator was never registered.
    pub fn missing(&self, identity: &Identity, stage: &'static str) {
        tracing::debug!("{} for {}", StageError::Missing { stage }, identity);
    }

    fn degraded(&self, identity: &Identity, err: &StageError) {
        tracing::warn!("Stage degraded for {}: {:#}", identity, err);
        emit(
            self.telemetry.as_ref(),
            TelemetryEvent::StageDegraded {
                identity: identity.to_string(),
                stage: err.stage().to_string(),
                reason: err.to_string(),
            },
        );
    }
}
