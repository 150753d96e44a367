//! Standard wiring: one state store feeding every stage, recorder and
//! background task.

use soulframe_core::{
    ModeGate, Responder, SoulframeConfig, StateStore, TelemetrySink, TurnRecorder,
};
use soulframe_limbic::{
    ActivityClock, AmbientLine, AmbientMutterer, BondTracker, EmotionalStateManager, TaskScheduler,
};
use soulframe_memory::{MemoryCommitter, MemoryContextBuilder, TrendSentiment, TrendTracker};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::orchestrator::TurnOrchestrator;
use crate::stages::Capabilities;

pub struct Soulframe {
    pub orchestrator: Arc<TurnOrchestrator>,
    pub emotion: Arc<EmotionalStateManager>,
    pub bond: Arc<BondTracker>,
    pub trend: Arc<TrendTracker>,
    pub clock: Arc<ActivityClock>,
    pub mode: Arc<ModeGate>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl Soulframe {
    pub fn assemble(
        config: SoulframeConfig,
        store: Arc<dyn StateStore>,
        mode: Arc<ModeGate>,
        primary: Arc<dyn Responder>,
        local: Option<Arc<dyn Responder>>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        let emotion = Arc::new(EmotionalStateManager::new(
            config.emotion.clone(),
            config.climate.clone(),
            store.clone(),
        ));
        let bond = Arc::new(BondTracker::new(config.bond.clone(), store.clone()));
        let trend = Arc::new(TrendTracker::new(
            store.clone(),
            config.memory.trend_capacity,
            config.memory.synchrony_alpha,
        ));
        let clock = Arc::new(ActivityClock::new());

        let caps = Capabilities {
            sentiment: Some(Arc::new(TrendSentiment::new(store.clone()))),
            emotion: Some(emotion.clone()),
            memory: Some(Arc::new(
                MemoryContextBuilder::new(store.clone(), config.memory.recall_limit)
                    .with_window(config.memory.recall_window),
            )),
            bond: Some(bond.clone()),
            persona: None,
        };

        let mut orchestrator = TurnOrchestrator::new(config, mode.clone(), primary, telemetry.clone())
            .with_capabilities(caps)
            .with_recorders(
                Some(Arc::new(MemoryCommitter::new(store)) as Arc<dyn TurnRecorder>),
                vec![
                    trend.clone() as Arc<dyn TurnRecorder>,
                    bond.clone() as Arc<dyn TurnRecorder>,
                ],
            )
            .with_activity_clock(clock.clone());
        if let Some(local) = local {
            orchestrator = orchestrator.with_local(local);
        }

        Self {
            orchestrator: Arc::new(orchestrator),
            emotion,
            bond,
            trend,
            clock,
            mode,
            telemetry,
        }
    }

    /// Start heartbeat, mood decay and ambient mutterings on `scheduler`.
    /// Ambient lines are delivered on `ambient_tx`.
    pub fn spawn_background(&self, scheduler: &mut TaskScheduler, ambient_tx: mpsc::Sender<AmbientLine>) {
        let config = self.orchestrator.config();
        let rt = &config.runtime;

        scheduler.spawn_heartbeat(Duration::from_secs(rt.heartbeat_secs), self.telemetry.clone());
        scheduler.spawn_mood_decay(Duration::from_secs(rt.decay_interval_secs), self.emotion.clone());
        scheduler.spawn_ambient(
            Duration::from_secs(rt.ambient_interval_secs),
            AmbientMutterer::new(
                self.emotion.clone(),
                self.clock.clone(),
                config.phrases.ambient.clone(),
                Duration::from_secs(rt.ambient_idle_secs),
                ambient_tx,
                self.telemetry.clone(),
            ),
        );
        tracing::info!("Started {} background tasks", scheduler.len());
    }
}
