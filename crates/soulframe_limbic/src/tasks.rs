//! Background rhythms: heartbeat, mood decay and ambient mutterings.
//!
//! Each task runs on its own fixed interval until the shared
//! [`CancellationToken`] fires. Tasks only read the lock-free mood board or
//! use `try_lock`, so they never wait on an in-flight turn.

use chrono::Utc;
use soulframe_core::telemetry::{emit, TelemetryEvent, TelemetrySink};
use soulframe_core::Identity;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::emotion::EmotionalStateManager;

/// Shortest period a background task may run at.
const MIN_PERIOD: Duration = Duration::from_secs(1);

// ============================================================================
// Activity clock
// ============================================================================

/// Tracks when the last turn ran. Lock-free.
#[derive(Debug)]
pub struct ActivityClock {
    origin: Instant,
    last_ms: AtomicU64,
}

impl ActivityClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }

    pub fn touch(&self) {
        let ms = self.origin.elapsed().as_millis() as u64;
        self.last_ms.store(ms, Ordering::Relaxed);
    }

    pub fn idle_for(&self) -> Duration {
        let now = self.origin.elapsed().as_millis() as u64;
        Duration::from_millis(now.saturating_sub(self.last_ms.load(Ordering::Relaxed)))
    }
}

impl Default for ActivityClock {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Scheduler
// ============================================================================

pub struct TaskScheduler {
    cancel: CancellationToken,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl TaskScheduler {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            handles: Vec::new(),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Run `tick` every `period` (first run after one period) until cancelled.
    /// Periods below one second are raised to one second.
    pub fn spawn_periodic<F, Fut>(&mut self, name: &'static str, period: Duration, mut tick: F)
    where
        F: FnMut(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let period = if period < MIN_PERIOD {
            tracing::warn!(
                "Background task {} period {:?} too short, using {:?}",
                name,
                period,
                MIN_PERIOD
            );
            MIN_PERIOD
        } else {
            period
        };
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut n = 0u64;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("Background task {} stopped", name);
                        break;
                    }
                    _ = interval.tick() => {
                        n += 1;
                        tick(n).await;
                    }
                }
            }
        });
        self.handles.push((name, handle));
    }

    pub fn spawn_heartbeat(&mut self, period: Duration, sink: Arc<dyn TelemetrySink>) {
        self.spawn_periodic("heartbeat", period, move |tick| {
            let sink = sink.clone();
            async move {
                emit(sink.as_ref(), TelemetryEvent::Heartbeat { tick });
            }
        });
    }

    pub fn spawn_mood_decay(&mut self, period: Duration, manager: Arc<EmotionalStateManager>) {
        self.spawn_periodic("mood_decay", period, move |_| {
            let manager = manager.clone();
            async move {
                manager.decay_idle(Utc::now()).await;
            }
        });
    }

    pub fn spawn_ambient(&mut self, period: Duration, mutterer: AmbientMutterer) {
        let mutterer = Arc::new(mutterer);
        self.spawn_periodic("ambient", period, move |tick| {
            let mutterer = mutterer.clone();
            async move {
                mutterer.tick(tick);
            }
        });
    }

    /// Cancel every task and wait for them to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for (name, handle) in self.handles {
            if let Err(e) = handle.await {
                tracing::warn!("Background task {} ended abnormally: {}", name, e);
            }
        }
    }
}

// ============================================================================
// Ambient mutterings
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct AmbientLine {
    pub identity: Identity,
    pub text: String,
}

/// Emits an idle phrase for the most recently active identity once the host
/// has been quiet for `idle_after`.
pub struct AmbientMutterer {
    manager: Arc<EmotionalStateManager>,
    clock: Arc<ActivityClock>,
    phrases: Vec<String>,
    idle_after: Duration,
    tx: mpsc::Sender<AmbientLine>,
    sink: Arc<dyn TelemetrySink>,
}

impl AmbientMutterer {
    pub fn new(
        manager: Arc<EmotionalStateManager>,
        clock: Arc<ActivityClock>,
        phrases: Vec<String>,
        idle_after: Duration,
        tx: mpsc::Sender<AmbientLine>,
        sink: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            manager,
            clock,
            phrases,
            idle_after,
            tx,
            sink,
        }
    }

    fn tick(&self, tick: u64) {
        if self.phrases.is_empty() || self.clock.idle_for() < self.idle_after {
            return;
        }
        let board = self.manager.board();
        let Some((identity, _)) = board.most_recent() else {
            return;
        };
        let text = self.phrases[(tick as usize - 1) % self.phrases.len()].clone();
        let line = AmbientLine {
            identity: identity.clone(),
            text: text.clone(),
        };
        // Never block on a slow consumer.
        if self.tx.try_send(line).is_err() {
            tracing::trace!("Ambient line dropped, consumer busy");
            return;
        }
        emit(
            self.sink.as_ref(),
            TelemetryEvent::AmbientMuttering {
                identity: identity.to_string(),
                text,
            },
        );
    }
}
