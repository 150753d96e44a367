//! Last step of a turn: fix the reply text, then run durable side effects.
//!
//! Nothing in here can change the reply once it is fixed, and nothing in here
//! can fail the turn.

use chrono::Utc;
use futures_util::future::join_all;
use futures_util::FutureExt;
use rand::seq::SliceRandom;
use soulframe_core::{
    emit, OutcomeKind, TelemetryEvent, TelemetrySink, ToolIntent, TurnContext, TurnOutcome,
    TurnRecord, TurnRecorder, TurnResult,
};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const DEFAULT_CLARIFYING: &str =
    "I'm having trouble formulating a response right now. Could you try rephrasing?";

/// What the host finally sees, plus bookkeeping about how it got there.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalReply {
    pub text: String,
    pub outcome: TurnOutcome,
    pub tone_applied: Option<String>,
    pub pending_tool_intents: Vec<ToolIntent>,
    /// The reply was replaced by a loop interruption phrase.
    pub interrupted: bool,
    /// The memory commit ran and succeeded.
    pub committed: bool,
    /// A newer turn for the same identity cancelled this one before commit.
    pub superseded: bool,
}

pub struct TurnResultFinalizer {
    committer: Option<Arc<dyn TurnRecorder>>,
    trackers: Vec<Arc<dyn TurnRecorder>>,
    clarifying: Vec<String>,
    min_chars: usize,
    telemetry: Arc<dyn TelemetrySink>,
}

impl TurnResultFinalizer {
    pub fn new(
        committer: Option<Arc<dyn TurnRecorder>>,
        trackers: Vec<Arc<dyn TurnRecorder>>,
        clarifying: Vec<String>,
        min_chars: usize,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            committer,
            trackers,
            clarifying,
            min_chars,
            telemetry,
        }
    }

    /// Pick the reply text: the shaped text, else the raw responder text, else
    /// a clarifying question. Never empty.
    pub fn settle_text(&self, result: &TurnResult, shaped: &str) -> String {
        for candidate in [shaped.trim(), result.text.trim()] {
            if candidate.chars().count() >= self.min_chars.max(1) {
                return candidate.to_string();
            }
        }
        tracing::warn!("Reply too short after shaping, asking the host to rephrase");
        self.clarifying
            .iter()
            .filter(|q| !q.trim().is_empty())
            .collect::<Vec<_>>()
            .choose(&mut rand::thread_rng())
            .map(|q| q.to_string())
            .unwrap_or_else(|| DEFAULT_CLARIFYING.to_string())
    }

    pub async fn finalize(
        &self,
        ctx: &TurnContext,
        result: TurnResult,
        shaped: &str,
        interrupted: bool,
        cancel: &CancellationToken,
    ) -> FinalReply {
        let text = self.settle_text(&result, shaped);
        let now = Utc::now();
        let record = TurnRecord {
            identity: ctx.identity.clone(),
            message: ctx.message.clone(),
            reply: text.clone(),
            thread_id: ctx.thread_id(now),
            sentiment: ctx.sentiment,
            snapshot: ctx.emotional_snapshot.clone(),
            timestamp: now,
        };

        let superseded = cancel.is_cancelled();
        let committed = match &self.committer {
            Some(_) if superseded => {
                tracing::info!("Turn for {} was superseded, skipping commit", ctx.identity);
                false
            }
            Some(_) if result.outcome.kind != OutcomeKind::Ok => false,
            Some(committer) => run_recorder(committer.as_ref(), &record).await,
            None => false,
        };

        join_all(self.trackers.iter().map(|t| run_recorder(t.as_ref(), &record))).await;

        emit(
            self.telemetry.as_ref(),
            TelemetryEvent::TurnFinalized {
                identity: ctx.identity.to_string(),
                outcome: result.outcome.kind,
                committed,
            },
        );

        FinalReply {
            text,
            outcome: result.outcome,
            tone_applied: result.tone_applied,
            pending_tool_intents: result.pending_tool_intents,
            interrupted,
            committed,
            superseded,
        }
    }
}

async fn run_recorder(recorder: &dyn TurnRecorder, record: &TurnRecord) -> bool {
    match AssertUnwindSafe(recorder.record(record)).catch_unwind().await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::warn!("{} failed for {}: {:#}", recorder.name(), record.identity, e);
            false
        }
        Err(_) => {
            tracing::warn!("{} panicked for {}", recorder.name(), record.identity);
            false
        }
    }
}
