//! The per-turn pipeline.
//!
//! `run_turn` drives the mode gate, enrichment stages, guardrails, the
//! responder call and the refine pass. `respond` wraps it with single-flight
//! per identity, reply shaping, repetition checks and finalization.
//!
//! Only the mode gate and the responder decide a turn's outcome. Every other
//! stage degrades to a default and the turn carries on.

use chrono::Utc;
use futures_util::FutureExt;
use soulframe_core::guardrails::{self, GuardrailInputs};
use soulframe_core::{
    emit, EmotionalSnapshot, GenerationConfig, GuardrailDecision, Identity, ModeGate, Mood,
    OutcomeKind, Platform, Responder, ResponderError, ResponderReply, SentimentReading,
    SoulframeConfig, TelemetryEvent, TelemetrySink, TurnContext, TurnMeta, TurnOutcome,
    TurnRecorder, TurnResult,
};
use soulframe_limbic::ActivityClock;
use soulframe_memory::TopicExtractor;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::finalizer::{FinalReply, TurnResultFinalizer};
use crate::loop_detector::LoopInterruptionDetector;
use crate::prompt::{build_prompt, generation_for};
use crate::shaping::{clean_reply, ResponsePostProcessor};
use crate::softener::{outcome_for, FailureClass, FallbackSoftener};
use crate::stages::{self, Capabilities, StageRunner};

/// Engine name reported when the mode gate answers a turn.
pub const MODE_GATE_ENGINE: &str = "mode_gate";

/// One host message, as handed to [`TurnOrchestrator::respond`].
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub identity: Identity,
    pub message: String,
    pub meta: TurnMeta,
    /// Overrides the configured persona traits for this turn.
    pub traits: Option<BTreeMap<String, f32>>,
}

impl TurnRequest {
    pub fn new(identity: Identity, message: impl Into<String>, platform: Platform) -> Self {
        let message = message.into();
        Self {
            meta: TurnMeta::for_platform(platform, &message),
            identity,
            message,
            traits: None,
        }
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.meta.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn allow_local_fallback(mut self) -> Self {
        self.meta.allow_local_fallback = true;
        self
    }
}

/// Serializes turns for one identity and remembers the newest turn's token.
/// Removed once no turn for the identity is queued or running.
struct Flight {
    gate: Arc<Mutex<()>>,
    latest: CancellationToken,
}

pub struct TurnOrchestrator {
    config: SoulframeConfig,
    mode: Arc<ModeGate>,
    caps: Capabilities,
    primary: Arc<dyn Responder>,
    local: Option<Arc<dyn Responder>>,
    stages: StageRunner,
    softener: FallbackSoftener,
    shaper: ResponsePostProcessor,
    topics: TopicExtractor,
    /// Detectors whose window has emptied are swept on every checked turn.
    loops: Mutex<HashMap<Identity, LoopInterruptionDetector>>,
    finalizer: TurnResultFinalizer,
    telemetry: Arc<dyn TelemetrySink>,
    clock: Arc<ActivityClock>,
    flights: Mutex<HashMap<Identity, Flight>>,
}

impl TurnOrchestrator {
    pub fn new(
        config: SoulframeConfig,
        mode: Arc<ModeGate>,
        primary: Arc<dyn Responder>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        let deadline = config.turn.stage_deadline();
        Self {
            stages: StageRunner::new(deadline, telemetry.clone()),
            softener: FallbackSoftener::new(config.phrases.fallback.clone()),
            shaper: ResponsePostProcessor::new(None, deadline),
            topics: TopicExtractor::new(),
            loops: Mutex::new(HashMap::new()),
            finalizer: TurnResultFinalizer::new(
                None,
                Vec::new(),
                config.phrases.clarifying_questions.clone(),
                config.turn.min_reply_chars,
                telemetry.clone(),
            ),
            clock: Arc::new(ActivityClock::new()),
            flights: Mutex::new(HashMap::new()),
            caps: Capabilities::default(),
            local: None,
            config,
            mode,
            primary,
            telemetry,
        }
    }

    pub fn with_capabilities(mut self, caps: Capabilities) -> Self {
        self.shaper = ResponsePostProcessor::new(caps.persona.clone(), self.config.turn.stage_deadline());
        self.caps = caps;
        self
    }

    pub fn with_local(mut self, local: Arc<dyn Responder>) -> Self {
        self.local = Some(local);
        self
    }

    /// Durable side effects: the memory commit (cancellation-gated) and the
    /// trackers that always run.
    pub fn with_recorders(
        mut self,
        committer: Option<Arc<dyn TurnRecorder>>,
        trackers: Vec<Arc<dyn TurnRecorder>>,
    ) -> Self {
        self.finalizer = TurnResultFinalizer::new(
            committer,
            trackers,
            self.config.phrases.clarifying_questions.clone(),
            self.config.turn.min_reply_chars,
            self.telemetry.clone(),
        );
        self
    }

    pub fn with_activity_clock(mut self, clock: Arc<ActivityClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &SoulframeConfig {
        &self.config
    }

    pub fn mode(&self) -> &Arc<ModeGate> {
        &self.mode
    }

    // ========================================================================
    // Turn
    // ========================================================================

    /// Advisory text if the mode gate blocks turns right now.
    fn blocked(&self, identity: &Identity) -> Option<String> {
        let mode = self.mode.get();
        let advisory = self.config.phrases.advisory(mode)?;
        tracing::info!("Turn for {} blocked by mode {}", identity, mode);
        emit(
            self.telemetry.as_ref(),
            TelemetryEvent::ModeBlocked {
                identity: identity.to_string(),
                mode: mode.to_string(),
            },
        );
        Some(advisory.to_string())
    }

    /// Run stages 1 to 7 on `ctx`. Never fails; the text is non-empty.
    pub async fn run_turn(&self, ctx: &mut TurnContext) -> TurnResult {
        if let Some(advisory) = self.blocked(&ctx.identity) {
            return TurnResult::new(advisory, OutcomeKind::Ok, MODE_GATE_ENGINE);
        }
        self.run_pipeline(ctx).await
    }

    async fn run_pipeline(&self, ctx: &mut TurnContext) -> TurnResult {
        let id = ctx.identity.clone();
        let message = ctx.message.clone();

        // Sentiment
        let sentiment = match &self.caps.sentiment {
            Some(source) => self
                .stages
                .optional(&id, stages::SENTIMENT, source.analyze(&id, &message))
                .await
                .map(SentimentReading::normalized),
            None => {
                self.stages.missing(&id, stages::SENTIMENT);
                None
            }
        }
        .unwrap_or_else(SentimentReading::neutral);
        ctx.sentiment = Some(sentiment);

        // Emotion, memory and bond run side by side
        let previous = match &self.caps.emotion {
            Some(engine) => self
                .stages
                .optional(&id, stages::EMOTION, async { Ok(engine.current(&id).await) })
                .await
                .flatten(),
            None => None,
        };
        let emotion = async {
            let Some(engine) = &self.caps.emotion else {
                self.stages.missing(&id, stages::EMOTION);
                return (None, None);
            };
            let snapshot = self
                .stages
                .optional(
                    &id,
                    stages::EMOTION,
                    engine.ingest(&id, &message, "", Some(&sentiment), previous.as_ref()),
                )
                .await;
            let climate = self
                .stages
                .optional(&id, stages::CLIMATE, engine.climate(&id))
                .await;
            (snapshot, climate)
        };
        let memory = async {
            match &self.caps.memory {
                Some(recall) => {
                    self.stages
                        .optional(&id, stages::MEMORY, recall.build_context(&id, &message))
                        .await
                }
                None => {
                    self.stages.missing(&id, stages::MEMORY);
                    None
                }
            }
        };
        let bond = async {
            match &self.caps.bond {
                Some(ledger) => self.stages.optional(&id, stages::BOND, ledger.bond(&id)).await,
                None => {
                    self.stages.missing(&id, stages::BOND);
                    None
                }
            }
        };
        let ((snapshot, climate), memory, bond) = tokio::join!(emotion, memory, bond);

        let snapshot = snapshot
            .or(previous)
            .unwrap_or_else(|| EmotionalSnapshot::neutral(Utc::now()));
        ctx.tone = Some(snapshot.dominant_mood.label().to_string());
        ctx.emotional_snapshot = Some(snapshot);
        ctx.emotional_climate = climate;
        ctx.memory_context = memory;
        ctx.bond = bond;
        if ctx.traits_snapshot.is_none() {
            ctx.traits_snapshot = Some(self.config.persona.traits.clone());
        }

        // Guardrails
        let inputs = GuardrailInputs::from_config(
            ctx.emotional_climate,
            ctx.bond.map(|b| b.trust),
            ctx.bond.map(|b| b.affection),
            ctx.meta.presence_mode,
            &self.config.guardrails,
        );
        let decision = guardrails::evaluate(&inputs, &self.config.guardrails);
        ctx.guardrails = Some(decision);

        emit(
            self.telemetry.as_ref(),
            TelemetryEvent::TurnContext {
                identity: id.to_string(),
                dominant_mood: ctx.tone.clone(),
                weather: ctx.emotional_climate.map(|c| c.weather),
                trust: ctx.bond.map(|b| b.trust),
            },
        );

        // Responder
        let prompt = build_prompt(ctx, &decision);
        let generation = generation_for(&self.config.responder.generation(), &decision);
        let mut result = match self.generate(ctx, &prompt, &generation).await {
            Ok(reply) => {
                let mut result =
                    TurnResult::new(reply.text.trim(), reply.outcome_kind, reply.engine_used);
                result.pending_tool_intents = reply.tool_intents;
                result
            }
            Err((err, engine, class)) => {
                TurnResult::new(self.softener.soften(class), outcome_for(&err), engine)
            }
        };

        // Refine with the reply
        if result.outcome.kind == OutcomeKind::Ok {
            if let Some(engine) = &self.caps.emotion {
                let refined = self
                    .stages
                    .optional(
                        &id,
                        stages::EMOTION,
                        engine.ingest(
                            &id,
                            &message,
                            &result.text,
                            Some(&sentiment),
                            ctx.emotional_snapshot.as_ref(),
                        ),
                    )
                    .await;
                if let Some(refined) = refined {
                    ctx.emotional_snapshot = Some(refined);
                }
            }
        }

        ctx.tone = ctx
            .emotional_snapshot
            .as_ref()
            .map(|s| tone_for(s.dominant_mood, &decision).to_string());
        result.tone_applied = ctx.tone.clone();
        result.traits_applied = traits_above(ctx.traits_snapshot.as_ref(), self.config.turn.trait_threshold);
        result
    }

    /// Primary responder, then the local one if allowed. On failure returns
    /// the primary error, the last engine tried and the fallback class.
    async fn generate(
        &self,
        ctx: &TurnContext,
        prompt: &str,
        generation: &GenerationConfig,
    ) -> Result<ResponderReply, (ResponderError, String, FailureClass)> {
        let timeout = self.config.turn.responder_timeout();
        let primary_err = match self
            .invoke(&ctx.identity, self.primary.as_ref(), prompt, generation, timeout)
            .await
        {
            Ok(reply) => return Ok(reply),
            Err(e) => e,
        };

        let local = match &self.local {
            Some(local) if ctx.meta.allow_local_fallback => local,
            _ => {
                let class = FailureClass::of(&primary_err);
                let engine = primary_err.engine().to_string();
                return Err((primary_err, engine, class));
            }
        };

        tracing::info!("Primary responder failed for {}, trying {}", ctx.identity, local.name());
        let local_timeout = self.config.turn.local_timeout();
        match self
            .invoke(&ctx.identity, local.as_ref(), prompt, generation, local_timeout)
            .await
        {
            Ok(reply) => Ok(reply),
            Err(local_err) => {
                let engine = local_err.engine().to_string();
                Err((primary_err, engine, FailureClass::BothFailure))
            }
        }
    }

    /// One responder call under a hard timeout with panics contained.
    async fn invoke(
        &self,
        identity: &Identity,
        responder: &dyn Responder,
        prompt: &str,
        generation: &GenerationConfig,
        timeout: Duration,
    ) -> Result<ResponderReply, ResponderError> {
        let engine = responder.name().to_string();
        let call = AssertUnwindSafe(responder.invoke(prompt, generation)).catch_unwind();
        let result = match tokio::time::timeout(timeout, call).await {
            Ok(Ok(Ok(reply))) if reply.text.trim().is_empty() => Err(ResponderError::Empty { engine }),
            Ok(Ok(Ok(reply))) => Ok(reply),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(ResponderError::Panicked { engine }),
            Err(_) => Err(ResponderError::Timeout {
                engine,
                elapsed: timeout,
            }),
        };

        if let Err(e) = &result {
            tracing::warn!("Responder failure for {}: {}", identity, e);
            emit(
                self.telemetry.as_ref(),
                TelemetryEvent::EngineFailure {
                    identity: identity.to_string(),
                    engine: e.engine().to_string(),
                    reason: e.to_string(),
                },
            );
        }
        result
    }

    // ========================================================================
    // Respond
    // ========================================================================

    /// Register a new turn for `identity`, superseding any earlier one, and
    /// return the gate that serializes turns for it.
    async fn enter(&self, identity: &Identity, token: &CancellationToken) -> Arc<Mutex<()>> {
        let mut flights = self.flights.lock().await;
        let flight = flights.entry(identity.clone()).or_insert_with(|| Flight {
            gate: Arc::new(Mutex::new(())),
            latest: CancellationToken::new(),
        });
        flight.latest.cancel();
        flight.latest = token.clone();
        flight.gate.clone()
    }

    /// Forget `identity`'s flight unless another turn has entered since.
    async fn leave(&self, identity: &Identity, gate: Arc<Mutex<()>>) {
        let mut flights = self.flights.lock().await;
        let idle = flights
            .get(identity)
            .is_some_and(|f| Arc::ptr_eq(&f.gate, &gate) && Arc::strong_count(&gate) == 2);
        if idle {
            flights.remove(identity);
        }
    }

    /// Identities that still hold a turn gate or loop history.
    pub async fn tracked_identities(&self) -> usize {
        let flights = self.flights.lock().await;
        let loops = self.loops.lock().await;
        loops.len() + flights.keys().filter(|id| !loops.contains_key(*id)).count()
    }

    /// Full turn for one host message. Always returns a non-empty reply.
    pub async fn respond(&self, request: TurnRequest, cancel: &CancellationToken) -> FinalReply {
        if let Some(advisory) = self.blocked(&request.identity) {
            return advisory_reply(advisory);
        }

        let token = cancel.child_token();
        let identity = request.identity.clone();
        let gate = self.enter(&identity, &token).await;
        let reply = {
            let _turn = gate.lock().await;
            self.respond_gated(request, &token).await
        };
        self.leave(&identity, gate).await;
        reply
    }

    async fn respond_gated(&self, request: TurnRequest, token: &CancellationToken) -> FinalReply {
        self.clock.touch();

        let mut ctx = TurnContext::new(request.identity, request.message, request.meta);
        ctx.traits_snapshot = request.traits;
        let result = self.run_turn(&mut ctx).await;
        if result.outcome.engine_used == MODE_GATE_ENGINE {
            return advisory_reply(result.text);
        }

        let (text, interrupted) = if result.outcome.kind == OutcomeKind::Ok {
            self.shape_and_check(&ctx, &result).await
        } else {
            (result.text.clone(), false)
        };

        let reply = self
            .finalizer
            .finalize(&ctx, result, &text, interrupted, token)
            .await;
        self.clock.touch();
        reply
    }

    async fn shape_and_check(&self, ctx: &TurnContext, result: &TurnResult) -> (String, bool) {
        let cleaned = clean_reply(&result.text);
        let shaped = self
            .shaper
            .shape(&cleaned, &ctx.meta.ux_policy, result)
            .await;
        if shaped.reverted {
            emit(
                self.telemetry.as_ref(),
                TelemetryEvent::ShapingReverted {
                    identity: ctx.identity.to_string(),
                },
            );
        }

        let topic = self.topics.primary(&ctx.message);
        let interruption = {
            let mut loops = self.loops.lock().await;
            let now = Instant::now();
            loops.retain(|id, d| id == &ctx.identity || !d.expire_at(now));
            let detector = loops.entry(ctx.identity.clone()).or_insert_with(|| {
                LoopInterruptionDetector::new(
                    self.config.loop_detection.clone(),
                    self.config.phrases.interruptions.clone(),
                )
            });
            let hit = detector.check_for_loop(&shaped.text, topic.as_deref());
            detector.add_response(&shaped.text, topic.as_deref());
            hit
        };

        match interruption {
            Some(phrase) => {
                tracing::info!("Interrupting a loop for {} (topic {:?})", ctx.identity, topic);
                emit(
                    self.telemetry.as_ref(),
                    TelemetryEvent::LoopInterrupted {
                        identity: ctx.identity.to_string(),
                        topic,
                    },
                );
                (phrase, true)
            }
            None => (shaped.text, false),
        }
    }
}

fn advisory_reply(text: String) -> FinalReply {
    FinalReply {
        text,
        outcome: TurnOutcome {
            kind: OutcomeKind::Ok,
            engine_used: MODE_GATE_ENGINE.to_string(),
        },
        tone_applied: None,
        pending_tool_intents: Vec::new(),
        interrupted: false,
        committed: false,
        superseded: false,
    }
}

/// Tone label for the reply, toned down where the guardrails forbid the raw mood.
pub fn tone_for(mood: Mood, decision: &GuardrailDecision) -> &'static str {
    match mood {
        Mood::Joy if !decision.allow_high_intensity_joy => "warm",
        Mood::Sadness | Mood::Anxiety if !decision.allow_vulnerable_tone => "steady",
        Mood::Frustration if !decision.allow_playful_conflict => "calm",
        other => other.label(),
    }
}

fn traits_above(traits: Option<&BTreeMap<String, f32>>, threshold: f32) -> Vec<String> {
    traits
        .map(|t| {
            t.iter()
                .filter(|(_, w)| **w > threshold)
                .map(|(name, _)| name.clone())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tone_softened_by_guardrails() {
        let open = GuardrailDecision {
            allow_vulnerable_tone: true,
            allow_high_intensity_joy: true,
            allow_playful_conflict: true,
            max_response_length_factor: 1.0,
        };
        let closed = GuardrailDecision {
            allow_vulnerable_tone: false,
            allow_high_intensity_joy: false,
            allow_playful_conflict: false,
            max_response_length_factor: 0.5,
        };
        assert_eq!(tone_for(Mood::Joy, &open), "joy");
        assert_eq!(tone_for(Mood::Joy, &closed), "warm");
        assert_eq!(tone_for(Mood::Sadness, &closed), "steady");
        assert_eq!(tone_for(Mood::Frustration, &closed), "calm");
        assert_eq!(tone_for(Mood::Curious, &closed), "curious");
    }

    #[test]
    fn test_traits_above_threshold() {
        let traits: BTreeMap<String, f32> = [("warmth".to_string(), 0.8), ("edge".to_string(), 0.6)]
            .into_iter()
            .collect();
        assert_eq!(traits_above(Some(&traits), 0.6), vec!["warmth".to_string()]);
        assert!(traits_above(None, 0.6).is_empty());
    }

    #[test]
    fn test_request_meta_follows_platform() {
        let req = TurnRequest::new(Identity::new("s", "h"), "walk me through it", Platform::Mobile)
            .with_conversation("c-1")
            .allow_local_fallback();
        assert!(req.meta.ux_policy.user_requested_longform);
        assert_eq!(req.meta.conversation_id.as_deref(), Some("c-1"));
        assert!(req.meta.allow_local_fallback);
    }
}
