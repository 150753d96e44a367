//! End-to-end turn tests with scripted responders and failing collaborators.

use async_trait::async_trait;
use soulframe_core::config::PhraseConfig;
use soulframe_core::telemetry::NullTelemetry;
use soulframe_core::{
    BondLedger, BondState, EmotionEngine, EmotionalClimate, EmotionalSnapshot, Identity,
    MemoryContext, MemoryRecall, ModeGate, OutcomeKind, PersonaFilter, Platform, SentimentReading,
    SentimentSource, SoulframeConfig, StateStore, SystemMode, ToolIntent, TurnContext, TurnMeta,
    TurnResult,
};
use soulframe_memory::InMemoryStore;
use soulframe_reasoning::providers::{MockResponder, MockStep};
use soulframe_reasoning::{Capabilities, Soulframe, TurnOrchestrator, TurnRequest};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Broken collaborators
// ============================================================================

#[derive(Default)]
struct CountingSentiment {
    calls: AtomicUsize,
}

#[async_trait]
impl SentimentSource for CountingSentiment {
    async fn analyze(&self, _identity: &Identity, _message: &str) -> anyhow::Result<SentimentReading> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("sentiment model missing")
    }
}

struct PanickingEmotion;

#[async_trait]
impl EmotionEngine for PanickingEmotion {
    async fn ingest(
        &self,
        _identity: &Identity,
        _message: &str,
        _reply: &str,
        _hint: Option<&SentimentReading>,
        _existing: Option<&EmotionalSnapshot>,
    ) -> anyhow::Result<EmotionalSnapshot> {
        panic!("corrupt mood state")
    }

    async fn climate(&self, _identity: &Identity) -> anyhow::Result<EmotionalClimate> {
        anyhow::bail!("no history")
    }

    async fn current(&self, _identity: &Identity) -> Option<EmotionalSnapshot> {
        panic!("corrupt mood state")
    }
}

struct HangingMemory;

#[async_trait]
impl MemoryRecall for HangingMemory {
    async fn build_context(&self, _identity: &Identity, _message: &str) -> anyhow::Result<MemoryContext> {
        std::future::pending::<()>().await;
        Ok(MemoryContext::default())
    }
}

struct FailingBond;

#[async_trait]
impl BondLedger for FailingBond {
    async fn bond(&self, _identity: &Identity) -> anyhow::Result<BondState> {
        anyhow::bail!("ledger offline")
    }
}

struct FailingPersona;

#[async_trait]
impl PersonaFilter for FailingPersona {
    async fn apply(&self, _text: &str, _result: &TurnResult) -> anyhow::Result<String> {
        anyhow::bail!("persona offline")
    }
}

fn broken_capabilities(sentiment: Arc<CountingSentiment>) -> Capabilities {
    Capabilities {
        sentiment: Some(sentiment),
        emotion: Some(Arc::new(PanickingEmotion)),
        memory: Some(Arc::new(HangingMemory)),
        bond: Some(Arc::new(FailingBond)),
        persona: Some(Arc::new(FailingPersona)),
    }
}

fn orchestrator(primary: Arc<MockResponder>) -> TurnOrchestrator {
    TurnOrchestrator::new(
        SoulframeConfig::default(),
        Arc::new(ModeGate::default()),
        primary,
        Arc::new(NullTelemetry),
    )
}

fn host() -> Identity {
    Identity::new("aria", "sam")
}

fn request(message: &str) -> TurnRequest {
    TurnRequest::new(host(), message, Platform::Desktop)
}

// ============================================================================
// Degradation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_every_stage_failing_still_replies() {
    let mock = Arc::new(MockResponder::scripted(
        "remote",
        vec![MockStep::Reply("I'm still right here with you.".into())],
    ));
    let sentiment = Arc::new(CountingSentiment::default());
    let orch = orchestrator(mock.clone()).with_capabilities(broken_capabilities(sentiment.clone()));

    let reply = orch.respond(request("hello?"), &CancellationToken::new()).await;
    assert_eq!(reply.outcome.kind, OutcomeKind::Ok);
    assert_eq!(reply.text, "I'm still right here with you.");
    assert_eq!(sentiment.calls.load(Ordering::SeqCst), 1);
    assert_eq!(mock.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_everything_failing_including_responder() {
    let mock = Arc::new(MockResponder::scripted("remote", vec![MockStep::Panic]));
    let orch = orchestrator(mock)
        .with_capabilities(broken_capabilities(Arc::new(CountingSentiment::default())));

    let reply = orch.respond(request("hello?"), &CancellationToken::new()).await;
    assert_eq!(reply.outcome.kind, OutcomeKind::Error);
    assert!(!reply.text.trim().is_empty());
    let phrases = PhraseConfig::default();
    assert!(phrases.fallback.provider_error.contains(&reply.text));
}

#[tokio::test(start_paused = true)]
async fn test_run_turn_fills_defaults_when_stages_fail() {
    let mock = Arc::new(MockResponder::new("remote"));
    let orch = orchestrator(mock)
        .with_capabilities(broken_capabilities(Arc::new(CountingSentiment::default())));

    let mut ctx = TurnContext::new(host(), "hi", TurnMeta::for_platform(Platform::Desktop, "hi"));
    let result = orch.run_turn(&mut ctx).await;

    assert_eq!(ctx.sentiment, Some(SentimentReading::neutral()));
    assert_eq!(
        ctx.emotional_snapshot.as_ref().map(|s| s.dominant_mood.label()),
        Some("neutral")
    );
    assert!(ctx.emotional_climate.is_none());
    assert!(ctx.memory_context.is_none());
    // Missing climate and trust fall back to the most restrictive decision
    let decision = ctx.guardrails.unwrap();
    assert!(!decision.allow_vulnerable_tone);
    assert!(decision.max_response_length_factor < 1.0);
    assert!(!result.text.is_empty());
    assert_eq!(result.traits_applied, vec!["curiosity".to_string(), "warmth".to_string()]);
}

// ============================================================================
// Mode gate
// ============================================================================

#[tokio::test]
async fn test_mode_gate_blocks_everything() {
    let mock = Arc::new(MockResponder::new("remote"));
    let sentiment = Arc::new(CountingSentiment::default());
    let mode = Arc::new(ModeGate::new(SystemMode::Lockdown));
    let orch = TurnOrchestrator::new(
        SoulframeConfig::default(),
        mode.clone(),
        mock.clone(),
        Arc::new(NullTelemetry),
    )
    .with_capabilities(Capabilities {
        sentiment: Some(sentiment.clone()),
        ..Default::default()
    });
    let phrases = PhraseConfig::default();

    let reply = orch.respond(request("let me in"), &CancellationToken::new()).await;
    assert_eq!(reply.text, phrases.lockdown_advisory);
    assert!(!reply.committed);

    mode.set(SystemMode::Extracted);
    let mut ctx = TurnContext::new(host(), "hi", TurnMeta::for_platform(Platform::Mobile, "hi"));
    let result = orch.run_turn(&mut ctx).await;
    assert_eq!(result.text, phrases.extracted_advisory);
    assert!(ctx.sentiment.is_none());

    assert_eq!(mock.calls(), 0);
    assert_eq!(sentiment.calls.load(Ordering::SeqCst), 0);

    mode.set(SystemMode::Normal);
    let reply = orch.respond(request("back again"), &CancellationToken::new()).await;
    assert_ne!(reply.text, phrases.lockdown_advisory);
    assert_eq!(mock.calls(), 1);
}

// ============================================================================
// Responder failures
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_responder_timeout_uses_softened_line() {
    let mock = Arc::new(MockResponder::scripted("remote", vec![MockStep::Hang]));
    let orch = orchestrator(mock);
    let started = tokio::time::Instant::now();

    let reply = orch.respond(request("are you there?"), &CancellationToken::new()).await;

    assert_eq!(reply.outcome.kind, OutcomeKind::Timeout);
    assert_eq!(reply.outcome.engine_used, "remote");
    let phrases = PhraseConfig::default();
    assert!(phrases.fallback.timeout.contains(&reply.text), "{}", reply.text);
    assert!(started.elapsed() >= Duration::from_millis(15_000));
    assert!(!reply.committed);
}

#[tokio::test]
async fn test_provider_error_and_empty_reply() {
    let phrases = PhraseConfig::default();

    let failing = orchestrator(Arc::new(MockResponder::scripted(
        "remote",
        vec![MockStep::Fail("HTTP 500: upstream exploded".into())],
    )));
    let reply = failing.respond(request("hi"), &CancellationToken::new()).await;
    assert_eq!(reply.outcome.kind, OutcomeKind::FallbackMessage);
    assert!(phrases.fallback.provider_error.contains(&reply.text));
    assert!(!reply.text.contains("500"));

    let empty = orchestrator(Arc::new(MockResponder::scripted("remote", vec![MockStep::Empty])));
    let reply = empty.respond(request("hi"), &CancellationToken::new()).await;
    assert_eq!(reply.outcome.kind, OutcomeKind::FallbackMessage);
    assert!(phrases.fallback.empty_reply.contains(&reply.text));
}

#[tokio::test]
async fn test_local_fallback_only_when_allowed() {
    let primary = Arc::new(MockResponder::scripted(
        "remote",
        vec![MockStep::Fail("down".into()), MockStep::Fail("down".into())],
    ));
    let local = Arc::new(MockResponder::scripted(
        "local",
        vec![MockStep::Reply("Local engine here, still with you.".into())],
    ));
    let orch = orchestrator(primary.clone()).with_local(local.clone());

    let reply = orch.respond(request("hi"), &CancellationToken::new()).await;
    assert_eq!(reply.outcome.kind, OutcomeKind::FallbackMessage);
    assert_eq!(local.calls(), 0);

    let reply = orch
        .respond(request("hi again").allow_local_fallback(), &CancellationToken::new())
        .await;
    assert_eq!(reply.outcome.kind, OutcomeKind::Ok);
    assert_eq!(reply.outcome.engine_used, "local");
    assert_eq!(reply.text, "Local engine here, still with you.");
    assert_eq!(primary.calls(), 2);
}

#[tokio::test]
async fn test_both_engines_failing() {
    let primary = Arc::new(MockResponder::scripted("remote", vec![MockStep::Fail("down".into())]));
    let local = Arc::new(MockResponder::scripted("local", vec![MockStep::Empty]));
    let orch = orchestrator(primary).with_local(local);

    let reply = orch
        .respond(request("hi").allow_local_fallback(), &CancellationToken::new())
        .await;
    assert_eq!(reply.outcome.kind, OutcomeKind::FallbackMessage);
    assert_eq!(reply.outcome.engine_used, "local");
    assert!(PhraseConfig::default().fallback.both_failure.contains(&reply.text));
}

// ============================================================================
// Shaping, loops, finalization
// ============================================================================

#[tokio::test]
async fn test_mobile_reply_is_shaped() {
    let mock = Arc::new(MockResponder::scripted(
        "remote",
        vec![MockStep::Reply(
            "[DEBUG] First thought here. Second thought here. Third thought here.".into(),
        )],
    ));
    let orch = orchestrator(mock);
    let reply = orch
        .respond(
            TurnRequest::new(host(), "what do you think", Platform::Mobile),
            &CancellationToken::new(),
        )
        .await;
    assert_eq!(reply.text, "First thought here. Second thought here.");
}

#[tokio::test]
async fn test_tool_intent_gets_approval_cue() {
    let mock = Arc::new(MockResponder::scripted(
        "remote",
        vec![MockStep::ReplyWithIntents(
            "I can set a timer for you. It would ring at noon.".into(),
            vec![ToolIntent::new("timer", "ring at noon")],
        )],
    ));
    let orch = orchestrator(mock);
    let reply = orch.respond(request("remind me at noon"), &CancellationToken::new()).await;
    assert_eq!(
        reply.text,
        "I can set a timer for you. Want me to do that? It would ring at noon."
    );
    assert_eq!(reply.pending_tool_intents.len(), 1);
}

#[tokio::test]
async fn test_repeated_reply_is_interrupted() {
    let orch = orchestrator(Arc::new(MockResponder::new("remote")));
    let phrases = PhraseConfig::default();

    let first = orch
        .respond(request("my boss yelled at me again"), &CancellationToken::new())
        .await;
    assert!(!first.interrupted);

    let second = orch
        .respond(request("my boss yelled at me again"), &CancellationToken::new())
        .await;
    assert!(second.interrupted);
    assert!(phrases.interruptions.contains(&second.text));
}

#[tokio::test]
async fn test_assembled_turn_commits_state() {
    let store = Arc::new(InMemoryStore::new());
    let frame = Soulframe::assemble(
        SoulframeConfig::default(),
        store.clone(),
        Arc::new(ModeGate::default()),
        Arc::new(MockResponder::new("remote")),
        None,
        Arc::new(NullTelemetry),
    );

    let reply = frame
        .orchestrator
        .respond(
            request("I love this song so much, thank you!").with_conversation("conv-1"),
            &CancellationToken::new(),
        )
        .await;
    assert!(reply.committed);
    assert!(reply.tone_applied.is_some());

    let memories = store.memories(&host()).await.unwrap();
    assert_eq!(memories.len(), 1);
    assert_eq!(memories[0].thread_id.as_deref(), Some("conv-1"));
    assert!(memories[0].tags.contains(&"music".to_string()));
    assert_eq!(store.trend(&host()).await.unwrap().len(), 1);
    assert!(store.load_bond(&host()).await.unwrap().is_some());
    assert!(frame.emotion.snapshot(&host()).await.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_superseded_turn_skips_commit() {
    let store = Arc::new(InMemoryStore::new());
    let mock = Arc::new(MockResponder::scripted(
        "remote",
        vec![
            MockStep::Delay(Duration::from_secs(5)),
            MockStep::Reply("First answer, nice and full.".into()),
        ],
    ));
    let frame = Soulframe::assemble(
        SoulframeConfig::default(),
        store.clone(),
        Arc::new(ModeGate::default()),
        mock.clone(),
        None,
        Arc::new(NullTelemetry),
    );

    let orch = frame.orchestrator.clone();
    let first = tokio::spawn(async move {
        orch.respond(request("tell me a story"), &CancellationToken::new())
            .await
    });
    tokio::time::sleep(Duration::from_secs(1)).await;

    let second = frame
        .orchestrator
        .respond(request("actually, never mind"), &CancellationToken::new())
        .await;
    let first = first.await.unwrap();

    assert!(first.superseded);
    assert!(!first.committed);
    assert_eq!(first.text, "First answer, nice and full.");
    assert!(!second.superseded);
    assert!(second.committed);
    assert_eq!(mock.calls(), 2);
    assert_eq!(store.memories(&host()).await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_idle_identities_are_forgotten() {
    let orch = orchestrator(Arc::new(MockResponder::new("remote")));
    for n in 0..50 {
        let who = Identity::new("aria", format!("guest-{}", n));
        let reply = orch
            .respond(
                TurnRequest::new(who, "how was your day", Platform::Desktop),
                &CancellationToken::new(),
            )
            .await;
        assert!(!reply.text.is_empty());
    }
    assert_eq!(orch.tracked_identities().await, 50);

    let window = SoulframeConfig::default().loop_detection.window_secs;
    tokio::time::advance(Duration::from_secs(window + 1)).await;

    orch.respond(request("back again"), &CancellationToken::new())
        .await;
    assert_eq!(orch.tracked_identities().await, 1);
}
