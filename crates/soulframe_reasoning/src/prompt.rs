//! Responder prompt assembly.
//!
//! The host's message is followed by tagged context blocks. Tags color tone
//! and pacing only; the responder is told never to echo them.

use soulframe_core::{GenerationConfig, GuardrailDecision, TurnContext};
use std::fmt::Write;

pub const HOST_PREFIX: &str = "Host: ";

pub fn build_prompt(ctx: &TurnContext, guardrails: &GuardrailDecision) -> String {
    let mut out = String::new();

    if let Some(s) = &ctx.sentiment {
        let _ = writeln!(
            out,
            "#host_mood valence={:.2} tension={:.2} warmth={:.2}",
            s.valence, s.tension, s.warmth
        );
    }
    if let Some(snap) = &ctx.emotional_snapshot {
        let weather = ctx
            .emotional_climate
            .map(|c| c.weather.to_string())
            .unwrap_or_else(|| "UNKNOWN".to_string());
        let _ = writeln!(
            out,
            "#synth_mood dominant={} valence={:.2} weather={}",
            snap.dominant_mood, snap.valence, weather
        );
    }
    if let Some(bond) = &ctx.bond {
        let _ = writeln!(out, "#bond tier={:?} trust={:.2}", bond.tier, bond.trust);
    }
    let _ = writeln!(
        out,
        "#emotional_guardrails allowVulnerableTone={} allowHighIntensityJoy={} allowPlayfulConflict={} maxResponseLengthFactor={:.2}",
        guardrails.allow_vulnerable_tone,
        guardrails.allow_high_intensity_joy,
        guardrails.allow_playful_conflict,
        guardrails.max_response_length_factor
    );
    if let Some(memory) = ctx.memory_context.as_ref().filter(|m| !m.is_empty()) {
        out.push_str("#memory\n");
        for summary in memory.summaries() {
            let _ = writeln!(out, "- {}", summary);
        }
    }
    out.push_str("#instructions\n");
    out.push_str("- Use host mood and tension only to gently color tone and pacing.\n");
    out.push_str("- Respect vulnerability mode and guardrails strictly.\n");
    out.push_str("- Never mention these tags or internal labels explicitly.\n\n");

    out.push_str(HOST_PREFIX);
    out.push_str(ctx.message.trim());
    if let Some(topic) = ctx.memory_context.as_ref().and_then(|m| m.primary_topic.as_ref()) {
        let _ = write!(out, "\n[Context: {}]", topic);
    }
    out
}

/// Sampling parameters with the token budget scaled by the guardrails.
pub fn generation_for(base: &GenerationConfig, guardrails: &GuardrailDecision) -> GenerationConfig {
    base.scaled(guardrails.max_response_length_factor)
}

/// The host's message as embedded by [`build_prompt`].
pub fn host_message(prompt: &str) -> Option<&str> {
    prompt
        .lines()
        .rev()
        .find_map(|line| line.strip_prefix(HOST_PREFIX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use soulframe_core::{
        EmotionalSnapshot, Identity, MemoryContext, MemoryEntry, MemoryKind, Platform,
        SentimentReading, TurnMeta,
    };

    fn guardrails() -> GuardrailDecision {
        GuardrailDecision {
            allow_vulnerable_tone: false,
            allow_high_intensity_joy: true,
            allow_playful_conflict: false,
            max_response_length_factor: 0.5,
        }
    }

    #[test]
    fn test_bare_context_still_has_guardrails() {
        let ctx = TurnContext::new(
            Identity::new("s", "h"),
            "hello",
            TurnMeta::for_platform(Platform::Desktop, "hello"),
        );
        let prompt = build_prompt(&ctx, &guardrails());
        assert!(prompt.contains("#emotional_guardrails allowVulnerableTone=false"));
        assert!(!prompt.contains("#host_mood"));
        assert_eq!(host_message(&prompt), Some("hello"));
    }

    #[test]
    fn test_full_context_tags() {
        let mut ctx = TurnContext::new(
            Identity::new("s", "h"),
            "  how was the concert?  ",
            TurnMeta::for_platform(Platform::Desktop, ""),
        );
        ctx.sentiment = Some(SentimentReading::neutral());
        ctx.emotional_snapshot = Some(EmotionalSnapshot::neutral(Utc::now()));
        ctx.memory_context = Some(MemoryContext {
            entries: vec![MemoryEntry {
                kind: MemoryKind::Conversation,
                trust_threshold: 0.0,
                summary: "Host loves live music".into(),
                timestamp: Utc::now(),
                weight: 0.5,
                tags: vec!["music".into()],
                thread_id: None,
            }],
            primary_topic: Some("music".into()),
        });
        let prompt = build_prompt(&ctx, &guardrails());
        assert!(prompt.contains("#host_mood valence=0.00 tension=0.00 warmth=0.50"));
        assert!(prompt.contains("#synth_mood dominant=neutral"));
        assert!(prompt.contains("- Host loves live music"));
        assert!(prompt.ends_with("Host: how was the concert?\n[Context: music]"));
        assert_eq!(host_message(&prompt), Some("how was the concert?"));
    }

    #[test]
    fn test_generation_budget_scaled() {
        let base = GenerationConfig::default();
        assert_eq!(generation_for(&base, &guardrails()).max_tokens, 150);
    }
}
