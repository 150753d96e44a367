//! Property-based tests for soulframe_reasoning.
//!
//! Sentence truncation, reply shaping and loop detection.

use proptest::prelude::*;
use soulframe_core::config::LoopDetectionConfig;
use soulframe_core::{OutcomeKind, Platform, TurnResult, UxPolicy};
use soulframe_reasoning::shaping::{shape_structure, split_sentences, truncate_to_max_sentences};
use soulframe_reasoning::{is_well_formed, LoopInterruptionDetector};
use std::time::Duration;
use tokio::time::Instant;

// ============================================================================
// Strategies
// ============================================================================

fn arb_sentence() -> impl Strategy<Value = String> {
    (
        prop::collection::vec("[a-z]{2,8}", 1..7),
        prop_oneof![Just('.'), Just('!'), Just('?')],
    )
        .prop_map(|(words, end)| {
            let mut s = words.join(" ");
            if let Some(first) = s.get_mut(0..1) {
                first.make_ascii_uppercase();
            }
            s.push(end);
            s
        })
}

fn arb_reply() -> impl Strategy<Value = String> {
    prop::collection::vec(arb_sentence(), 1..8).prop_map(|s| s.join(" "))
}

fn ok_result(text: &str) -> TurnResult {
    TurnResult::new(text, OutcomeKind::Ok, "mock")
}

fn topic_only(threshold: usize) -> LoopDetectionConfig {
    LoopDetectionConfig {
        topic_threshold: threshold,
        similarity_threshold: 1.1,
        ..Default::default()
    }
}

fn phrases() -> Vec<String> {
    vec!["Let's look at this from a new direction.".into()]
}

// ============================================================================
// Shaping
// ============================================================================

proptest! {
    #[test]
    fn prop_truncation_is_a_sentence_prefix(text in arb_reply(), max in 1usize..6) {
        let out = truncate_to_max_sentences(&text, max);
        prop_assert!(text.starts_with(out));
        prop_assert!(out.ends_with(['.', '!', '?']));
        let expected = split_sentences(&text).len().min(max);
        prop_assert_eq!(split_sentences(out).len(), expected);
    }

    #[test]
    fn prop_mobile_shaping_never_cuts_mid_word(text in arb_reply()) {
        let policy = UxPolicy::for_platform(Platform::Mobile, "hi");
        let shaped = shape_structure(&text, &policy, &ok_result(&text));
        prop_assert!(!shaped.reverted);
        prop_assert!(text.starts_with(&shaped.text));
        prop_assert!(shaped.text.ends_with(['.', '!', '?']));
        prop_assert!(split_sentences(&shaped.text).len() <= 2);
        prop_assert!(is_well_formed(&shaped.text));
    }

    #[test]
    fn prop_longform_is_untouched(text in arb_reply()) {
        let policy = UxPolicy::for_platform(Platform::Mobile, "explain in detail please");
        let shaped = shape_structure(&text, &policy, &ok_result(&text));
        prop_assert_eq!(shaped.text, text);
    }
}

#[test]
fn test_canonical_mobile_truncation() {
    let text = "Hello there. How are you? I am fine.";
    let policy = UxPolicy {
        max_sentences: 2,
        allow_paragraphs: false,
        allow_bullets: false,
        user_requested_longform: false,
    };
    let shaped = shape_structure(text, &policy, &ok_result(text));
    assert_eq!(shaped.text, "Hello there. How are you?");
}

// ============================================================================
// Loop detection
// ============================================================================

proptest! {
    #[test]
    fn prop_topic_loop_fires_at_threshold(threshold in 2usize..6) {
        let mut detector = LoopInterruptionDetector::new(topic_only(threshold), phrases());
        let t0 = Instant::now();
        for i in 0..threshold {
            let now = t0 + Duration::from_secs(i as u64);
            let text = format!("reply {}", i);
            let hit = detector.check_for_loop_at(&text, Some("work"), now);
            prop_assert_eq!(hit.is_some(), i + 1 >= threshold, "response {}", i);
            detector.add_response_at(&text, Some("work"), now);
        }
    }

    #[test]
    fn prop_topic_loop_resets_after_window(threshold in 2usize..6) {
        let config = topic_only(threshold);
        let window = Duration::from_secs(config.window_secs);
        let mut detector = LoopInterruptionDetector::new(config, phrases());
        let t0 = Instant::now();
        for i in 0..threshold - 1 {
            detector.add_response_at(&format!("reply {}", i), Some("work"), t0);
        }
        let later = t0 + window + Duration::from_secs(1);
        prop_assert!(detector.check_for_loop_at("fresh", Some("work"), later).is_none());
        prop_assert!(detector.is_empty());
    }

    #[test]
    fn prop_echo_detected_on_repeat(text in "[A-Za-z ]{4,60}") {
        prop_assume!(text.trim().len() >= 2);
        let mut detector = LoopInterruptionDetector::new(LoopDetectionConfig::default(), phrases());
        let now = Instant::now();
        prop_assert!(detector.check_for_loop_at(&text, None, now).is_none());
        detector.add_response_at(&text, None, now);
        prop_assert!(detector.check_for_loop_at(&text, None, now).is_some());
    }
}
