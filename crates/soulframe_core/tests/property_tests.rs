//! Property-based tests for soulframe_core.
//!
//! Guardrail purity and monotonicity, and sentiment range invariants.

use proptest::prelude::*;
use soulframe_core::guardrails::{evaluate, GuardrailConfig, GuardrailInputs};
use soulframe_core::sentiment::analyze_text;
use soulframe_core::{EmotionalClimate, MoodPoint, PresenceMode, Weather};

// ============================================================================
// Strategies
// ============================================================================

fn arb_weather() -> impl Strategy<Value = Weather> {
    prop_oneof![
        Just(Weather::Clear),
        Just(Weather::Bright),
        Just(Weather::Overcast),
        Just(Weather::Unsettled),
        Just(Weather::Storm),
    ]
}

fn arb_climate() -> impl Strategy<Value = EmotionalClimate> {
    (arb_weather(), 0.0f32..=1.0, -1.0f32..=1.0, -1.0f32..=1.0).prop_map(
        |(weather, stability_score, short, mid)| EmotionalClimate {
            weather,
            stability_score,
            short_term: MoodPoint {
                valence: short,
                arousal: 0.5,
            },
            mid_term: MoodPoint {
                valence: mid,
                arousal: 0.5,
            },
        },
    )
}

fn arb_inputs() -> impl Strategy<Value = GuardrailInputs> {
    (
        proptest::option::weighted(0.9, arb_climate()),
        proptest::option::weighted(0.9, 0.0f32..=1.0),
        proptest::option::of(0.0f32..=1.0),
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(|(climate, trust, affection, presence, demo_mode, exhaustion_mode)| {
            GuardrailInputs {
                climate,
                trust,
                affection,
                presence: if presence { PresenceMode::On } else { PresenceMode::Off },
                demo_mode,
                exhaustion_mode,
            }
        })
}

// ============================================================================
// Guardrails
// ============================================================================

proptest! {
    #[test]
    fn guardrails_are_pure(inputs in arb_inputs()) {
        let cfg = GuardrailConfig::default();
        prop_assert_eq!(evaluate(&inputs, &cfg), evaluate(&inputs, &cfg));
    }

    #[test]
    fn lowering_trust_never_loosens(
        inputs in arb_inputs(),
        high in 0.0f32..=1.0,
        drop in 0.0f32..=1.0,
    ) {
        let cfg = GuardrailConfig::default();
        let low = (high - drop).max(0.0);
        let with_high = GuardrailInputs { trust: Some(high), ..inputs };
        let with_low = GuardrailInputs { trust: Some(low), ..inputs };
        let d_high = evaluate(&with_high, &cfg);
        let d_low = evaluate(&with_low, &cfg);
        prop_assert!(d_low.is_no_more_permissive_than(&d_high));
    }

    #[test]
    fn length_factor_stays_in_bounds(inputs in arb_inputs()) {
        let cfg = GuardrailConfig::default();
        let d = evaluate(&inputs, &cfg);
        prop_assert!(d.max_response_length_factor > 0.0);
        prop_assert!(d.max_response_length_factor <= 1.0);
    }

    #[test]
    fn storm_never_allows_vulnerable_tone(climate in arb_climate(), trust in 0.0f32..=1.0) {
        let inputs = GuardrailInputs {
            climate: Some(EmotionalClimate { weather: Weather::Storm, ..climate }),
            trust: Some(trust),
            affection: Some(1.0),
            presence: PresenceMode::Off,
            demo_mode: false,
            exhaustion_mode: false,
        };
        let d = evaluate(&inputs, &GuardrailConfig::default());
        prop_assert!(!d.allow_vulnerable_tone);
        prop_assert!(d.max_response_length_factor < 1.0);
    }
}

// ============================================================================
// Sentiment
// ============================================================================

proptest! {
    #[test]
    fn sentiment_channels_stay_normalized(text in ".{0,200}") {
        let r = analyze_text(&text);
        prop_assert!((-1.0..=1.0).contains(&r.valence));
        prop_assert!((0.0..=1.0).contains(&r.activation));
        prop_assert!((0.0..=1.0).contains(&r.warmth));
        prop_assert!((0.0..=1.0).contains(&r.tension));
    }

    #[test]
    fn sentiment_is_deterministic(text in "[a-zA-Z !?.,]{0,120}") {
        prop_assert_eq!(analyze_text(&text), analyze_text(&text));
    }
}
