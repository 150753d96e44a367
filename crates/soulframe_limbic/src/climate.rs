//! Emotional climate: slow aggregates over the rolling mood history.

use soulframe_core::config::ClimateConfig;
use soulframe_core::{EmotionalClimate, MoodPoint, MoodSample, Weather};

/// Exponential moving average over the newest `window` samples, oldest first.
fn ema(samples: &[MoodSample], window: usize) -> MoodPoint {
    let window = window.max(1);
    let start = samples.len().saturating_sub(window);
    let recent = &samples[start..];
    let Some(first) = recent.first() else {
        return MoodPoint::default();
    };

    let alpha = 2.0 / (recent.len() as f32 + 1.0);
    let mut point = MoodPoint {
        valence: first.valence,
        arousal: first.arousal,
    };
    for s in &recent[1..] {
        point.valence = alpha * s.valence + (1.0 - alpha) * point.valence;
        point.arousal = alpha * s.arousal + (1.0 - alpha) * point.arousal;
    }
    point
}

fn variance(values: &[f32]) -> f32 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n
}

pub fn weather_for(stability: f32, valence: f32, cfg: &ClimateConfig) -> Weather {
    if stability < cfg.unsettled_below {
        if valence < 0.0 {
            Weather::Storm
        } else {
            Weather::Unsettled
        }
    } else if valence >= cfg.bright_valence {
        Weather::Bright
    } else if valence <= cfg.overcast_valence {
        Weather::Overcast
    } else {
        Weather::Clear
    }
}

/// Recompute the climate from the full history (oldest first).
pub fn compute_climate(history: &[MoodSample], cfg: &ClimateConfig) -> EmotionalClimate {
    if history.is_empty() {
        return EmotionalClimate::default();
    }

    let short_term = ema(history, cfg.short_window);
    let mid_term = ema(history, cfg.mid_window);

    let start = history.len().saturating_sub(cfg.short_window.max(1));
    let short_valences: Vec<f32> = history[start..].iter().map(|s| s.valence).collect();
    let stability_score = (1.0 - variance(&short_valences)).clamp(0.0, 1.0);

    EmotionalClimate {
        weather: weather_for(stability_score, short_term.valence, cfg),
        stability_score,
        short_term,
        mid_term,
    }
}
