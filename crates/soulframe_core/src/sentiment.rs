//! Keyword-lexicon sentiment analysis of host messages.
//!
//! Pure: the same text and history always produce the same reading.

use crate::types::{SentimentReading, SentimentTrendPoint};

const POSITIVE: &[&str] = &[
    "happy", "glad", "great", "good", "love", "awesome", "thanks", "thank", "nice", "fun",
    "excited", "wonderful", "amazing", "yay", "haha", "lol", "cool", "proud", "😊", "❤️", "👍",
];

const NEGATIVE: &[&str] = &[
    "sad", "bad", "hate", "awful", "terrible", "tired", "angry", "upset", "lonely", "hurt",
    "worried", "scared", "annoyed", "sucks", "stupid", "cry", "crying", "😢", "😡", "💔",
];

const WARM: &[&str] = &[
    "love", "thanks", "thank", "miss", "dear", "friend", "hug", "together", "care", "sweet",
    "appreciate", "❤️",
];

const TENSE: &[&str] = &[
    "worried", "anxious", "scared", "stress", "stressed", "angry", "hate", "deadline", "panic",
    "afraid", "nervous", "urgent", "annoyed",
];

const INTENSE: &[&str] = &["very", "so", "really", "super", "extremely", "totally"];

const NEGATORS: &[&str] = &["not", "no", "never", "don't", "dont", "isn't", "can't", "cannot"];

/// Weight of the current message when blended with recent trend history.
const CURRENT_WEIGHT: f32 = 0.8;

#[derive(Debug, Clone, Copy, Default)]
pub struct SentimentAnalyzer;

impl SentimentAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Read `text`, nudged toward the mean of the recent `history`.
    pub fn analyze(&self, text: &str, history: &[SentimentTrendPoint]) -> SentimentReading {
        let raw = analyze_text(text);
        if history.is_empty() {
            return raw;
        }

        let n = history.len() as f32;
        let mean_valence = history.iter().map(|p| p.valence).sum::<f32>() / n;
        let mean_activation = history.iter().map(|p| p.activation).sum::<f32>() / n;

        SentimentReading {
            valence: CURRENT_WEIGHT * raw.valence + (1.0 - CURRENT_WEIGHT) * mean_valence,
            activation: CURRENT_WEIGHT * raw.activation + (1.0 - CURRENT_WEIGHT) * mean_activation,
            ..raw
        }
        .normalized()
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | '.' | '?' | ';' | ':' | '"'))
        .map(|t| t.trim_matches(|c: char| c == '!' || c == '(' || c == ')').to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Analyze a single message with no history.
pub fn analyze_text(text: &str) -> SentimentReading {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return SentimentReading::neutral();
    }

    let mut pos = 0.0f32;
    let mut neg = 0.0f32;
    let mut warm = 0.0f32;
    let mut tense = 0.0f32;
    let mut intense = 0.0f32;

    for (i, token) in tokens.iter().enumerate() {
        let negated = i > 0 && NEGATORS.contains(&tokens[i - 1].as_str());
        let t = token.as_str();
        if POSITIVE.contains(&t) {
            if negated {
                neg += 1.0;
            } else {
                pos += 1.0;
            }
        }
        if NEGATIVE.contains(&t) {
            if negated {
                pos += 0.5;
            } else {
                neg += 1.0;
            }
        }
        if WARM.contains(&t) && !negated {
            warm += 1.0;
        }
        if TENSE.contains(&t) && !negated {
            tense += 1.0;
        }
        if INTENSE.contains(&t) {
            intense += 1.0;
        }
    }

    let exclamations = text.matches('!').count() as f32;
    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    let shouting = letters.len() >= 4 && letters.iter().all(|c| c.is_uppercase());

    let valence = (pos - neg) / (pos + neg + 1.0);
    let activation =
        0.2 + 0.15 * (pos + neg) + 0.1 * intense + 0.1 * exclamations.min(3.0) + if shouting { 0.3 } else { 0.0 };
    let warmth = 0.5 + 0.2 * warm - 0.1 * tense;
    let tension = 0.25 * tense + if shouting { 0.3 } else { 0.0 } + 0.1 * neg;

    SentimentReading {
        valence,
        activation,
        warmth,
        tension,
    }
    .normalized()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_neutral_text() {
        let r = analyze_text("the train leaves at noon");
        assert!(r.valence.abs() < 0.01);
        assert!(r.tension.abs() < 0.01);
    }

    #[test]
    fn test_empty_text() {
        assert_eq!(analyze_text(""), SentimentReading::neutral());
    }

    #[test]
    fn test_positive_text() {
        let r = analyze_text("I'm so happy, thanks for the help!");
        assert!(r.valence > 0.0);
        assert!(r.warmth > 0.5);
    }

    #[test]
    fn test_negative_text() {
        let r = analyze_text("I feel sad and lonely today");
        assert!(r.valence < 0.0);
    }

    #[test]
    fn test_negation_flips() {
        let r = analyze_text("I am not happy");
        assert!(r.valence < 0.0);
    }

    #[test]
    fn test_tension_from_stress_words() {
        let calm = analyze_text("we can talk later");
        let tense = analyze_text("I'm stressed and worried about the deadline");
        assert!(tense.tension > calm.tension);
    }

    #[test]
    fn test_shouting_raises_activation() {
        let quiet = analyze_text("where are you");
        let loud = analyze_text("WHERE ARE YOU!!");
        assert!(loud.activation > quiet.activation);
    }

    #[test]
    fn test_lexicon_words_survive_tokenizing() {
        for word in POSITIVE.iter().chain(NEGATIVE).chain(WARM).chain(TENSE).chain(INTENSE) {
            assert_eq!(tokenize(word), vec![word.to_string()], "{}", word);
        }
    }

    #[test]
    fn test_exclamations_counted_once() {
        let spaced = analyze_text("wow !!");
        let attached = analyze_text("wow!!");
        assert_eq!(spaced.activation, attached.activation);
        assert!(attached.activation > analyze_text("wow").activation);
    }

    #[test]
    fn test_history_pulls_reading() {
        let analyzer = SentimentAnalyzer::new();
        let history = vec![
            SentimentTrendPoint {
                valence: -1.0,
                activation: 0.5,
                timestamp: Utc::now(),
            };
            3
        ];
        let alone = analyzer.analyze("the train leaves at noon", &[]);
        let blended = analyzer.analyze("the train leaves at noon", &history);
        assert!(blended.valence < alone.valence);
    }

    #[test]
    fn test_ranges_hold() {
        let r = analyze_text("HATE HATE HATE angry stressed panic!!!!!!");
        assert!((-1.0..=1.0).contains(&r.valence));
        assert!((0.0..=1.0).contains(&r.activation));
        assert!((0.0..=1.0).contains(&r.tension));
        assert!((0.0..=1.0).contains(&r.warmth));
    }
}
