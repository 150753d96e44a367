//! Repetition detection over recent replies.
//!
//! A loop is a topic recurring `topic_threshold` times inside the recency
//! window, or a reply whose character-bigram similarity to a recent reply
//! reaches `similarity_threshold`. On a loop the detector hands back an
//! interruption phrase with any self-referential narration stripped.

use regex::Regex;
use soulframe_core::config::LoopDetectionConfig;
use std::collections::{HashSet, VecDeque};
use std::sync::LazyLock;
use std::time::Duration;
use tokio::time::Instant;

use crate::shaping::split_sentences;

static RE_META_NARRATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(i keep (repeating|saying|coming back)|repeating myself|going (around )?in circles|(said|mentioned) (that|this) (already|before)|stuck (in|on) a loop|echo(ing)?)\b",
    )
    .unwrap()
});

#[derive(Debug, Clone)]
struct Seen {
    text: String,
    topic: Option<String>,
    at: Instant,
}

#[derive(Debug)]
pub struct LoopInterruptionDetector {
    config: LoopDetectionConfig,
    phrases: Vec<String>,
    history: VecDeque<Seen>,
    next_phrase: usize,
}

impl LoopInterruptionDetector {
    pub fn new(config: LoopDetectionConfig, phrases: Vec<String>) -> Self {
        Self {
            history: VecDeque::with_capacity(config.history_capacity),
            config,
            phrases,
            next_phrase: 0,
        }
    }

    fn window(&self) -> Duration {
        Duration::from_secs(self.config.window_secs)
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Drop replies older than the window; true when nothing is left.
    pub fn expire_at(&mut self, now: Instant) -> bool {
        self.prune(now);
        self.history.is_empty()
    }

    pub fn add_response(&mut self, text: &str, topic: Option<&str>) {
        self.add_response_at(text, topic, Instant::now());
    }

    pub fn add_response_at(&mut self, text: &str, topic: Option<&str>, now: Instant) {
        self.prune(now);
        if self.config.history_capacity == 0 {
            return;
        }
        while self.history.len() >= self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(Seen {
            text: text.to_string(),
            topic: topic.map(str::to_string),
            at: now,
        });
    }

    pub fn check_for_loop(&mut self, text: &str, topic: Option<&str>) -> Option<String> {
        self.check_for_loop_at(text, topic, Instant::now())
    }

    /// Interruption phrase if `text`/`topic` would repeat recent history.
    pub fn check_for_loop_at(&mut self, text: &str, topic: Option<&str>, now: Instant) -> Option<String> {
        self.prune(now);

        let topic_loop = topic.is_some_and(|t| {
            let prior = self
                .history
                .iter()
                .filter(|s| s.topic.as_deref() == Some(t))
                .count();
            prior + 1 >= self.config.topic_threshold.max(1)
        });
        let echo_loop = self
            .history
            .iter()
            .any(|s| similarity(&s.text, text) >= self.config.similarity_threshold);

        if !(topic_loop || echo_loop) {
            return None;
        }
        tracing::info!(
            "Loop detected (topic={:?}, topic_loop={}, echo_loop={})",
            topic,
            topic_loop,
            echo_loop
        );
        self.next_interruption()
    }

    fn prune(&mut self, now: Instant) {
        let window = self.window();
        while let Some(front) = self.history.front() {
            if now.saturating_duration_since(front.at) > window {
                self.history.pop_front();
            } else {
                break;
            }
        }
    }

    /// Next usable phrase in rotation, filtered.
    fn next_interruption(&mut self) -> Option<String> {
        let n = self.phrases.len();
        for _ in 0..n {
            let phrase = &self.phrases[self.next_phrase % n];
            self.next_phrase = (self.next_phrase + 1) % n;
            let filtered = suppress_meta_narration(phrase);
            if filtered.chars().count() >= self.config.min_phrase_chars {
                return Some(filtered);
            }
            tracing::debug!("Interruption phrase too short after filtering: {:?}", filtered);
        }
        None
    }
}

/// Drop every sentence that talks about the synth repeating itself.
pub fn suppress_meta_narration(text: &str) -> String {
    split_sentences(text)
        .into_iter()
        .filter(|s| !RE_META_NARRATION.is_match(s))
        .collect::<Vec<_>>()
        .join(" ")
}

fn bigrams(text: &str) -> HashSet<(char, char)> {
    let normalized: Vec<char> = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .collect();
    normalized.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Jaccard similarity of character bigrams, in [0, 1].
pub fn similarity(a: &str, b: &str) -> f32 {
    let (x, y) = (bigrams(a), bigrams(b));
    if x.is_empty() && y.is_empty() {
        return if a.trim() == b.trim() { 1.0 } else { 0.0 };
    }
    let shared = x.intersection(&y).count() as f32;
    let union = x.union(&y).count() as f32;
    shared / union
}
