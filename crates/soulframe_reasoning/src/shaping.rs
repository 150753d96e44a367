//! Reply shaping: persona pass, then structural limits from the UX policy.
//!
//! Sentence boundaries are found by scanning for terminal punctuation
//! followed by whitespace or end of text. Truncation only ever drops whole
//! sentences. If the shaped text fails [`is_well_formed`] the pre-shaping text
//! is returned instead.

use futures_util::FutureExt;
use regex::Regex;
use soulframe_core::{PersonaFilter, TurnResult, UxPolicy};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

static RE_DEBUG_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\s*\[[^\]\n]{0,40}\])+\s*").unwrap());
static RE_BULLET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^[ \t]*[-*+•][ \t]+").unwrap());
static RE_NUMBERED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^[ \t]*\d+[.)][ \t]+").unwrap());
static RE_LIST_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</?(?:ul|ol|li)>").unwrap());
static RE_LINE_BREAKS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]*\n\s*").unwrap());
static RE_SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]{2,}").unwrap());
static RE_STRAY_PUNCT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[,;:]\s*[.!?,;:]").unwrap());
static RE_TRAILING_FRAGMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s[a-z]$").unwrap());

pub const APPROVAL_CUE: &str = " Want me to do that?";

const APPROVAL_CUES: &[&str] = &[
    "want me to",
    "should i",
    "would you like me to",
    "shall i",
    "can i",
    "okay?",
    "sound good?",
    "work?",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shaped {
    pub text: String,
    /// The structural pass produced a malformed reply and was undone.
    pub reverted: bool,
}

pub struct ResponsePostProcessor {
    persona: Option<Arc<dyn PersonaFilter>>,
    persona_deadline: Duration,
}

impl ResponsePostProcessor {
    pub fn new(persona: Option<Arc<dyn PersonaFilter>>, persona_deadline: Duration) -> Self {
        Self {
            persona,
            persona_deadline,
        }
    }

    pub async fn shape(&self, raw: &str, policy: &UxPolicy, result: &TurnResult) -> Shaped {
        let voiced = self.persona_pass(raw, result).await;
        shape_structure(&voiced, policy, result)
    }

    async fn persona_pass(&self, raw: &str, result: &TurnResult) -> String {
        let Some(persona) = &self.persona else {
            return raw.to_string();
        };
        let guarded = AssertUnwindSafe(persona.apply(raw, result)).catch_unwind();
        match tokio::time::timeout(self.persona_deadline, guarded).await {
            Ok(Ok(Ok(text))) if !text.trim().is_empty() => text,
            Ok(Ok(Ok(_))) => raw.to_string(),
            Ok(Ok(Err(e))) => {
                tracing::warn!("Persona pass failed, keeping raw reply: {:#}", e);
                raw.to_string()
            }
            Ok(Err(_)) => {
                tracing::warn!("Persona pass panicked, keeping raw reply");
                raw.to_string()
            }
            Err(_) => {
                tracing::warn!("Persona pass exceeded {:?}, keeping raw reply", self.persona_deadline);
                raw.to_string()
            }
        }
    }
}

/// Structural pass alone.
pub fn shape_structure(text: &str, policy: &UxPolicy, result: &TurnResult) -> Shaped {
    let before = text.trim().to_string();
    if policy.user_requested_longform || before.is_empty() {
        return Shaped {
            text: before,
            reverted: false,
        };
    }

    let pending = result.unexecuted_intents().next().is_some();

    let mut out = before.clone();
    if !policy.allow_bullets {
        out = remove_bullets(&out);
    }
    if !policy.allow_paragraphs {
        out = flatten_paragraphs(&out);
    }

    out = if pending {
        let end = first_sentence_end(&out);
        let remaining = policy.max_sentences.saturating_sub(1);
        let rest = match out[end..].trim() {
            rest if remaining == 0 || rest.is_empty() => "",
            rest => truncate_to_max_sentences(rest, remaining),
        };
        with_approval_cue(out[..end].trim(), rest)
    } else {
        truncate_to_max_sentences(&out, policy.max_sentences).to_string()
    };

    if out != before && !is_well_formed(&out) {
        tracing::warn!("Shaping produced a malformed reply, reverting: {:?}", out);
        return Shaped {
            text: before,
            reverted: true,
        };
    }
    Shaped {
        text: out,
        reverted: false,
    }
}

/// Strip leading debug tags like `[DEBUG]` or `[mood=joy]`.
pub fn clean_reply(raw: &str) -> String {
    RE_DEBUG_PREFIX.replace(raw, "").trim().to_string()
}

// ============================================================================
// Sentences
// ============================================================================

fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '…')
}

fn is_closer(c: char) -> bool {
    matches!(c, '"' | '\'' | ')' | ']' | '”' | '’' | '»')
}

/// Byte offsets just past every sentence boundary.
fn sentence_ends(text: &str) -> Vec<usize> {
    let mut ends = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if !is_terminal(c) {
            continue;
        }
        let mut end = i + c.len_utf8();
        while let Some(&(j, n)) = chars.peek() {
            if is_terminal(n) || is_closer(n) {
                end = j + n.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        match chars.peek() {
            None => ends.push(end),
            Some(&(_, n)) if n.is_whitespace() => ends.push(end),
            _ => {}
        }
    }
    ends
}

/// Sentences of `text`, trimmed. A trailing fragment without terminal
/// punctuation counts as a sentence.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    for end in sentence_ends(text) {
        let s = text[start..end].trim();
        if !s.is_empty() {
            out.push(s);
        }
        start = end;
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

/// Keep the first `max` sentences. Whatever is kept is a prefix of `text`.
pub fn truncate_to_max_sentences(text: &str, max: usize) -> &str {
    if max == 0 {
        return text.trim();
    }
    let ends = sentence_ends(text);
    match ends.get(max - 1) {
        Some(&end) if text[end..].trim().is_empty() => text.trim(),
        Some(&end) => text[..end].trim(),
        None => text.trim(),
    }
}

fn first_sentence_end(text: &str) -> usize {
    sentence_ends(text).first().copied().unwrap_or(text.len())
}

// ============================================================================
// Structure
// ============================================================================

pub fn flatten_paragraphs(text: &str) -> String {
    RE_LINE_BREAKS.replace_all(text, " ").trim().to_string()
}

pub fn remove_bullets(text: &str) -> String {
    let text = RE_LIST_TAG.replace_all(text, "");
    let text = RE_BULLET.replace_all(&text, "");
    let text = RE_NUMBERED.replace_all(&text, "");
    RE_SPACES.replace_all(&text, " ").trim().to_string()
}

pub fn has_approval_cue(text: &str) -> bool {
    let lower = text.to_lowercase();
    APPROVAL_CUES.iter().any(|cue| lower.contains(cue))
}

/// Join the kept first sentence and rest, placing the approval cue right
/// after the first sentence unless the kept text already asks.
fn with_approval_cue(first: &str, rest: &str) -> String {
    let mut out = first.to_string();
    if !has_approval_cue(first) && !has_approval_cue(rest) {
        if !out.ends_with(|c: char| is_terminal(c) || is_closer(c)) {
            out.push('.');
        }
        out.push_str(APPROVAL_CUE);
    }
    if !rest.is_empty() {
        out.push(' ');
        out.push_str(rest);
    }
    out
}

// ============================================================================
// Grammar check
// ============================================================================

/// Whether `text` reads as complete sentences: no orphaned continuation at
/// the start, no stray punctuation, no empty sentence, no dangling letter.
pub fn is_well_formed(text: &str) -> bool {
    let text = text.trim();
    let Some(first) = text.chars().next() else {
        return false;
    };
    if first.is_lowercase() || matches!(first, ',' | ';' | ':') {
        return false;
    }
    if text.chars().take(2).filter(|c| is_terminal(*c)).count() == 2 {
        return false;
    }
    if RE_STRAY_PUNCT.is_match(text) || RE_TRAILING_FRAGMENT.is_match(text) {
        return false;
    }
    if has_double_period(text) {
        return false;
    }
    split_sentences(text)
        .iter()
        .all(|s| s.chars().any(char::is_alphanumeric))
}

/// A run of exactly two periods. Ellipses (three or more) are fine.
fn has_double_period(text: &str) -> bool {
    let mut run = 0;
    for c in text.chars().chain(std::iter::once(' ')) {
        if c == '.' {
            run += 1;
        } else {
            if run == 2 {
                return true;
            }
            run = 0;
        }
    }
    false
}
