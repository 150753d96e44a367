use serde::{Deserialize, Serialize};

use crate::types::Platform;

/// Structural limits the post-processor enforces on a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UxPolicy {
    pub max_sentences: usize,
    pub allow_paragraphs: bool,
    pub allow_bullets: bool,
    /// Host explicitly asked for a long answer; structural shaping is skipped.
    pub user_requested_longform: bool,
}

const LONGFORM_CUES: &[&str] = &[
    "explain in detail",
    "in detail",
    "step by step",
    "step-by-step",
    "walk me through",
    "tell me everything",
    "long version",
    "elaborate",
    "full explanation",
];

impl UxPolicy {
    pub fn for_platform(platform: Platform, message: &str) -> Self {
        let user_requested_longform = requests_longform(message);
        match platform {
            Platform::Desktop => Self {
                max_sentences: 6,
                allow_paragraphs: true,
                allow_bullets: true,
                user_requested_longform,
            },
            Platform::Mobile => Self {
                max_sentences: 2,
                allow_paragraphs: false,
                allow_bullets: false,
                user_requested_longform,
            },
        }
    }
}

impl Default for UxPolicy {
    fn default() -> Self {
        Self::for_platform(Platform::Desktop, "")
    }
}

pub fn requests_longform(message: &str) -> bool {
    let lower = message.to_lowercase();
    LONGFORM_CUES.iter().any(|cue| lower.contains(cue))
}
