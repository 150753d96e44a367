//! Maps responder failures onto gentle, in-character fallback lines.
//!
//! No failure ever reaches the host as raw error text.

use rand::seq::SliceRandom;
use soulframe_core::config::FallbackPhrases;
use soulframe_core::{OutcomeKind, ResponderError};

const LAST_RESORT: &str = "I'm here. Give me a moment.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Timeout,
    ProviderError,
    EmptyReply,
    /// Primary and local engines both failed.
    BothFailure,
}

impl FailureClass {
    pub fn of(err: &ResponderError) -> Self {
        match err {
            ResponderError::Timeout { .. } => FailureClass::Timeout,
            ResponderError::Provider { .. } | ResponderError::Panicked { .. } => {
                FailureClass::ProviderError
            }
            ResponderError::Empty { .. } => FailureClass::EmptyReply,
        }
    }
}

/// Outcome reported for a reply that had to be softened.
pub fn outcome_for(err: &ResponderError) -> OutcomeKind {
    match err {
        ResponderError::Timeout { .. } => OutcomeKind::Timeout,
        ResponderError::Provider { .. } | ResponderError::Empty { .. } => {
            OutcomeKind::FallbackMessage
        }
        ResponderError::Panicked { .. } => OutcomeKind::Error,
    }
}

#[derive(Debug, Clone)]
pub struct FallbackSoftener {
    phrases: FallbackPhrases,
}

impl FallbackSoftener {
    pub fn new(phrases: FallbackPhrases) -> Self {
        Self { phrases }
    }

    fn pool(&self, class: FailureClass) -> &[String] {
        match class {
            FailureClass::Timeout => &self.phrases.timeout,
            FailureClass::ProviderError => &self.phrases.provider_error,
            FailureClass::EmptyReply => &self.phrases.empty_reply,
            FailureClass::BothFailure => &self.phrases.both_failure,
        }
    }

    /// A configured line for the class. Never empty.
    pub fn soften(&self, class: FailureClass) -> String {
        self.pool(class)
            .iter()
            .filter(|p| !p.trim().is_empty())
            .collect::<Vec<_>>()
            .choose(&mut rand::thread_rng())
            .map(|p| p.to_string())
            .unwrap_or_else(|| LAST_RESORT.to_string())
    }

    /// Whether `text` is one of the configured lines for `class`.
    pub fn is_configured(&self, class: FailureClass, text: &str) -> bool {
        self.pool(class).iter().any(|p| p == text)
    }
}

impl Default for FallbackSoftener {
    fn default() -> Self {
        Self::new(FallbackPhrases::default())
    }
}
