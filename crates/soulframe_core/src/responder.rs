use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ResponderError;
use crate::types::{OutcomeKind, ToolIntent};

/// Sampling parameters handed to a responder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub stop: Vec<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.65,
            top_p: 0.9,
            max_tokens: 300,
            stop: vec!["Host:".to_string(), "You:".to_string()],
        }
    }
}

impl GenerationConfig {
    /// Scale the token budget, never below a small floor.
    pub fn scaled(&self, factor: f32) -> Self {
        let scaled = (self.max_tokens as f32 * factor.clamp(0.0, 1.0)).round() as u32;
        Self {
            max_tokens: scaled.max(32).min(self.max_tokens.max(32)),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResponderReply {
    pub text: String,
    pub outcome_kind: OutcomeKind,
    pub engine_used: String,
    pub tool_intents: Vec<ToolIntent>,
}

impl ResponderReply {
    pub fn ok(text: impl Into<String>, engine: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            outcome_kind: OutcomeKind::Ok,
            engine_used: engine.into(),
            tool_intents: Vec::new(),
        }
    }
}

/// A language-model backend. Local and remote engines are interchangeable.
#[async_trait]
pub trait Responder: Send + Sync {
    fn name(&self) -> &str;

    async fn invoke(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<ResponderReply, ResponderError>;
}
