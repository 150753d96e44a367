//! Mock responder: deterministic replies for tests and offline runs.

use async_trait::async_trait;
use soulframe_core::{GenerationConfig, Responder, ResponderError, ResponderReply, ToolIntent};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::prompt::host_message;

/// One scripted behaviour. Steps are consumed in order; once the script is
/// exhausted the responder echoes the host's message.
#[derive(Debug, Clone)]
pub enum MockStep {
    Reply(String),
    ReplyWithIntents(String, Vec<ToolIntent>),
    Fail(String),
    Empty,
    /// Sleep, then run the next step.
    Delay(Duration),
    /// Never resolve.
    Hang,
    Panic,
}

#[derive(Debug)]
pub struct MockResponder {
    name: String,
    script: Mutex<VecDeque<MockStep>>,
    calls: AtomicUsize,
}

impl MockResponder {
    pub fn new(name: &str) -> Self {
        Self::scripted(name, Vec::new())
    }

    pub fn scripted(name: &str, steps: Vec<MockStep>) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `invoke` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn echo(&self, prompt: &str) -> String {
        match host_message(prompt) {
            Some(msg) if !msg.trim().is_empty() => {
                format!("I hear you. You said: \"{}\".", msg.trim())
            }
            _ => "I'm here. Tell me more.".to_string(),
        }
    }
}

#[async_trait]
impl Responder for MockResponder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &self,
        prompt: &str,
        _config: &GenerationConfig,
    ) -> Result<ResponderReply, ResponderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        loop {
            let step = self.script.lock().await.pop_front();
            match step {
                None => return Ok(ResponderReply::ok(self.echo(prompt), &self.name)),
                Some(MockStep::Reply(text)) => return Ok(ResponderReply::ok(text, &self.name)),
                Some(MockStep::ReplyWithIntents(text, intents)) => {
                    let mut reply = ResponderReply::ok(text, &self.name);
                    reply.tool_intents = intents;
                    return Ok(reply);
                }
                Some(MockStep::Fail(reason)) => {
                    return Err(ResponderError::provider(&self.name, reason))
                }
                Some(MockStep::Empty) => return Ok(ResponderReply::ok("", &self.name)),
                Some(MockStep::Delay(d)) => tokio::time::sleep(d).await,
                Some(MockStep::Hang) => std::future::pending::<()>().await,
                Some(MockStep::Panic) => panic!("mock responder {} panicked", self.name),
            }
        }
    }
}
