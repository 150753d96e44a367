use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use soulframe_core::{GenerationConfig, Responder, ResponderError, ResponderReply, ToolIntent};
use std::env;
use std::time::Duration;

use crate::retry::{send_with_retry, RetryPolicy};

/// Chat-completions responder for OpenAI and compatible endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiResponder {
    name: String,
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    retry: RetryPolicy,
}

impl OpenAiResponder {
    pub fn new(name: &str, model: &str, base_url: Option<&str>) -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());
        let base_url = base_url
            .map(str::to_string)
            .or_else(|| env::var("OPENAI_BASE_URL").ok())
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            name: name.to_string(),
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .context("Failed to build HTTP client")?,
            api_key,
            base_url,
            model: model.to_string(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn payload(&self, prompt: &str, config: &GenerationConfig) -> Value {
        json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": config.temperature,
            "top_p": config.top_p,
            "max_tokens": config.max_tokens,
            "stop": config.stop,
        })
    }

    async fn complete(&self, prompt: &str, config: &GenerationConfig) -> Result<ResponderReply> {
        let url = format!("{}/chat/completions", self.base_url);
        let payload = self.payload(prompt, config);

        let response = send_with_retry(&self.retry, &self.name, || {
            let mut req = self.client.post(&url).json(&payload);
            if let Some(key) = &self.api_key {
                req = req.bearer_auth(key);
            }
            req.send()
        })
        .await?;

        let body: Value = response
            .json()
            .await
            .context("Failed to decode chat completion")?;
        Ok(parse_completion(&body, &self.name))
    }
}

/// Pull the reply text and any proposed tool calls out of a completion body.
pub fn parse_completion(body: &Value, engine: &str) -> ResponderReply {
    let message = &body["choices"][0]["message"];
    let text = message["content"].as_str().unwrap_or_default().trim().to_string();

    let mut reply = ResponderReply::ok(text, engine);
    if let Some(calls) = message["tool_calls"].as_array() {
        for call in calls {
            let func = &call["function"];
            let tool = func["name"].as_str().unwrap_or_default();
            if tool.is_empty() {
                continue;
            }
            let description = func["arguments"].as_str().unwrap_or("{}");
            reply.tool_intents.push(ToolIntent::new(tool, description));
        }
    }
    reply
}

#[async_trait]
impl Responder for OpenAiResponder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<ResponderReply, ResponderError> {
        let reply = self
            .complete(prompt, config)
            .await
            .map_err(|e| ResponderError::provider(&self.name, format!("{:#}", e)))?;
        if reply.text.is_empty() && reply.tool_intents.is_empty() {
            return Err(ResponderError::Empty {
                engine: self.name.clone(),
            });
        }
        Ok(reply)
    }
}
