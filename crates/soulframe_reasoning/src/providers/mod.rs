pub mod mock;
pub mod openai;

pub use mock::{MockResponder, MockStep};
pub use openai::OpenAiResponder;

use anyhow::Result;
use soulframe_core::config::ResponderConfig;
use soulframe_core::Responder;
use std::sync::Arc;

/// Build the primary responder named by `config.provider`.
pub fn primary_from_config(config: &ResponderConfig) -> Result<Arc<dyn Responder>> {
    match config.provider.as_str() {
        "mock" => Ok(Arc::new(MockResponder::new("mock"))),
        "openai" => Ok(Arc::new(OpenAiResponder::new(
            "openai",
            &config.model,
            config.base_url.as_deref(),
        )?)),
        other => anyhow::bail!("unknown responder provider: {}", other),
    }
}

/// Build the optional local fallback responder (an OpenAI-compatible
/// endpoint such as a local inference server).
pub fn local_from_config(config: &ResponderConfig) -> Result<Option<Arc<dyn Responder>>> {
    let Some(model) = config.local_model.as_deref() else {
        return Ok(None);
    };
    let base_url = config
        .local_base_url
        .as_deref()
        .unwrap_or("http://localhost:11434/v1");
    let responder = OpenAiResponder::new("local", model, Some(base_url))?;
    Ok(Some(Arc::new(responder)))
}
