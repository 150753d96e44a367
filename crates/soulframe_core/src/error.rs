use std::time::Duration;
use thiserror::Error;

/// Failure of a responder invocation. The only failure class a host ever sees,
/// and only as a softened fallback line.
#[derive(Debug, Error)]
pub enum ResponderError {
    #[error("responder {engine} timed out after {elapsed:?}")]
    Timeout { engine: String, elapsed: Duration },

    #[error("responder {engine} failed: {reason}")]
    Provider { engine: String, reason: String },

    #[error("responder {engine} returned an empty reply")]
    Empty { engine: String },

    #[error("responder {engine} panicked")]
    Panicked { engine: String },
}

impl ResponderError {
    pub fn provider(engine: impl Into<String>, err: impl std::fmt::Display) -> Self {
        ResponderError::Provider {
            engine: engine.into(),
            reason: err.to_string(),
        }
    }

    pub fn engine(&self) -> &str {
        match self {
            ResponderError::Timeout { engine, .. }
            | ResponderError::Provider { engine, .. }
            | ResponderError::Empty { engine }
            | ResponderError::Panicked { engine } => engine,
        }
    }
}

/// Failure of an optional enrichment stage. Always absorbed by the pipeline.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("stage {stage} exceeded its {deadline:?} deadline")]
    Deadline {
        stage: &'static str,
        deadline: Duration,
    },

    #[error("stage {stage} failed: {source}")]
    Failed {
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("stage {stage} panicked")]
    Panicked { stage: &'static str },

    #[error("stage {stage} is not registered")]
    Missing { stage: &'static str },
}

impl StageError {
    pub fn stage(&self) -> &'static str {
        match self {
            StageError::Deadline { stage, .. }
            | StageError::Failed { stage, .. }
            | StageError::Panicked { stage }
            | StageError::Missing { stage } => stage,
        }
    }
}
