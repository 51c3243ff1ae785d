//! Error types for providers, checkpoint stores, and the turn pipeline.

use crate::orchestrator::Stage;
use thiserror::Error;

/// Failures raised by health data and knowledge providers.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Provider backend error: {0}")]
    Backend(String),

    #[error("Malformed provider data: {0}")]
    Data(String),
}

impl From<sled::Error> for ProviderError {
    fn from(e: sled::Error) -> Self {
        ProviderError::Backend(e.to_string())
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(e: serde_json::Error) -> Self {
        ProviderError::Data(e.to_string())
    }
}

/// Failures raised by a [`crate::ConversationStore`].
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Checkpoint storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("Checkpoint codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Any failure inside a pipeline stage. Never surfaces past `process_message`.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{stage} provider call failed: {source}")]
    Provider {
        stage: Stage,
        #[source]
        source: ProviderError,
    },

    #[error("Response composition failed: {0}")]
    Compose(String),

    #[error("Checkpoint failed: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("{stage} failed: {message}")]
    Stage { stage: Stage, message: String },
}

impl PipelineError {
    /// Stage the error is attributed to, when known.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Provider { stage, .. } | PipelineError::Stage { stage, .. } => Some(*stage),
            PipelineError::Compose(_) => Some(Stage::ResponseComposition),
            PipelineError::Checkpoint(_) => None,
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
