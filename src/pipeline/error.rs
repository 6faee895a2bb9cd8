use crate::llm::ModelExhaustionError;
use crate::materializer::MaterializeError;
use crate::source::SourceError;
use crate::store::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Top-level failure of one pipeline run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("none of the {requested} selected files could be read")]
    NoValidFiles { requested: usize },

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    ModelExhausted(#[from] ModelExhaustionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("analysis timed out after {}s", .0.as_secs())]
    TimedOut(Duration),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<MaterializeError> for PipelineError {
    fn from(e: MaterializeError) -> Self {
        match e {
            MaterializeError::Source(source) => PipelineError::Source(source),
            MaterializeError::NoValidFiles { requested } => {
                PipelineError::NoValidFiles { requested }
            }
            other => PipelineError::Snapshot(other.to_string()),
        }
    }
}

impl PipelineError {
    /// Whether the job runtime should re-run the whole pipeline
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            PipelineError::InvalidInput(_)
                | PipelineError::NoValidFiles { .. }
                | PipelineError::TimedOut(_)
        )
    }

    /// Message persisted in the job's `error` field
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::InvalidInput(msg) => msg.clone(),
            PipelineError::NoValidFiles { requested } => format!(
                "None of the {} selected files could be read. Select at least one text file inside the repository.",
                requested
            ),
            PipelineError::Source(e) => e.user_message(),
            PipelineError::ModelExhausted(e) => format!(
                "The {} stage failed on every configured model ({} attempts).",
                e.stage,
                e.attempts.len()
            ),
            PipelineError::Store(e) => format!("Saving analysis state failed: {}", e),
            PipelineError::Snapshot(msg) => format!("Preparing the repository snapshot failed: {}", msg),
            PipelineError::TimedOut(limit) => format!(
                "The analysis did not finish within {} minutes and was abandoned.",
                (limit.as_secs() / 60).max(1)
            ),
            PipelineError::Internal(e) => format!("Unexpected error: {:#}", e),
        }
    }
}
