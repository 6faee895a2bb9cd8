//! Realtime channel trait and job events

use crate::pipeline::job::JobStatus;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("realtime channel unavailable: {0}")]
    Unavailable(String),

    #[error("failed to encode event payload: {0}")]
    Encoding(String),
}

/// Fire-and-forget publisher. Callers treat every error as non-fatal.
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    async fn publish(
        &self,
        channel: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), PublishError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobEventKind {
    Progress,
    Complete,
    Failed,
}

impl JobEventKind {
    pub fn event_name(self) -> &'static str {
        match self {
            JobEventKind::Progress => "analysis-progress",
            JobEventKind::Complete => "analysis-complete",
            JobEventKind::Failed => "analysis-failed",
        }
    }
}

/// Payload published for every status change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub analysis_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
}

impl JobEvent {
    pub fn to_payload(&self) -> Result<serde_json::Value, PublishError> {
        serde_json::to_value(self).map_err(|e| PublishError::Encoding(e.to_string()))
    }
}

/// Per-owner channel name
pub fn owner_channel(owner_id: &str) -> String {
    format!("user-{}", owner_id)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpChannel;

#[async_trait]
impl RealtimeChannel for NoOpChannel {
    async fn publish(
        &self,
        _channel: &str,
        _event: &str,
        _payload: serde_json::Value,
    ) -> Result<(), PublishError> {
        Ok(())
    }
}
