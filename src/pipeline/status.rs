//! Status reporting: every stage transition is persisted with a log line and then
//! published on the owner's realtime channel. Progress never moves backwards, not even
//! when a failed job is retried, and a failed publish never fails the job.

use super::job::{AnalysisJob, JobStatus, Stage};
use crate::progress::{owner_channel, JobEvent, JobEventKind, RealtimeChannel};
use crate::store::{StatusUpdate, Store, StoreError};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

pub struct StatusReporter {
    store: Arc<dyn Store>,
    channel: Arc<dyn RealtimeChannel>,
    job_id: String,
    channel_name: String,
    progress: u8,
}

/// Transcript line, `[HH:MM:SS] message`
pub fn log_line(message: &str) -> String {
    format!("[{}] {}", Utc::now().format("%H:%M:%S"), message)
}

impl StatusReporter {
    /// Starts from the job's persisted progress, so a retried run resumes at the
    /// floor its failed predecessor reached
    pub fn new(store: Arc<dyn Store>, channel: Arc<dyn RealtimeChannel>, job: &AnalysisJob) -> Self {
        Self {
            store,
            channel,
            job_id: job.id.clone(),
            channel_name: owner_channel(&job.owner_id),
            progress: job.progress,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Highest progress reported for this job
    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// Enters `stage`: persists PENDING with the stage's progress, then publishes
    pub async fn advance(&mut self, stage: Stage, message: &str) -> Result<(), StoreError> {
        self.progress = self.progress.max(stage.progress());
        info!(
            analysis_id = %self.job_id,
            stage = stage.name(),
            progress = self.progress,
            "{}",
            message
        );
        self.write(message).await
    }

    /// Appends a transcript line without moving progress
    pub async fn note(&mut self, message: &str) -> Result<(), StoreError> {
        self.write(message).await
    }

    async fn write(&self, message: &str) -> Result<(), StoreError> {
        let update = StatusUpdate {
            status: JobStatus::Pending,
            progress: self.progress,
            message: message.to_string(),
            log_line: log_line(message),
        };
        self.store.update_status(&self.job_id, &update).await?;
        self.publish(JobEventKind::Progress, JobStatus::Pending, message)
            .await;
        Ok(())
    }

    /// Records that the terminal DONE write happened; progress becomes 100
    pub async fn completed(&mut self, message: &str) {
        self.progress = 100;
        self.publish(JobEventKind::Complete, JobStatus::Done, message)
            .await;
    }

    /// Best-effort publish of the current state
    pub async fn publish(&self, kind: JobEventKind, status: JobStatus, message: &str) {
        let event = JobEvent {
            analysis_id: self.job_id.clone(),
            status,
            progress: self.progress,
            message: message.to_string(),
        };
        let result = match event.to_payload() {
            Ok(payload) => {
                self.channel
                    .publish(&self.channel_name, kind.event_name(), payload)
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(
                analysis_id = %self.job_id,
                event = kind.event_name(),
                "Realtime publish failed: {}",
                e
            );
        }
    }
}
