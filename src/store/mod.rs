//! Persistence collaborator
//!
//! The orchestrator is the single writer of its job row. Status updates append a log
//! line in the same write, and completion commits result, metrics, scores, documents
//! and the notification together.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::metrics::Scores;
use crate::pipeline::job::{AnalysisJob, DocType, JobStatus};
use crate::source::RepoCoordinates;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("analysis '{0}' is already completed")]
    AlreadyCompleted(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: &str) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub id: String,
    pub owner_id: String,
    pub coordinates: RepoCoordinates,
    pub default_branch: String,
}

/// Generated artifact, unique per (repository, version, type)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub repo_id: String,
    /// Short commit SHA the content was generated against
    pub version: String,
    pub doc_type: DocType,
    pub content: String,
    /// Machine-readable spec extracted from the body (API reference only)
    pub spec: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn new(
        repo_id: impl Into<String>,
        version: impl Into<String>,
        doc_type: DocType,
        content: impl Into<String>,
    ) -> Self {
        Self {
            repo_id: repo_id.into(),
            version: version.into(),
            doc_type,
            content: content.into(),
            spec: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_spec(mut self, spec: Option<String>) -> Self {
        self.spec = spec;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub owner_id: String,
    pub analysis_id: String,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        owner_id: impl Into<String>,
        analysis_id: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            analysis_id: analysis_id.into(),
            title: title.into(),
            body: body.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub log_line: String,
}

/// Everything written with the terminal DONE transition
#[derive(Debug, Clone, PartialEq)]
pub struct JobCompletion {
    pub commit_sha: String,
    pub scores: Scores,
    pub result_json: serde_json::Value,
    pub metrics_json: serde_json::Value,
    pub documents: Vec<Document>,
    pub notification: Notification,
    pub message: String,
    pub log_line: String,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn create_job(&self, job: &AnalysisJob) -> Result<(), StoreError>;

    async fn get_job(&self, id: &str) -> Result<AnalysisJob, StoreError>;

    async fn upsert_repository(&self, repo: &Repository) -> Result<(), StoreError>;

    async fn repository(&self, repo_id: &str) -> Result<Repository, StoreError>;

    async fn set_access_token(&self, owner_id: &str, token: &str) -> Result<(), StoreError>;

    async fn access_token(&self, owner_id: &str) -> Result<Option<String>, StoreError>;

    /// Records the commit a run is computed against
    async fn set_commit(&self, job_id: &str, commit_sha: &str) -> Result<(), StoreError>;

    /// Persists status, progress and message, appending `log_line` to the transcript
    async fn update_status(&self, job_id: &str, update: &StatusUpdate) -> Result<(), StoreError>;

    /// Most recent DONE analysis of `repo_id`, ignoring `excluding_job`
    async fn latest_completed(
        &self,
        repo_id: &str,
        excluding_job: &str,
    ) -> Result<Option<AnalysisJob>, StoreError>;

    /// Atomic DONE transition. Fails with `AlreadyCompleted` on a second call.
    async fn complete_job(&self, job_id: &str, completion: &JobCompletion) -> Result<(), StoreError>;

    async fn fail_job(&self, job_id: &str, error: &str, log_line: &str) -> Result<(), StoreError>;

    async fn upsert_document(&self, document: &Document) -> Result<(), StoreError>;

    async fn documents(&self, repo_id: &str) -> Result<Vec<Document>, StoreError>;

    async fn notifications(&self, owner_id: &str) -> Result<Vec<Notification>, StoreError>;
}
