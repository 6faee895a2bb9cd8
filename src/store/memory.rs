//! In-process store for tests and offline runs

use super::{
    Document, JobCompletion, Notification, Repository, StatusUpdate, Store, StoreError,
};
use crate::pipeline::job::{AnalysisJob, DocType, JobStatus};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct State {
    jobs: HashMap<String, AnalysisJob>,
    repositories: HashMap<String, Repository>,
    tokens: HashMap<String, String>,
    documents: BTreeMap<(String, String, DocType), Document>,
    notifications: Vec<Notification>,
    progress_history: HashMap<String, Vec<u8>>,
    document_writes: usize,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves plain data behind; keep using it
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every progress value persisted for `job_id`, in order
    pub fn progress_history(&self, job_id: &str) -> Vec<u8> {
        self.lock()
            .progress_history
            .get(job_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of document upserts performed so far
    pub fn document_writes(&self) -> usize {
        self.lock().document_writes
    }

    fn job_mut<'a>(state: &'a mut State, job_id: &str) -> Result<&'a mut AnalysisJob, StoreError> {
        state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::not_found("analysis", job_id))
    }

    fn put_document(state: &mut State, document: &Document) {
        let key = (
            document.repo_id.clone(),
            document.version.clone(),
            document.doc_type,
        );
        state.documents.insert(key, document.clone());
        state.document_writes += 1;
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_job(&self, job: &AnalysisJob) -> Result<(), StoreError> {
        let mut state = self.lock();
        state
            .progress_history
            .insert(job.id.clone(), vec![job.progress]);
        state.jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get_job(&self, id: &str) -> Result<AnalysisJob, StoreError> {
        self.lock()
            .jobs
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("analysis", id))
    }

    async fn upsert_repository(&self, repo: &Repository) -> Result<(), StoreError> {
        self.lock()
            .repositories
            .insert(repo.id.clone(), repo.clone());
        Ok(())
    }

    async fn repository(&self, repo_id: &str) -> Result<Repository, StoreError> {
        self.lock()
            .repositories
            .get(repo_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("repository", repo_id))
    }

    async fn set_access_token(&self, owner_id: &str, token: &str) -> Result<(), StoreError> {
        self.lock()
            .tokens
            .insert(owner_id.to_string(), token.to_string());
        Ok(())
    }

    async fn access_token(&self, owner_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock().tokens.get(owner_id).cloned())
    }

    async fn set_commit(&self, job_id: &str, commit_sha: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        let job = Self::job_mut(&mut state, job_id)?;
        job.commit_sha = Some(commit_sha.to_string());
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn update_status(&self, job_id: &str, update: &StatusUpdate) -> Result<(), StoreError> {
        let mut state = self.lock();
        let job = Self::job_mut(&mut state, job_id)?;
        if job.status != update.status && !job.status.can_transition_to(update.status) {
            return Err(StoreError::InvalidTransition {
                from: job.status,
                to: update.status,
            });
        }
        job.status = update.status;
        job.progress = update.progress;
        job.message = update.message.clone();
        job.logs.push(update.log_line.clone());
        job.updated_at = Utc::now();
        state
            .progress_history
            .entry(job_id.to_string())
            .or_default()
            .push(update.progress);
        Ok(())
    }

    async fn latest_completed(
        &self,
        repo_id: &str,
        excluding_job: &str,
    ) -> Result<Option<AnalysisJob>, StoreError> {
        Ok(self
            .lock()
            .jobs
            .values()
            .filter(|j| j.repo_id == repo_id && j.id != excluding_job && j.status == JobStatus::Done)
            .max_by_key(|j| j.updated_at)
            .cloned())
    }

    async fn complete_job(&self, job_id: &str, completion: &JobCompletion) -> Result<(), StoreError> {
        let mut state = self.lock();
        let job = Self::job_mut(&mut state, job_id)?;
        if job.status == JobStatus::Done {
            return Err(StoreError::AlreadyCompleted(job_id.to_string()));
        }
        if !job.status.can_transition_to(JobStatus::Done) {
            return Err(StoreError::InvalidTransition {
                from: job.status,
                to: JobStatus::Done,
            });
        }

        job.status = JobStatus::Done;
        job.progress = 100;
        job.message = completion.message.clone();
        job.logs.push(completion.log_line.clone());
        job.commit_sha = Some(completion.commit_sha.clone());
        job.scores = Some(completion.scores.clone());
        job.result_json = Some(completion.result_json.clone());
        job.metrics_json = Some(completion.metrics_json.clone());
        job.error = None;
        job.updated_at = Utc::now();

        state
            .progress_history
            .entry(job_id.to_string())
            .or_default()
            .push(100);
        for document in &completion.documents {
            Self::put_document(&mut state, document);
        }
        state.notifications.push(completion.notification.clone());
        Ok(())
    }

    async fn fail_job(&self, job_id: &str, error: &str, log_line: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        let job = Self::job_mut(&mut state, job_id)?;
        if !job.status.can_transition_to(JobStatus::Failed) {
            return Err(StoreError::InvalidTransition {
                from: job.status,
                to: JobStatus::Failed,
            });
        }
        job.status = JobStatus::Failed;
        job.message = "Analysis failed".to_string();
        job.error = Some(error.to_string());
        job.logs.push(log_line.to_string());
        job.updated_at = Utc::now();
        let progress = job.progress;
        state
            .progress_history
            .entry(job_id.to_string())
            .or_default()
            .push(progress);
        Ok(())
    }

    async fn upsert_document(&self, document: &Document) -> Result<(), StoreError> {
        Self::put_document(&mut self.lock(), document);
        Ok(())
    }

    async fn documents(&self, repo_id: &str) -> Result<Vec<Document>, StoreError> {
        Ok(self
            .lock()
            .documents
            .values()
            .filter(|d| d.repo_id == repo_id)
            .cloned()
            .collect())
    }

    async fn notifications(&self, owner_id: &str) -> Result<Vec<Notification>, StoreError> {
        Ok(self
            .lock()
            .notifications
            .iter()
            .filter(|n| n.owner_id == owner_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Scores;
    use serde_json::json;

    fn completion() -> JobCompletion {
        JobCompletion {
            commit_sha: "abcdef123".into(),
            scores: Scores::default(),
            result_json: json!({}),
            metrics_json: json!({}),
            documents: vec![Document::new("r-1", "abcdef1", DocType::Readme, "# Hi")],
            notification: Notification::new("u-1", "a-1", "Analysis complete", "done"),
            message: "Analysis complete".into(),
            log_line: "[00:00:00] Analysis complete".into(),
        }
    }

    fn pending(progress: u8) -> StatusUpdate {
        StatusUpdate {
            status: JobStatus::Pending,
            progress,
            message: "working".into(),
            log_line: format!("step {}", progress),
        }
    }

    #[tokio::test]
    async fn test_status_updates_append_logs() {
        let store = MemoryStore::new();
        store.create_job(&AnalysisJob::new("a-1", "r-1", "u-1")).await.unwrap();

        store.update_status("a-1", &pending(5)).await.unwrap();
        store.update_status("a-1", &pending(20)).await.unwrap();

        let job = store.get_job("a-1").await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 20);
        assert_eq!(job.logs, vec!["step 5", "step 20"]);
        assert_eq!(store.progress_history("a-1"), vec![0, 5, 20]);
    }

    #[tokio::test]
    async fn test_completion_is_exactly_once() {
        let store = MemoryStore::new();
        store.create_job(&AnalysisJob::new("a-1", "r-1", "u-1")).await.unwrap();
        store.update_status("a-1", &pending(5)).await.unwrap();

        store.complete_job("a-1", &completion()).await.unwrap();
        let err = store.complete_job("a-1", &completion()).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyCompleted(_)));

        let err = store.update_status("a-1", &pending(50)).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));

        assert_eq!(store.documents("r-1").await.unwrap().len(), 1);
        assert_eq!(store.notifications("u-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_latest_completed_ignores_current_job() {
        let store = MemoryStore::new();
        store.create_job(&AnalysisJob::new("old", "r-1", "u-1")).await.unwrap();
        store.complete_job("old", &completion()).await.unwrap();
        store.create_job(&AnalysisJob::new("new", "r-1", "u-1")).await.unwrap();

        let latest = store.latest_completed("r-1", "new").await.unwrap().unwrap();
        assert_eq!(latest.id, "old");
        assert!(store.latest_completed("r-1", "old").await.unwrap().is_none());
        assert!(store.latest_completed("r-2", "new").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fail_then_retry_reentry() {
        let store = MemoryStore::new();
        store.create_job(&AnalysisJob::new("a-1", "r-1", "u-1")).await.unwrap();
        store.update_status("a-1", &pending(35)).await.unwrap();
        store.fail_job("a-1", "boom", "failed").await.unwrap();

        let job = store.get_job("a-1").await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("boom"));
        assert_eq!(job.progress, 35);

        store.update_status("a-1", &pending(5)).await.unwrap();
        assert_eq!(store.get_job("a-1").await.unwrap().status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_missing_entities() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.get_job("nope").await,
            Err(StoreError::NotFound { entity: "analysis", .. })
        ));
        assert!(store.repository("nope").await.is_err());
        assert_eq!(store.access_token("nobody").await.unwrap(), None);
    }
}
