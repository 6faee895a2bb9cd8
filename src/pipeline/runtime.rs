//! Job runtime
//!
//! Executes analysis requests with job-level retries, a wall-clock bound per attempt
//! and a per-owner concurrency key. A retry re-runs the whole pipeline from scratch;
//! model-level retries happen inside the executor.

use super::error::PipelineError;
use super::orchestrator::{AnalysisOrchestrator, AnalysisOutcome};
use super::job::AnalysisRequest;
use crate::util::RetryPolicy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{info, warn};

pub struct JobRuntime {
    orchestrator: Arc<AnalysisOrchestrator>,
    retry: RetryPolicy,
    job_timeout: Duration,
    owner_concurrency: usize,
    owners: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl JobRuntime {
    pub fn new(orchestrator: Arc<AnalysisOrchestrator>) -> Self {
        Self {
            orchestrator,
            retry: RetryPolicy::new(3).with_initial_backoff(Duration::from_secs(10)),
            job_timeout: Duration::from_secs(1800),
            owner_concurrency: 2,
            owners: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn with_owner_concurrency(mut self, limit: usize) -> Self {
        self.owner_concurrency = limit.max(1);
        self
    }

    /// Concurrency slot shared by every job of `owner_id`
    pub fn owner_slot(&self, owner_id: &str) -> Arc<Semaphore> {
        let mut owners = self
            .owners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        owners
            .entry(owner_id.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.owner_concurrency)))
            .clone()
    }

    /// Runs `request` to a terminal state, retrying retryable failures with backoff
    pub async fn submit(&self, request: &AnalysisRequest) -> Result<AnalysisOutcome, PipelineError> {
        let slot = self.owner_slot(&request.owner_id);
        let _permit = slot
            .acquire_owned()
            .await
            .map_err(|e| PipelineError::Internal(anyhow::anyhow!("owner queue closed: {}", e)))?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            info!(
                analysis_id = %request.analysis_id,
                attempt,
                max_attempts = self.retry.attempts(),
                "Starting job attempt"
            );

            let result = match tokio::time::timeout(self.job_timeout, self.orchestrator.run(request)).await {
                Ok(result) => result,
                Err(_) => {
                    // The run was dropped mid-stage, which also released its snapshot
                    self.settle_timeout(request, PipelineError::TimedOut(self.job_timeout))
                        .await
                }
            };

            match result {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_retryable() && self.retry.should_retry(attempt) => {
                    let backoff = self.retry.backoff_for(attempt);
                    warn!(
                        analysis_id = %request.analysis_id,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "Job attempt failed, retrying: {}",
                        e
                    );
                    if !backoff.is_zero() {
                        tokio::time::sleep(backoff).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Decides a timed out attempt from the stored job. The DONE write may have landed
    /// just before the deadline, in which case the run succeeded and stays DONE.
    async fn settle_timeout(
        &self,
        request: &AnalysisRequest,
        err: PipelineError,
    ) -> Result<AnalysisOutcome, PipelineError> {
        let store = &self.orchestrator.context().store;
        match store.get_job(&request.analysis_id).await {
            Ok(job) => {
                if let Some(outcome) = AnalysisOutcome::from_committed(&job) {
                    warn!(
                        analysis_id = %request.analysis_id,
                        "Job committed before its timeout fired, keeping the result"
                    );
                    return Ok(outcome);
                }
                self.orchestrator
                    .record_failure(&job, job.progress, &err)
                    .await;
            }
            Err(e) => warn!(
                analysis_id = %request.analysis_id,
                "Could not load timed out job: {}",
                e
            ),
        }
        Err(err)
    }
}
