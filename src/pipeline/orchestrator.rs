use super::context::PipelineContext;
use super::error::PipelineError;
use super::job::{short_sha, AnalysisJob, AnalysisRequest, DocType, JobStatus, Stage};
use super::persist::{self, AnalysisResult};
use super::phases::{analyze, documents, map, sentinel};
use super::status::{log_line, StatusReporter};
use crate::materializer::Materializer;
use crate::metrics::{bus_factor, code_metrics, compute_scores, AuditCounts, MetricsReport};
use crate::progress::{owner_channel, JobEvent, JobEventKind};
use crate::store::Repository;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// How a run reached DONE
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Completed {
        commit_sha: String,
        documents: Vec<DocType>,
        failed_documents: Vec<DocType>,
    },
    /// Commit unchanged since `previous_analysis`; nothing was recomputed
    Skipped {
        commit_sha: String,
        previous_analysis: String,
    },
}

impl AnalysisOutcome {
    /// Rebuilds the outcome of a run whose DONE write already landed, from the stored
    /// job alone. `None` unless the job is DONE.
    pub fn from_committed(job: &AnalysisJob) -> Option<Self> {
        if job.status != JobStatus::Done {
            return None;
        }
        let commit_sha = job.commit_sha.clone()?;
        let result = job.result_json.as_ref();

        let skipped = result
            .and_then(|v| v.get("skipped"))
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        if skipped {
            let previous_analysis = result
                .and_then(|v| v.get("reusedAnalysisId"))
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string();
            return Some(AnalysisOutcome::Skipped {
                commit_sha,
                previous_analysis,
            });
        }

        Some(AnalysisOutcome::Completed {
            commit_sha,
            documents: stored_doc_types(result, "documents", "type"),
            failed_documents: stored_doc_types(result, "documentFailures", "docType"),
        })
    }
}

fn stored_doc_types(result: Option<&serde_json::Value>, list: &str, key: &str) -> Vec<DocType> {
    result
        .and_then(|v| v.get(list))
        .and_then(serde_json::Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get(key))
                .filter_map(|t| serde_json::from_value(t.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

pub struct AnalysisOrchestrator {
    ctx: Arc<PipelineContext>,
}

impl AnalysisOrchestrator {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Runs the whole stage sequence for one request. Any failure is recorded on the
    /// job (FAILED + realtime event) and then returned to the caller.
    pub async fn run(&self, request: &AnalysisRequest) -> Result<AnalysisOutcome, PipelineError> {
        let job = self.ctx.store.get_job(&request.analysis_id).await?;
        if job.status == JobStatus::Done {
            return Err(PipelineError::InvalidInput(format!(
                "analysis '{}' is already complete",
                job.id
            )));
        }

        let start = Instant::now();
        info!(analysis_id = %job.id, repo_id = %job.repo_id, "Starting analysis");

        let mut reporter = StatusReporter::new(self.ctx.store.clone(), self.ctx.channel.clone(), &job);
        match self.execute(request, &job, &mut reporter).await {
            Ok(outcome) => {
                info!(
                    analysis_id = %job.id,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Analysis finished"
                );
                Ok(outcome)
            }
            Err(e) => {
                self.record_failure(&job, reporter.progress(), &e).await;
                Err(e)
            }
        }
    }

    /// Failure handler: persists FAILED with the user-facing message and publishes
    /// `analysis-failed`. Errors here are logged, never raised.
    pub async fn record_failure(&self, job: &AnalysisJob, progress: u8, err: &PipelineError) {
        let message = err.user_message();
        error!(analysis_id = %job.id, "Analysis failed: {}", err);

        if let Err(e) = self
            .ctx
            .store
            .fail_job(&job.id, &message, &log_line(&format!("Analysis failed: {}", message)))
            .await
        {
            error!(analysis_id = %job.id, "Could not persist failure: {}", e);
        }

        let event = JobEvent {
            analysis_id: job.id.clone(),
            status: JobStatus::Failed,
            progress,
            message,
        };
        let published = match event.to_payload() {
            Ok(payload) => {
                self.ctx
                    .channel
                    .publish(
                        &owner_channel(&job.owner_id),
                        JobEventKind::Failed.event_name(),
                        payload,
                    )
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = published {
            warn!(analysis_id = %job.id, "Realtime publish failed: {}", e);
        }
    }

    async fn execute(
        &self,
        request: &AnalysisRequest,
        job: &AnalysisJob,
        reporter: &mut StatusReporter,
    ) -> Result<AnalysisOutcome, PipelineError> {
        let ctx = &self.ctx;
        let config = &ctx.config;

        if request.selected_files.is_empty() {
            return Err(PipelineError::InvalidInput(
                "No files were selected for analysis.".to_string(),
            ));
        }

        reporter.advance(Stage::Init, "Starting analysis").await?;
        let repo: Repository = ctx.store.repository(&job.repo_id).await?;
        let token = ctx.store.access_token(&job.owner_id).await?;
        let branch = request
            .selected_branch
            .clone()
            .unwrap_or_else(|| repo.default_branch.clone());

        reporter
            .advance(Stage::CacheCheck, &format!("Checking {}@{} for changes", repo.coordinates, branch))
            .await?;
        let commit_sha = ctx
            .source
            .resolve_commit(&repo.coordinates, &branch, token.as_deref())
            .await?;
        ctx.store.set_commit(&job.id, &commit_sha).await?;

        if !request.force_refresh {
            if let Some(previous) = ctx.store.latest_completed(&repo.id, &job.id).await? {
                if previous.commit_sha.as_deref() == Some(commit_sha.as_str()) {
                    persist::commit_skipped(ctx.store.as_ref(), reporter, job, &repo, &previous, &commit_sha)
                        .await?;
                    return Ok(AnalysisOutcome::Skipped {
                        commit_sha,
                        previous_analysis: previous.id,
                    });
                }
            }
        }

        reporter
            .advance(
                Stage::Clone,
                &format!("Cloning {} at {}", repo.coordinates, short_sha(&commit_sha)),
            )
            .await?;
        let materializer = Materializer::new(
            ctx.source.clone(),
            ctx.file_system.clone(),
            config.max_file_size,
            config.workdir.clone(),
        );
        // Removed on drop, on every exit path of this function
        let snapshot = materializer
            .materialize(&repo.coordinates, token.as_deref(), &commit_sha)
            .await?;

        reporter
            .advance(
                Stage::ReadFiles,
                &format!("Reading {} selected files", request.selected_files.len()),
            )
            .await?;
        let files = materializer.read_selected(snapshot.path(), &request.selected_files)?;
        reporter
            .note(&format!("Read {} of {} selected files", files.len(), request.selected_files.len()))
            .await?;

        reporter.advance(Stage::Sentinel, "Screening instructions").await?;
        let verdict = sentinel::execute(
            &ctx.executor,
            &ctx.models.fast,
            request.instructions.as_deref(),
            config.sentinel_min_chars,
            &job.id,
        )
        .await;
        if verdict.is_unsafe() {
            reporter
                .note(&format!("Instructions flagged UNSAFE: {}", verdict.reason))
                .await?;
        }

        reporter.advance(Stage::Map, "Mapping project structure").await?;
        let project_map = map::execute(
            &ctx.executor,
            &ctx.models.fast,
            &files,
            config.preview_chars,
            config.map_budget,
            &job.id,
        )
        .await?;

        reporter.advance(Stage::Analyze, "Running deep analysis").await?;
        let audit = analyze::execute(
            &ctx.executor,
            &ctx.models.analysis,
            &analyze::AnalyzeInput {
                map: &project_map,
                files: &files,
                instructions: request.instructions.as_deref(),
                verdict: &verdict,
                language: &request.language,
                budget: config.analysis_budget,
            },
            &job.id,
        )
        .await?;
        reporter
            .advance(
                Stage::Analyzed,
                &format!(
                    "Audit ready: {} refactor targets, security {}/10",
                    audit.refactor_targets.len(),
                    audit.sections.security.score
                ),
            )
            .await?;

        let doc_types = request.requested_doc_types();
        let writers = if doc_types.is_empty() {
            documents::WriterResults::default()
        } else {
            reporter
                .advance(Stage::Documents, &format!("Generating {} documents", doc_types.len()))
                .await?;

            let commits = if doc_types.contains(&DocType::Changelog) {
                ctx.source
                    .list_recent_commits(&repo.coordinates, &branch, token.as_deref(), config.changelog_commits)
                    .await
                    .unwrap_or_else(|e| {
                        warn!(analysis_id = %job.id, "Commit history unavailable: {}", e);
                        Vec::new()
                    })
            } else {
                Vec::new()
            };

            let repo_name = repo.coordinates.full_name();
            let results = documents::execute(
                &ctx.executor,
                &ctx.models.writer,
                &doc_types,
                &documents::WriterInput {
                    audit: &audit,
                    map: &project_map,
                    files: &files,
                    commits: &commits,
                    repo_name: &repo_name,
                    language: &request.language,
                    budget: config.writer_budget,
                },
                &job.id,
            )
            .await;
            for failure in &results.failures {
                reporter
                    .note(&format!("{} generation failed: {}", failure.doc_type, failure.error))
                    .await?;
            }
            results
        };

        reporter.advance(Stage::Metrics, "Computing metrics").await?;
        let contributors = ctx
            .source
            .list_contributors(&repo.coordinates, token.as_deref())
            .await
            .unwrap_or_else(|e| {
                warn!(analysis_id = %job.id, "Contributors unavailable: {}", e);
                Vec::new()
            });
        let code = code_metrics(&files);
        let bus = bus_factor(&contributors);
        let counts = AuditCounts::from_audit(&audit);
        let scores = compute_scores(&code, bus, &counts);
        info!(analysis_id = %job.id, bus_factor = bus, "Scores: {}", scores);

        reporter.advance(Stage::Persist, "Saving results").await?;
        let outcome = AnalysisOutcome::Completed {
            commit_sha: commit_sha.clone(),
            documents: writers.documents.iter().map(|d| d.doc_type).collect(),
            failed_documents: writers.failures.iter().map(|f| f.doc_type).collect(),
        };
        persist::commit(
            ctx.store.as_ref(),
            reporter,
            job,
            &repo,
            AnalysisResult {
                commit_sha,
                audit,
                verdict,
                project_map: config.retain_project_map.then_some(project_map),
                writers,
                metrics: MetricsReport {
                    code,
                    bus_factor: bus,
                    contributors: contributors.len(),
                    audit: counts,
                },
                scores,
            },
        )
        .await?;

        drop(snapshot);
        Ok(outcome)
    }
}
