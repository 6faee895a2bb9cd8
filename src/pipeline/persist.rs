//! Result Persister
//!
//! Builds the stored result and commits it, the documents and the completion
//! notification in one `complete_job` call. Document bodies live only in the
//! document rows; `resultJson` carries a summary of them.

use super::error::PipelineError;
use super::job::{short_sha, AnalysisJob};
use super::phases::documents::WriterResults;
use super::status::{log_line, StatusReporter};
use crate::metrics::{MetricsReport, Scores};
use crate::output::{ProjectMap, SentinelVerdict, TechnicalAudit};
use crate::store::{Document, JobCompletion, Notification, Repository, Store};
use serde_json::{json, Value};
use tracing::info;

/// Everything a finished run produced
pub struct AnalysisResult {
    pub commit_sha: String,
    pub audit: TechnicalAudit,
    pub verdict: SentinelVerdict,
    /// Present only when the caller retains the map
    pub project_map: Option<ProjectMap>,
    pub writers: WriterResults,
    pub metrics: MetricsReport,
    pub scores: Scores,
}

pub fn result_json(result: &AnalysisResult) -> Value {
    let version = short_sha(&result.commit_sha);
    let documents: Vec<Value> = result
        .writers
        .documents
        .iter()
        .map(|d| {
            json!({
                "type": d.doc_type,
                "version": version,
                "chars": d.content.chars().count(),
                "hasSpec": d.spec.is_some(),
            })
        })
        .collect();

    let mut value = json!({
        "commitSha": result.commit_sha,
        "skipped": false,
        "audit": result.audit,
        "sentinel": result.verdict,
        "documents": documents,
        "documentFailures": result.writers.failures,
    });
    if let (Some(map), Some(obj)) = (&result.project_map, value.as_object_mut()) {
        obj.insert("projectMap".to_string(), json!(map));
    }
    value
}

/// Terminal DONE write for a full run
pub async fn commit(
    store: &dyn Store,
    reporter: &mut StatusReporter,
    job: &AnalysisJob,
    repo: &Repository,
    result: AnalysisResult,
) -> Result<(), PipelineError> {
    let version = short_sha(&result.commit_sha);
    let result_value = result_json(&result);
    let metrics_value = serde_json::to_value(&result.metrics)
        .map_err(|e| PipelineError::Internal(e.into()))?;

    let documents: Vec<Document> = result
        .writers
        .documents
        .into_iter()
        .map(|d| Document::new(&repo.id, &version, d.doc_type, d.content).with_spec(d.spec))
        .collect();

    let mut body = format!(
        "{} analyzed at {}: health {}/100.",
        repo.coordinates, version, result.scores.health
    );
    if !result.writers.failures.is_empty() {
        body.push_str(&format!(
            " {} document(s) could not be generated.",
            result.writers.failures.len()
        ));
    }

    let message = "Analysis complete";
    let completion = JobCompletion {
        commit_sha: result.commit_sha,
        scores: result.scores,
        result_json: result_value,
        metrics_json: metrics_value,
        documents,
        notification: Notification::new(&job.owner_id, &job.id, message, body),
        message: message.to_string(),
        log_line: log_line(message),
    };

    store.complete_job(&job.id, &completion).await?;
    info!(
        analysis_id = %job.id,
        documents = completion.documents.len(),
        health = completion.scores.health,
        "Analysis persisted"
    );
    reporter.completed(message).await;
    Ok(())
}

/// Terminal DONE write for a cache-skip: the previous run's scores, result and
/// metrics are carried over and no documents are written
pub async fn commit_skipped(
    store: &dyn Store,
    reporter: &mut StatusReporter,
    job: &AnalysisJob,
    repo: &Repository,
    previous: &AnalysisJob,
    commit_sha: &str,
) -> Result<(), PipelineError> {
    let mut result_value = previous.result_json.clone().unwrap_or_else(|| json!({}));
    if let Some(obj) = result_value.as_object_mut() {
        obj.insert("skipped".to_string(), json!(true));
        obj.insert("reusedAnalysisId".to_string(), json!(previous.id));
    }

    let message = "No changes since the last analysis";
    let completion = JobCompletion {
        commit_sha: commit_sha.to_string(),
        scores: previous.scores.clone().unwrap_or_default(),
        result_json: result_value,
        metrics_json: previous.metrics_json.clone().unwrap_or_else(|| json!({})),
        documents: Vec::new(),
        notification: Notification::new(
            &job.owner_id,
            &job.id,
            "Analysis up to date",
            format!(
                "{} has no new commits since {}.",
                repo.coordinates,
                short_sha(commit_sha)
            ),
        ),
        message: message.to_string(),
        log_line: log_line(message),
    };

    store.complete_job(&job.id, &completion).await?;
    info!(analysis_id = %job.id, reused = %previous.id, "Analysis skipped, commit unchanged");
    reporter.completed(message).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{AuditCounts, CodeMetrics};
    use crate::output::{AuditSections, SecurityFindings};
    use crate::pipeline::job::DocType;
    use crate::pipeline::phases::documents::{GeneratedDocument, WriterFailure};
    use crate::progress::NoOpChannel;
    use crate::source::RepoCoordinates;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn repo() -> Repository {
        Repository {
            id: "r-1".into(),
            owner_id: "u-1".into(),
            coordinates: RepoCoordinates::new("acme", "widgets"),
            default_branch: "main".into(),
        }
    }

    fn result(content: &str) -> AnalysisResult {
        AnalysisResult {
            commit_sha: "abcdef0123456".into(),
            audit: TechnicalAudit {
                executive_summary: "ok".into(),
                sections: AuditSections {
                    data_flow: String::new(),
                    security: SecurityFindings {
                        score: 9,
                        risks: vec![],
                    },
                    tech_debt: vec![],
                    performance_bottlenecks: vec![],
                    api_structure: String::new(),
                },
                onboarding_guide: String::new(),
                refactor_targets: vec![],
            },
            verdict: SentinelVerdict::safe("none"),
            project_map: None,
            writers: WriterResults {
                documents: vec![GeneratedDocument {
                    doc_type: DocType::Readme,
                    content: content.into(),
                    spec: None,
                }],
                failures: vec![WriterFailure {
                    doc_type: DocType::Changelog,
                    error: "exhausted".into(),
                }],
            },
            metrics: MetricsReport {
                code: CodeMetrics::default(),
                bus_factor: 1,
                contributors: 1,
                audit: AuditCounts::default(),
            },
            scores: Scores {
                health: 80,
                ..Default::default()
            },
        }
    }

    async fn setup(store: &Arc<MemoryStore>, id: &str) -> (AnalysisJob, StatusReporter) {
        let job = AnalysisJob::new(id, "r-1", "u-1");
        store.create_job(&job).await.unwrap();
        let reporter = StatusReporter::new(store.clone(), Arc::new(NoOpChannel), &job);
        (job, reporter)
    }

    #[test]
    fn test_result_json_strips_document_bodies() {
        let value = result_json(&result("SECRET BODY"));
        assert_eq!(value["skipped"], false);
        assert_eq!(value["documents"][0]["type"], "README");
        assert_eq!(value["documents"][0]["version"], "abcdef0");
        assert_eq!(value["documentFailures"][0]["docType"], "CHANGELOG");
        assert!(value.get("projectMap").is_none());
        assert!(!value.to_string().contains("SECRET BODY"));
    }

    #[tokio::test]
    async fn test_repeated_persist_upserts_one_document() {
        let store = Arc::new(MemoryStore::new());

        let (job, mut reporter) = setup(&store, "a-1").await;
        commit(store.as_ref(), &mut reporter, &job, &repo(), result("first"))
            .await
            .unwrap();
        let (job, mut reporter) = setup(&store, "a-2").await;
        commit(store.as_ref(), &mut reporter, &job, &repo(), result("second"))
            .await
            .unwrap();

        let documents = store.documents("r-1").await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].version, "abcdef0");
        assert_eq!(documents[0].content, "second");
        assert_eq!(reporter.progress(), 100);
    }

    #[tokio::test]
    async fn test_skip_copies_previous_results() {
        let store = Arc::new(MemoryStore::new());
        let (old, mut reporter) = setup(&store, "old").await;
        commit(store.as_ref(), &mut reporter, &old, &repo(), result("body"))
            .await
            .unwrap();
        let previous = store.get_job("old").await.unwrap();

        let (job, mut reporter) = setup(&store, "new").await;
        commit_skipped(store.as_ref(), &mut reporter, &job, &repo(), &previous, "abcdef0123456")
            .await
            .unwrap();

        let skipped = store.get_job("new").await.unwrap();
        assert_eq!(skipped.scores, previous.scores);
        assert_eq!(skipped.metrics_json, previous.metrics_json);
        let result = skipped.result_json.unwrap();
        assert_eq!(result["skipped"], true);
        assert_eq!(result["reusedAnalysisId"], "old");
        assert_eq!(store.document_writes(), 1);
    }
}
