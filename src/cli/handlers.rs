//! Command handlers. Each returns the process exit code.

use super::commands::{AnalyzeArgs, ShowArgs};
use super::output::OutputFormatter;
use crate::config::RepoAuditConfig;
use crate::pipeline::job::short_sha;
use crate::pipeline::{
    AnalysisJob, AnalysisOrchestrator, AnalysisRequest, JobRuntime, PipelineContext,
};
use crate::progress::{LoggingChannel, ProgressBarChannel, RealtimeChannel};
use crate::source::{GithubSource, RepoCoordinates, SourceHost};
use crate::store::{Document, Repository, SqliteStore, Store};
use anyhow::{Context, Result};
use std::env;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

async fn open_store(config: &RepoAuditConfig) -> Result<Arc<SqliteStore>> {
    let store = SqliteStore::connect(&config.database)
        .await
        .with_context(|| format!("Failed to open database {}", config.database.display()))?;
    store.migrate().await.context("Failed to prepare database schema")?;
    Ok(Arc::new(store))
}

/// Documents generated at the job's commit
async fn job_documents(store: &dyn Store, job: &AnalysisJob) -> Result<Vec<Document>> {
    let Some(ref sha) = job.commit_sha else {
        return Ok(Vec::new());
    };
    let version = short_sha(sha);
    Ok(store
        .documents(&job.repo_id)
        .await?
        .into_iter()
        .filter(|d| d.version == version)
        .collect())
}

/// Records the repository with the default branch reported by the source host. An
/// explicit `--branch` keeps the run going when that lookup fails.
async fn register_repository(
    store: &dyn Store,
    source: &dyn SourceHost,
    coordinates: &RepoCoordinates,
    owner_id: &str,
    branch: Option<&str>,
) -> Result<Repository> {
    let token = store.access_token(owner_id).await?;
    let default_branch = match source.default_branch(coordinates, token.as_deref()).await {
        Ok(default_branch) => default_branch,
        Err(e) => match branch {
            Some(branch) => {
                warn!(repository = %coordinates, "Default branch unavailable, using {}: {}", branch, e);
                branch.to_string()
            }
            None => {
                anyhow::bail!("Failed to look up {}: {}", coordinates, e.user_message())
            }
        },
    };

    let repo = Repository {
        id: coordinates.full_name(),
        owner_id: owner_id.to_string(),
        coordinates: coordinates.clone(),
        default_branch,
    };
    store.upsert_repository(&repo).await?;
    Ok(repo)
}

async fn print_job(store: &dyn Store, analysis_id: &str, formatter: &OutputFormatter) -> Result<()> {
    let job = store.get_job(analysis_id).await?;
    let documents = job_documents(store, &job).await?;
    println!("{}", formatter.format_job(&job, &documents)?);
    Ok(())
}

pub async fn handle_analyze(args: &AnalyzeArgs, config: &RepoAuditConfig, quiet: bool) -> i32 {
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return 1;
    }
    debug!("{}", config);

    match run_analyze(args, config, quiet).await {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(e) => {
            error!("Analysis could not run: {:#}", e);
            eprintln!("Error: {:#}", e);
            1
        }
    }
}

async fn run_analyze(args: &AnalyzeArgs, config: &RepoAuditConfig, quiet: bool) -> Result<bool> {
    let store = open_store(config).await?;

    if let Ok(token) = env::var("GITHUB_TOKEN") {
        if !token.trim().is_empty() {
            store.set_access_token(&args.owner, token.trim()).await?;
        }
    }

    let source = Arc::new(GithubSource::new(config.github_api.clone(), config.request_timeout())?);
    let repo = register_repository(
        store.as_ref(),
        source.as_ref(),
        &args.repository,
        &args.owner,
        args.branch.as_deref(),
    )
    .await?;

    let analysis_id = uuid::Uuid::new_v4().to_string();
    store
        .create_job(&AnalysisJob::new(&analysis_id, &repo.id, &args.owner))
        .await?;
    info!(analysis_id = %analysis_id, repository = %repo.coordinates, "Created analysis job");

    let mut request = AnalysisRequest::new(&analysis_id, &args.owner, args.files.clone())
        .with_doc_types(args.doc_types.clone())
        .with_force_refresh(args.force_refresh)
        .with_language(&args.language);
    if let Some(ref branch) = args.branch {
        request = request.with_branch(branch);
    }
    if let Some(ref instructions) = args.instructions {
        request = request.with_instructions(instructions);
    }

    let bar = (!quiet && atty::is(atty::Stream::Stderr)).then(|| Arc::new(ProgressBarChannel::new()));
    let channel: Arc<dyn RealtimeChannel> = match bar {
        Some(ref bar) => bar.clone() as Arc<dyn RealtimeChannel>,
        None => Arc::new(LoggingChannel),
    };

    let ctx = PipelineContext::new(store.clone(), source, channel, config.model_chains())
        .with_executor(Arc::new(config.executor()))
        .with_config(config.pipeline_config());
    let runtime = JobRuntime::new(Arc::new(AnalysisOrchestrator::new(Arc::new(ctx))))
        .with_retry(config.job_retry())
        .with_job_timeout(config.job_timeout())
        .with_owner_concurrency(config.owner_concurrency);

    let outcome = runtime.submit(&request).await;
    if let Some(bar) = bar {
        bar.finish();
    }

    print_job(store.as_ref(), &analysis_id, &OutputFormatter::new(args.format.into())).await?;

    match outcome {
        Ok(outcome) => {
            debug!(analysis_id = %analysis_id, "Outcome: {:?}", outcome);
            Ok(true)
        }
        Err(e) => {
            if !quiet {
                eprintln!("Analysis failed: {}", e.user_message());
            }
            Ok(false)
        }
    }
}

pub async fn handle_show(args: &ShowArgs, config: &RepoAuditConfig) -> i32 {
    let formatter = OutputFormatter::new(args.format.into());

    match run_show(config, &args.analysis_id, &formatter).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    }
}

async fn run_show(config: &RepoAuditConfig, analysis_id: &str, formatter: &OutputFormatter) -> Result<()> {
    let store = open_store(config).await?;
    print_job(store.as_ref(), analysis_id, formatter).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::DocType;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn github(server: &MockServer) -> GithubSource {
        GithubSource::new(server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_repository_uses_reported_default_branch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/legacy"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "default_branch": "master" })))
            .mount(&server)
            .await;

        let store = MemoryStore::new();
        let coordinates = RepoCoordinates::new("acme", "legacy");
        let repo = register_repository(&store, &github(&server).await, &coordinates, "u-1", None)
            .await
            .unwrap();

        assert_eq!(repo.default_branch, "master");
        assert_eq!(store.repository("acme/legacy").await.unwrap().default_branch, "master");
    }

    #[tokio::test]
    async fn test_failed_branch_lookup_needs_explicit_branch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/legacy"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = MemoryStore::new();
        let source = github(&server).await;
        let coordinates = RepoCoordinates::new("acme", "legacy");

        let err = register_repository(&store, &source, &coordinates, "u-1", None)
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("not found"));

        let repo = register_repository(&store, &source, &coordinates, "u-1", Some("develop"))
            .await
            .unwrap();
        assert_eq!(repo.default_branch, "develop");
    }

    #[tokio::test]
    async fn test_job_documents_match_commit_version() {
        let store = MemoryStore::new();
        store
            .upsert_document(&Document::new("r-1", "abcdef0", DocType::Readme, "current"))
            .await
            .unwrap();
        store
            .upsert_document(&Document::new("r-1", "1111111", DocType::Readme, "older"))
            .await
            .unwrap();

        let mut job = AnalysisJob::new("a-1", "r-1", "u-1");
        assert!(job_documents(&store, &job).await.unwrap().is_empty());

        job.commit_sha = Some("abcdef0123456".into());
        let docs = job_documents(&store, &job).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "current");
    }
}
