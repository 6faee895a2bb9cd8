//! Shared fakes for the pipeline integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use repoaudit::llm::{LLMRequest, MockLLMClient, MockResponse, ModelCallExecutor, ModelChain, ModelProvider};
use repoaudit::pipeline::{
    AnalysisJob, AnalysisOrchestrator, ModelTiers, PipelineConfig, PipelineContext,
};
use repoaudit::progress::{PublishError, RealtimeChannel};
use repoaudit::source::{CommitSummary, Contributor, RepoCoordinates, SourceError, SourceHost};
use repoaudit::store::{MemoryStore, Repository, Store};
use repoaudit::util::RetryPolicy;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const HEAD_SHA: &str = "9fceb02d0ae598e95dc970b74767f19372d61af8";
pub const REPO_ID: &str = "repo-1";
pub const OWNER_ID: &str = "user-1";

/// Source host that "clones" by writing a fixed file set into the destination
pub struct FakeSource {
    files: Vec<(String, Vec<u8>)>,
    head: Mutex<String>,
    contributors: Vec<Contributor>,
    commits: Vec<CommitSummary>,
    resolve_error: Mutex<Option<SourceError>>,
    clone_error: Option<SourceError>,
    clone_delay: Option<Duration>,
    pub resolve_calls: AtomicUsize,
    pub clone_calls: AtomicUsize,
    pub cloned_commits: Mutex<Vec<String>>,
    active_clones: AtomicUsize,
    pub max_concurrent_clones: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Self {
        Self {
            files: Vec::new(),
            head: Mutex::new(HEAD_SHA.to_string()),
            contributors: vec![
                Contributor {
                    login: "alice".into(),
                    commits: 40,
                },
                Contributor {
                    login: "bob".into(),
                    commits: 35,
                },
                Contributor {
                    login: "carol".into(),
                    commits: 25,
                },
            ],
            commits: vec![CommitSummary {
                sha: HEAD_SHA.into(),
                message: "Add widget endpoint".into(),
                author: "alice".into(),
                date: Some("2026-10-01T12:00:00Z".into()),
            }],
            resolve_error: Mutex::new(None),
            clone_error: None,
            clone_delay: None,
            resolve_calls: AtomicUsize::new(0),
            clone_calls: AtomicUsize::new(0),
            cloned_commits: Mutex::new(Vec::new()),
            active_clones: AtomicUsize::new(0),
            max_concurrent_clones: AtomicUsize::new(0),
        }
    }

    pub fn with_file(mut self, path: &str, content: impl Into<Vec<u8>>) -> Self {
        self.files.push((path.to_string(), content.into()));
        self
    }

    pub fn with_clone_error(mut self, error: SourceError) -> Self {
        self.clone_error = Some(error);
        self
    }

    pub fn with_clone_delay(mut self, delay: Duration) -> Self {
        self.clone_delay = Some(delay);
        self
    }

    pub fn fail_resolve_once(&self, error: SourceError) {
        *self.resolve_error.lock().unwrap() = Some(error);
    }

    pub fn set_head(&self, sha: &str) {
        *self.head.lock().unwrap() = sha.to_string();
    }

    pub fn clones(&self) -> usize {
        self.clone_calls.load(Ordering::SeqCst)
    }
}

/// A small Rust web service with a README
pub fn widget_service() -> FakeSource {
    FakeSource::new()
        .with_file("README.md", "# Widgets\n\nA widget service.\n")
        .with_file("Cargo.toml", "[package]\nname = \"widgets\"\n")
        .with_file(
            "src/main.rs",
            "// entry point\nfn main() {\n    widgets::serve();\n}\n",
        )
        .with_file(
            "src/api/routes.rs",
            "pub fn routes() -> Vec<&'static str> {\n    vec![\"/widgets\"]\n}\n",
        )
        .with_file("src/lib.rs", "pub mod api;\n// TODO: config\npub fn serve() {}\n")
}

#[async_trait]
impl SourceHost for FakeSource {
    async fn default_branch(
        &self,
        _repo: &RepoCoordinates,
        _token: Option<&str>,
    ) -> Result<String, SourceError> {
        Ok("main".to_string())
    }

    async fn resolve_commit(
        &self,
        _repo: &RepoCoordinates,
        _branch: &str,
        _token: Option<&str>,
    ) -> Result<String, SourceError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.resolve_error.lock().unwrap().take() {
            return Err(error);
        }
        Ok(self.head.lock().unwrap().clone())
    }

    async fn clone_commit(
        &self,
        _repo: &RepoCoordinates,
        commit_sha: &str,
        _token: Option<&str>,
        dest: &Path,
    ) -> Result<(), SourceError> {
        self.clone_calls.fetch_add(1, Ordering::SeqCst);
        self.cloned_commits.lock().unwrap().push(commit_sha.to_string());
        if let Some(delay) = self.clone_delay {
            let active = self.active_clones.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_concurrent_clones.fetch_max(active, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            self.active_clones.fetch_sub(1, Ordering::SeqCst);
        }
        if let Some(ref error) = self.clone_error {
            return Err(error.clone());
        }
        for (path, content) in &self.files {
            let target = dest.join(path);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| SourceError::Git(e.to_string()))?;
            }
            std::fs::write(&target, content).map_err(|e| SourceError::Git(e.to_string()))?;
        }
        Ok(())
    }

    async fn list_contributors(
        &self,
        _repo: &RepoCoordinates,
        _token: Option<&str>,
    ) -> Result<Vec<Contributor>, SourceError> {
        Ok(self.contributors.clone())
    }

    async fn list_recent_commits(
        &self,
        _repo: &RepoCoordinates,
        _branch: &str,
        _token: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CommitSummary>, SourceError> {
        Ok(self.commits.iter().take(limit).cloned().collect())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Realtime channel that keeps every published event
#[derive(Default)]
pub struct RecordingChannel {
    events: Mutex<Vec<(String, String, Value)>>,
}

impl RecordingChannel {
    pub fn events(&self) -> Vec<(String, String, Value)> {
        self.events.lock().unwrap().clone()
    }

    pub fn event_names(&self) -> Vec<String> {
        self.events().into_iter().map(|(_, event, _)| event).collect()
    }

    pub fn progress_values(&self) -> Vec<u64> {
        self.events()
            .into_iter()
            .filter_map(|(_, _, payload)| payload["progress"].as_u64())
            .collect()
    }
}

#[async_trait]
impl RealtimeChannel for RecordingChannel {
    async fn publish(&self, channel: &str, event: &str, payload: Value) -> Result<(), PublishError> {
        self.events
            .lock()
            .unwrap()
            .push((channel.to_string(), event.to_string(), payload));
        Ok(())
    }
}

pub fn map_json() -> Value {
    json!({
        "overview": "A Rust web service exposing widget endpoints.",
        "stack": { "languages": ["Rust"], "frameworks": [] },
        "modules": [
            { "path": "src/api", "type": "service", "responsibility": "HTTP routes", "dependencies": [] },
            { "path": "src", "type": "library", "responsibility": "Service bootstrap", "dependencies": ["src/api"] }
        ],
        "diagram": "graph TD; src --> api"
    })
}

pub fn audit_json() -> Value {
    json!({
        "executiveSummary": "A compact widget service with a single HTTP surface.",
        "sections": {
            "dataFlow": "HTTP request -> routes -> handler",
            "security": { "score": 8, "risks": ["No authentication on /widgets"] },
            "techDebt": ["Configuration is hard-coded"],
            "performanceBottlenecks": [],
            "apiStructure": "REST, one resource"
        },
        "onboardingGuide": "Run cargo run and open /widgets.",
        "refactorTargets": [
            {
                "file": "src/lib.rs",
                "priority": "Medium",
                "description": "Load configuration from the environment",
                "before": "pub fn serve() {}",
                "after": "pub fn serve(config: Config) {}"
            }
        ]
    })
}

pub fn sentinel_json(status: &str) -> Value {
    json!({ "status": status, "reason": "classified by test" })
}

pub fn system_prompt(request: &LLMRequest) -> &str {
    request.system_prompt().unwrap_or_default()
}

pub fn user_prompt(request: &LLMRequest) -> &str {
    request.user_prompt().unwrap_or_default()
}

/// Stage the request belongs to, recognised from its prompts
pub fn stage_of(request: &LLMRequest) -> &'static str {
    let system = system_prompt(request);
    if system.contains("You screen free-text instructions") {
        "sentinel"
    } else if system.contains("structural map") {
        "map"
    } else if system.contains("technical audit") {
        "analyze"
    } else if system.contains("technical writer") {
        "writer"
    } else {
        "unknown"
    }
}

/// Correct answer for every stage
pub fn happy_response(request: &LLMRequest) -> MockResponse {
    match stage_of(request) {
        "sentinel" => MockResponse::json(&sentinel_json("SAFE")),
        "map" => MockResponse::json(&map_json()),
        "analyze" => MockResponse::json(&audit_json()),
        "writer" if user_prompt(request).contains("API reference") => MockResponse::text(
            "# API\n\nGET /widgets\n\n```yaml\nopenapi: 3.0.0\ninfo:\n  title: widgets\n```\n",
        ),
        "writer" => MockResponse::text("# Widgets\n\nGenerated documentation.\n"),
        _ => MockResponse::text(""),
    }
}

pub fn happy_client() -> Arc<MockLLMClient> {
    Arc::new(MockLLMClient::with_responder("scripted", happy_response))
}

pub fn chain_of(client: Arc<MockLLMClient>) -> ModelChain {
    ModelChain::single(
        ModelProvider::new(client.clone())
            .with_id(client_name(&client))
            .with_retry(RetryPolicy::immediate(3)),
    )
}

fn client_name(client: &MockLLMClient) -> String {
    use repoaudit::llm::LLMClient;
    client.name().to_string()
}

/// Everything one pipeline test needs, wired to in-memory fakes
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub source: Arc<FakeSource>,
    pub channel: Arc<RecordingChannel>,
    pub workdir: TempDir,
    pub models: ModelTiers,
    pub config: PipelineConfig,
    pub executor: Arc<ModelCallExecutor>,
}

impl Harness {
    pub fn new(source: FakeSource, client: Arc<MockLLMClient>) -> Self {
        Self::with_models(source, ModelTiers::uniform(chain_of(client)))
    }

    pub fn with_models(source: FakeSource, models: ModelTiers) -> Self {
        let workdir = TempDir::new().unwrap();
        let config = PipelineConfig::new().with_workdir(Some(workdir.path().join("snapshots")));
        Self {
            store: Arc::new(MemoryStore::new()),
            source: Arc::new(source),
            channel: Arc::new(RecordingChannel::default()),
            workdir,
            models,
            config,
            executor: Arc::new(ModelCallExecutor::new(Duration::from_secs(5))),
        }
    }

    pub fn context(&self) -> Arc<PipelineContext> {
        Arc::new(
            PipelineContext::new(
                self.store.clone(),
                self.source.clone(),
                self.channel.clone(),
                self.models.clone(),
            )
            .with_executor(self.executor.clone())
            .with_config(self.config.clone()),
        )
    }

    pub fn orchestrator(&self) -> AnalysisOrchestrator {
        AnalysisOrchestrator::new(self.context())
    }

    /// Registers the repository and a NEW job
    pub async fn seed(&self, analysis_id: &str) {
        self.store
            .upsert_repository(&Repository {
                id: REPO_ID.into(),
                owner_id: OWNER_ID.into(),
                coordinates: RepoCoordinates::new("acme", "widgets"),
                default_branch: "main".into(),
            })
            .await
            .unwrap();
        self.store
            .create_job(&AnalysisJob::new(analysis_id, REPO_ID, OWNER_ID))
            .await
            .unwrap();
    }

    /// Snapshot directories still present under the workdir
    pub fn leftover_snapshots(&self) -> usize {
        std::fs::read_dir(self.workdir.path().join("snapshots"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}
