//! GitHub implementation of [`SourceHost`]
//!
//! REST calls go through reqwest. Snapshots shell out to the `git` CLI and fetch the
//! exact resolved commit; the token travels as an `http.extraHeader` set through
//! `GIT_CONFIG_*` environment variables, so it never shows up in argv, errors or logs.

use super::{CommitSummary, Contributor, RepoCoordinates, SourceError, SourceHost};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_CLONE_BASE: &str = "https://github.com";

pub struct GithubSource {
    client: Client,
    api_base: String,
    clone_base: String,
}

#[derive(Deserialize)]
struct CommitResponse {
    sha: String,
}

#[derive(Deserialize)]
struct RepositoryResponse {
    default_branch: String,
}

#[derive(Deserialize)]
struct ContributorResponse {
    login: Option<String>,
    contributions: u64,
}

#[derive(Deserialize)]
struct CommitListItem {
    sha: String,
    commit: CommitDetail,
}

#[derive(Deserialize)]
struct CommitDetail {
    message: String,
    author: Option<CommitAuthor>,
}

#[derive(Deserialize)]
struct CommitAuthor {
    name: Option<String>,
    date: Option<String>,
}

impl GithubSource {
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Other(e.to_string()))?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            clone_base: DEFAULT_CLONE_BASE.to_string(),
        })
    }

    pub fn with_clone_base(mut self, clone_base: impl Into<String>) -> Self {
        self.clone_base = clone_base.into().trim_end_matches('/').to_string();
        self
    }

    /// `api_base` followed by percent-encoded path segments
    fn endpoint(&self, segments: &[&str]) -> Result<Url, SourceError> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| SourceError::Other(format!("invalid API base '{}': {}", self.api_base, e)))?;
        url.path_segments_mut()
            .map_err(|_| SourceError::Other(format!("invalid API base '{}'", self.api_base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn get(&self, url: Url, token: Option<&str>) -> RequestBuilder {
        let mut request = self
            .client
            .get(url)
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, concat!("repoaudit/", env!("CARGO_PKG_VERSION")));
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        request
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        url: Url,
        token: Option<&str>,
        what: &str,
    ) -> Result<T, SourceError> {
        let response = self
            .get(url, token)
            .send()
            .await
            .map_err(|e| SourceError::Network(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(status, &headers, &body, what));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| SourceError::Other(format!("unexpected response for {}: {}", what, e)))
    }

    fn clone_url(&self, repo: &RepoCoordinates) -> String {
        format!("{}/{}/{}.git", self.clone_base, repo.owner, repo.name)
    }
}

/// `git` invocation that authenticates through config injected via the environment
fn git_command(token: Option<&str>) -> Command {
    let mut command = Command::new("git");
    command.env("GIT_TERMINAL_PROMPT", "0").kill_on_drop(true);
    if let Some(token) = token.filter(|t| !t.is_empty()) {
        command
            .env("GIT_CONFIG_COUNT", "1")
            .env("GIT_CONFIG_KEY_0", "http.extraHeader")
            .env("GIT_CONFIG_VALUE_0", auth_header(token));
    }
    command
}

fn auth_header(token: &str) -> String {
    let credentials = BASE64.encode(format!("x-access-token:{}", token));
    format!("Authorization: Basic {}", credentials)
}

async fn run_git(mut command: Command, token: Option<&str>, what: &str) -> Result<(), SourceError> {
    let output = command
        .output()
        .await
        .map_err(|e| SourceError::Git(format!("failed to execute git: {}", e)))?;
    if !output.status.success() {
        let stderr = redact(&String::from_utf8_lossy(&output.stderr), token);
        return Err(classify_git_failure(&stderr, what));
    }
    Ok(())
}

/// Maps a non-success REST status onto the typed error
fn map_status(status: StatusCode, headers: &HeaderMap, body: &str, what: &str) -> SourceError {
    let retry_after = headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let rate_exhausted = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == "0")
        .unwrap_or(false);

    match status.as_u16() {
        401 => SourceError::Unauthorized(format!("{} ({})", what, status)),
        403 if rate_exhausted || retry_after.is_some() => SourceError::RateLimited { retry_after },
        403 => SourceError::Unauthorized(format!("{} ({})", what, status)),
        404 => SourceError::NotFound(what.to_string()),
        429 => SourceError::RateLimited { retry_after },
        code if code >= 500 => SourceError::Network(format!("{} returned {}", what, status)),
        _ => SourceError::Other(format!("{} returned {}: {}", what, status, body.trim())),
    }
}

/// Maps `git clone` stderr onto the typed error
fn classify_git_failure(stderr: &str, what: &str) -> SourceError {
    let lower = stderr.to_lowercase();
    if lower.contains("authentication failed")
        || lower.contains("could not read username")
        || lower.contains("403")
    {
        SourceError::Unauthorized(what.to_string())
    } else if lower.contains("not found")
        || lower.contains("couldn't find remote ref")
        || lower.contains("not our ref")
    {
        SourceError::NotFound(what.to_string())
    } else if lower.contains("could not resolve host") || lower.contains("connection") {
        SourceError::Network(stderr.trim().to_string())
    } else {
        SourceError::Git(stderr.trim().to_string())
    }
}

fn redact(text: &str, token: Option<&str>) -> String {
    match token {
        Some(token) if !token.is_empty() => text.replace(token, "***"),
        _ => text.to_string(),
    }
}

#[async_trait]
impl SourceHost for GithubSource {
    async fn default_branch(
        &self,
        repo: &RepoCoordinates,
        token: Option<&str>,
    ) -> Result<String, SourceError> {
        let url = self.endpoint(&["repos", &repo.owner, &repo.name])?;
        let response: RepositoryResponse = self.fetch_json(url, token, &repo.full_name()).await?;
        debug!(repo = %repo, branch = %response.default_branch, "Resolved default branch");
        Ok(response.default_branch)
    }

    async fn resolve_commit(
        &self,
        repo: &RepoCoordinates,
        branch: &str,
        token: Option<&str>,
    ) -> Result<String, SourceError> {
        let what = format!("{}@{}", repo, branch);
        let url = self.endpoint(&["repos", &repo.owner, &repo.name, "commits", branch])?;
        let response: CommitResponse = self.fetch_json(url, token, &what).await?;
        debug!(repo = %repo, branch, sha = %response.sha, "Resolved branch head");
        Ok(response.sha)
    }

    async fn clone_commit(
        &self,
        repo: &RepoCoordinates,
        commit_sha: &str,
        token: Option<&str>,
        dest: &Path,
    ) -> Result<(), SourceError> {
        info!(repo = %repo, sha = commit_sha, dest = %dest.display(), "Fetching repository snapshot");
        let what = format!("{}@{}", repo, commit_sha);

        let mut init = git_command(None);
        init.args(["init", "--quiet"]).arg(dest);
        run_git(init, None, &what).await?;

        let mut fetch = git_command(token);
        fetch
            .current_dir(dest)
            .args(["fetch", "--quiet", "--depth", "1"])
            .arg(self.clone_url(repo))
            .arg(commit_sha);
        run_git(fetch, token, &what).await?;

        let mut checkout = git_command(None);
        checkout
            .current_dir(dest)
            .args(["checkout", "--quiet", "--detach", "FETCH_HEAD"]);
        run_git(checkout, None, &what).await
    }

    async fn list_contributors(
        &self,
        repo: &RepoCoordinates,
        token: Option<&str>,
    ) -> Result<Vec<Contributor>, SourceError> {
        let mut url = self.endpoint(&["repos", &repo.owner, &repo.name, "contributors"])?;
        url.query_pairs_mut().append_pair("per_page", "100");
        let items: Vec<ContributorResponse> = self.fetch_json(url, token, &repo.full_name()).await?;

        Ok(items
            .into_iter()
            .map(|c| Contributor {
                login: c.login.unwrap_or_else(|| "anonymous".to_string()),
                commits: c.contributions,
            })
            .collect())
    }

    async fn list_recent_commits(
        &self,
        repo: &RepoCoordinates,
        branch: &str,
        token: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CommitSummary>, SourceError> {
        let per_page = limit.clamp(1, 100);
        let mut url = self.endpoint(&["repos", &repo.owner, &repo.name, "commits"])?;
        url.query_pairs_mut()
            .append_pair("sha", branch)
            .append_pair("per_page", &per_page.to_string());
        let items: Vec<CommitListItem> = self
            .fetch_json(url, token, &format!("{}@{}", repo, branch))
            .await?;

        Ok(items
            .into_iter()
            .take(limit)
            .map(|item| {
                let (author, date) = match item.commit.author {
                    Some(a) => (a.name.unwrap_or_default(), a.date),
                    None => (String::new(), None),
                };
                CommitSummary {
                    sha: item.sha,
                    message: item.commit.message,
                    author,
                    date,
                }
            })
            .collect())
    }

    fn name(&self) -> &str {
        "github"
    }
}
