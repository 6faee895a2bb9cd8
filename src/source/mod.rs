//! Source-hosting collaborator
//!
//! The pipeline only needs four things from the host: resolve a branch to a commit,
//! shallow-clone one branch, list contributors with commit counts, and list recent
//! commits. Everything behind [`SourceHost`] is swappable; tests use an in-process fake.

mod github;

pub use github::GithubSource;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// `owner/name` of a hosted repository
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoCoordinates {
    pub owner: String,
    pub name: String,
}

impl RepoCoordinates {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepoCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepoCoordinates {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().trim_end_matches(".git");
        match s.split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self::new(owner, name))
            }
            _ => Err(format!("expected owner/name, got '{}'", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    pub login: String,
    pub commits: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub sha: String,
    pub message: String,
    pub author: String,
    pub date: Option<String>,
}

/// Typed failures of the source host, each mapped to a distinct user-facing message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("source host rejected the credentials: {0}")]
    Unauthorized(String),

    #[error("not found on source host: {0}")]
    NotFound(String),

    #[error("source host rate limit exceeded")]
    RateLimited { retry_after: Option<u64> },

    #[error("network error talking to source host: {0}")]
    Network(String),

    #[error("git failed: {0}")]
    Git(String),

    #[error("source host error: {0}")]
    Other(String),
}

impl SourceError {
    pub fn user_message(&self) -> String {
        match self {
            SourceError::Unauthorized(_) => {
                "Repository access was denied. The access token may have expired; reconnect the account and try again.".to_string()
            }
            SourceError::NotFound(what) => format!("Repository or branch not found: {}", what),
            SourceError::RateLimited { retry_after: Some(secs) } => format!(
                "The source host rate limit was reached. Retrying in about {} seconds.",
                secs
            ),
            SourceError::RateLimited { retry_after: None } => {
                "The source host rate limit was reached. The analysis will be retried.".to_string()
            }
            SourceError::Network(_) => {
                "Could not reach the source host. The analysis will be retried.".to_string()
            }
            SourceError::Git(msg) => format!("Cloning the repository failed: {}", msg),
            SourceError::Other(msg) => format!("Source host error: {}", msg),
        }
    }
}

#[async_trait]
pub trait SourceHost: Send + Sync {
    /// Branch analysed when the caller selects none
    async fn default_branch(
        &self,
        repo: &RepoCoordinates,
        token: Option<&str>,
    ) -> Result<String, SourceError>;

    /// Current head commit SHA of `branch`
    async fn resolve_commit(
        &self,
        repo: &RepoCoordinates,
        branch: &str,
        token: Option<&str>,
    ) -> Result<String, SourceError>;

    /// Shallow checkout of exactly `commit_sha` into `dest`, which must be empty
    async fn clone_commit(
        &self,
        repo: &RepoCoordinates,
        commit_sha: &str,
        token: Option<&str>,
        dest: &Path,
    ) -> Result<(), SourceError>;

    async fn list_contributors(
        &self,
        repo: &RepoCoordinates,
        token: Option<&str>,
    ) -> Result<Vec<Contributor>, SourceError>;

    async fn list_recent_commits(
        &self,
        repo: &RepoCoordinates,
        branch: &str,
        token: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CommitSummary>, SourceError>;

    fn name(&self) -> &str;
}
