//! Analysis job model: inbound request, job record, lifecycle and stage table

use crate::metrics::Scores;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Inbound trigger for one analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub analysis_id: String,
    pub owner_id: String,
    pub selected_files: Vec<String>,
    #[serde(default)]
    pub selected_branch: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub doc_types: Vec<DocType>,
    #[serde(default)]
    pub force_refresh: bool,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "en".to_string()
}

impl AnalysisRequest {
    pub fn new(
        analysis_id: impl Into<String>,
        owner_id: impl Into<String>,
        selected_files: Vec<String>,
    ) -> Self {
        Self {
            analysis_id: analysis_id.into(),
            owner_id: owner_id.into(),
            selected_files,
            selected_branch: None,
            instructions: None,
            doc_types: Vec::new(),
            force_refresh: false,
            language: default_language(),
        }
    }

    pub fn with_doc_types(mut self, doc_types: Vec<DocType>) -> Self {
        self.doc_types = doc_types;
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.selected_branch = Some(branch.into());
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_force_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Requested document types, first occurrence wins
    pub fn requested_doc_types(&self) -> Vec<DocType> {
        let mut unique = Vec::new();
        for doc_type in &self.doc_types {
            if !unique.contains(doc_type) {
                unique.push(*doc_type);
            }
        }
        unique
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    New,
    Pending,
    Done,
    Failed,
}

impl JobStatus {
    /// Forward-only lifecycle. `Failed -> Pending` is the job-level retry re-entry;
    /// `Pending -> Pending` carries progress updates.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (New, Pending)
                | (New, Done)
                | (New, Failed)
                | (Pending, Pending)
                | (Pending, Done)
                | (Pending, Failed)
                | (Failed, Pending)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::New => "NEW",
            JobStatus::Pending => "PENDING",
            JobStatus::Done => "DONE",
            JobStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "NEW" => Ok(JobStatus::New),
            "PENDING" => Ok(JobStatus::Pending),
            "DONE" => Ok(JobStatus::Done),
            "FAILED" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DocType {
    Readme,
    Api,
    Contributing,
    Changelog,
    Architecture,
}

impl DocType {
    pub const ALL: [DocType; 5] = [
        DocType::Readme,
        DocType::Api,
        DocType::Contributing,
        DocType::Changelog,
        DocType::Architecture,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DocType::Readme => "README",
            DocType::Api => "API",
            DocType::Contributing => "CONTRIBUTING",
            DocType::Changelog => "CHANGELOG",
            DocType::Architecture => "ARCHITECTURE",
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            DocType::Readme => "README.md",
            DocType::Api => "API.md",
            DocType::Contributing => "CONTRIBUTING.md",
            DocType::Changelog => "CHANGELOG.md",
            DocType::Architecture => "ARCHITECTURE.md",
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocType::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!(
                    "unknown document type '{}'. Valid options: README, API, CONTRIBUTING, CHANGELOG, ARCHITECTURE",
                    s
                )
            })
    }
}

/// Pipeline stages with the progress each one reports on entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    CacheCheck,
    Clone,
    ReadFiles,
    Sentinel,
    Map,
    Analyze,
    Analyzed,
    Documents,
    Metrics,
    Persist,
    Complete,
}

impl Stage {
    pub fn progress(self) -> u8 {
        match self {
            Stage::Init => 5,
            Stage::CacheCheck => 10,
            Stage::Clone => 20,
            Stage::ReadFiles => 35,
            Stage::Sentinel => 40,
            Stage::Map => 45,
            Stage::Analyze => 55,
            Stage::Analyzed => 70,
            Stage::Documents => 85,
            Stage::Metrics => 88,
            Stage::Persist => 90,
            Stage::Complete => 100,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::CacheCheck => "cache_check",
            Stage::Clone => "clone",
            Stage::ReadFiles => "read_files",
            Stage::Sentinel => "sentinel",
            Stage::Map => "map",
            Stage::Analyze => "analyze",
            Stage::Analyzed => "analyzed",
            Stage::Documents => "documents",
            Stage::Metrics => "metrics",
            Stage::Persist => "persist",
            Stage::Complete => "complete",
        }
    }
}

/// One pipeline run as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisJob {
    pub id: String,
    pub repo_id: String,
    pub owner_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub logs: Vec<String>,
    pub commit_sha: Option<String>,
    pub scores: Option<Scores>,
    pub result_json: Option<serde_json::Value>,
    pub metrics_json: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisJob {
    pub fn new(id: impl Into<String>, repo_id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            repo_id: repo_id.into(),
            owner_id: owner_id.into(),
            status: JobStatus::New,
            progress: 0,
            message: "Queued".to_string(),
            logs: Vec::new(),
            commit_sha: None,
            scores: None,
            result_json: None,
            metrics_json: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// First 7 characters of a commit SHA, used as the document version
pub fn short_sha(sha: &str) -> String {
    sha.chars().take(7).collect()
}
