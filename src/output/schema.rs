//! Stage output schemas
//!
//! One strict structure per model-backed stage. The executor deserializes raw model
//! output into these types and runs [`Validate`] before accepting it, so downstream
//! stages never see loosely shaped JSON. Each type also derives a JSON Schema that is
//! sent to the model with the prompt.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Semantic checks beyond what deserialization enforces
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

/// Structural map of the codebase produced by the Mapper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMap {
    /// One-paragraph description of what the project is
    pub overview: String,
    #[serde(default)]
    pub stack: StackSummary,
    #[serde(default)]
    pub modules: Vec<ModuleInfo>,
    /// Mermaid (or plain text) diagram of module dependencies
    #[serde(default)]
    pub diagram: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StackSummary {
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub frameworks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ModuleInfo {
    pub path: String,
    /// e.g. "service", "library", "cli", "config"
    #[serde(rename = "type")]
    pub kind: String,
    pub responsibility: String,
    /// Paths of other modules this one depends on
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl ProjectMap {
    pub fn stack_line(&self) -> String {
        let mut parts = self.stack.languages.clone();
        parts.extend(self.stack.frameworks.iter().cloned());
        if parts.is_empty() {
            "unknown".to_string()
        } else {
            parts.join(", ")
        }
    }
}

impl Validate for ProjectMap {
    fn validate(&self) -> Result<(), String> {
        if self.overview.trim().is_empty() {
            return Err("overview must not be empty".to_string());
        }
        if self.modules.is_empty() {
            return Err("modules must list at least one module".to_string());
        }
        if let Some(module) = self.modules.iter().find(|m| m.path.trim().is_empty()) {
            return Err(format!(
                "module '{}' has an empty path",
                module.responsibility
            ));
        }
        Ok(())
    }
}

/// Structured technical audit produced by the Deep Analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TechnicalAudit {
    pub executive_summary: String,
    pub sections: AuditSections,
    #[serde(default)]
    pub onboarding_guide: String,
    #[serde(default)]
    pub refactor_targets: Vec<RefactorTarget>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditSections {
    #[serde(default)]
    pub data_flow: String,
    pub security: SecurityFindings,
    #[serde(default)]
    pub tech_debt: Vec<String>,
    #[serde(default)]
    pub performance_bottlenecks: Vec<String>,
    #[serde(default)]
    pub api_structure: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SecurityFindings {
    /// 1 (critical issues) to 10 (no known issues)
    pub score: u8,
    #[serde(default)]
    pub risks: Vec<String>,
}

/// Refactor urgency. Models are inconsistent about casing, so any casing of the
/// three names is accepted; output always uses the canonical form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            _ => Err(format!(
                "unknown priority '{}', expected High, Medium or Low",
                s
            )),
        }
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RefactorTarget {
    /// Path of the file the finding cites
    pub file: String,
    pub priority: Priority,
    pub description: String,
    #[serde(default)]
    pub before: String,
    #[serde(default)]
    pub after: String,
}

impl TechnicalAudit {
    pub fn high_priority_refactors(&self) -> usize {
        self.refactor_targets
            .iter()
            .filter(|t| t.priority == Priority::High)
            .count()
    }
}

impl Validate for TechnicalAudit {
    fn validate(&self) -> Result<(), String> {
        if self.executive_summary.trim().is_empty() {
            return Err("executiveSummary must not be empty".to_string());
        }
        let score = self.sections.security.score;
        if !(1..=10).contains(&score) {
            return Err(format!("security score {} is outside 1..=10", score));
        }
        for target in &self.refactor_targets {
            if target.file.trim().is_empty() {
                return Err(format!(
                    "refactor target '{}' does not cite a file",
                    target.description
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum SafetyStatus {
    Safe,
    Unsafe,
}

impl fmt::Display for SafetyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafetyStatus::Safe => write!(f, "SAFE"),
            SafetyStatus::Unsafe => write!(f, "UNSAFE"),
        }
    }
}

/// Classification of the caller's free-text instructions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SentinelVerdict {
    pub status: SafetyStatus,
    #[serde(default)]
    pub reason: String,
}

impl SentinelVerdict {
    pub fn safe(reason: impl Into<String>) -> Self {
        Self {
            status: SafetyStatus::Safe,
            reason: reason.into(),
        }
    }

    pub fn is_unsafe(&self) -> bool {
        self.status == SafetyStatus::Unsafe
    }
}

impl Validate for SentinelVerdict {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}
