//! Configuration management for repoaudit
//!
//! Settings are loaded from environment variables with defaults. Model lists are
//! comma-separated and tried in order; each model gets its own transient-error retry
//! budget.
//!
//! # Environment Variables
//!
//! ## Models
//! - `REPOAUDIT_FAST_MODELS`: Sentinel and Mapper chain - default: "gpt-4o-mini"
//! - `REPOAUDIT_POWERFUL_MODELS`: first Deep Analyzer tier - default: "claude-sonnet-4-5"
//! - `REPOAUDIT_ARCHITECT_MODELS`: second Deep Analyzer tier - default: "gpt-4o"
//! - `REPOAUDIT_FALLBACK_MODELS`: last Deep Analyzer tier - default: "gpt-4o-mini"
//! - `REPOAUDIT_WRITER_MODELS`: document writers - default: "gpt-4o-mini"
//! - `REPOAUDIT_REQUEST_TIMEOUT`: per model call, seconds - default: "120"
//! - `REPOAUDIT_MODEL_MAX_ATTEMPTS`: attempts per model - default: "3"
//!
//! ## Pipeline
//! - `REPOAUDIT_ANALYSIS_BUDGET`, `REPOAUDIT_MAP_BUDGET`, `REPOAUDIT_WRITER_BUDGET`: context
//!   budgets in characters - defaults: 400000, 60000, 80000
//! - `REPOAUDIT_PREVIEW_CHARS`: Mapper preview prefix - default: "600"
//! - `REPOAUDIT_SENTINEL_MIN_CHARS`: shorter instructions skip the Sentinel - default: "10"
//! - `REPOAUDIT_MAX_FILE_SIZE`: bytes - default: "1048576"
//! - `REPOAUDIT_WORKDIR`: parent directory of snapshots - default: system temp
//!
//! ## Runtime
//! - `REPOAUDIT_DATABASE`: SQLite path - default: "repoaudit.db"
//! - `REPOAUDIT_GITHUB_API`: source-host API base - default: "https://api.github.com"
//! - `REPOAUDIT_JOB_MAX_ATTEMPTS`: job-level attempts - default: "3"
//! - `REPOAUDIT_JOB_TIMEOUT`: job wall-clock bound, seconds - default: "1800"
//! - `REPOAUDIT_OWNER_CONCURRENCY`: concurrent jobs per owner - default: "2"
//! - `REPOAUDIT_CALL_LOG`: JSONL file receiving every model attempt - default: unset
//! - `REPOAUDIT_LOG_LEVEL`, `REPOAUDIT_LOG_JSON`: logging - default: "info", "false"
//!
//! Provider credentials are read by the genai library itself (`OPENAI_API_KEY`,
//! `ANTHROPIC_API_KEY`, `GEMINI_API_KEY`, `OLLAMA_HOST`, ...).

use crate::llm::{CallLogger, GenAIClient, ModelCallExecutor, ModelChain, ModelProvider};
use crate::pipeline::{ModelTiers, PipelineConfig};
use crate::util::{LoggingConfig, RetryPolicy};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_FAST_MODELS: &str = "gpt-4o-mini";
const DEFAULT_POWERFUL_MODELS: &str = "claude-sonnet-4-5";
const DEFAULT_ARCHITECT_MODELS: &str = "gpt-4o";
const DEFAULT_FALLBACK_MODELS: &str = "gpt-4o-mini";
const DEFAULT_WRITER_MODELS: &str = "gpt-4o-mini";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MODEL_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_DATABASE: &str = "repoaudit.db";
const DEFAULT_GITHUB_API: &str = "https://api.github.com";
const DEFAULT_JOB_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_JOB_TIMEOUT_SECS: u64 = 1800;
const DEFAULT_OWNER_CONCURRENCY: usize = 2;
const DEFAULT_LOG_LEVEL: &str = "info";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// Failed to parse configuration value
    #[error("Failed to parse {field}: {error}")]
    ParseError { field: String, error: String },
}

#[derive(Debug, Clone)]
pub struct RepoAuditConfig {
    pub fast_models: Vec<String>,
    pub powerful_models: Vec<String>,
    pub architect_models: Vec<String>,
    pub fallback_models: Vec<String>,
    pub writer_models: Vec<String>,

    /// Per model call timeout in seconds
    pub request_timeout_secs: u64,
    pub model_max_attempts: u32,

    pub pipeline: PipelineConfig,

    pub database: PathBuf,
    pub github_api: String,
    pub job_max_attempts: u32,
    pub job_timeout_secs: u64,
    pub owner_concurrency: usize,
    pub call_log: Option<PathBuf>,

    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    pub log_json: bool,
}

fn env_list(key: &str, default: &str) -> Vec<String> {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn check<T: FromStr>(value: &str) -> Result<(), String>
where
    T::Err: fmt::Display,
{
    value.trim().parse::<T>().map(|_| ()).map_err(|e| e.to_string())
}

type Check = fn(&str) -> Result<(), String>;

/// Typed variables and the parser each must satisfy
const TYPED_VARS: &[(&str, Check)] = &[
    ("REPOAUDIT_ANALYSIS_BUDGET", check::<usize>),
    ("REPOAUDIT_MAP_BUDGET", check::<usize>),
    ("REPOAUDIT_PREVIEW_CHARS", check::<usize>),
    ("REPOAUDIT_WRITER_BUDGET", check::<usize>),
    ("REPOAUDIT_SENTINEL_MIN_CHARS", check::<usize>),
    ("REPOAUDIT_MAX_FILE_SIZE", check::<u64>),
    ("REPOAUDIT_REQUEST_TIMEOUT", check::<u64>),
    ("REPOAUDIT_MODEL_MAX_ATTEMPTS", check::<u32>),
    ("REPOAUDIT_JOB_MAX_ATTEMPTS", check::<u32>),
    ("REPOAUDIT_JOB_TIMEOUT", check::<u64>),
    ("REPOAUDIT_OWNER_CONCURRENCY", check::<usize>),
    ("REPOAUDIT_LOG_JSON", check::<bool>),
];

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

impl Default for RepoAuditConfig {
    /// Loads `REPOAUDIT_*` variables, falling back to defaults for anything missing
    /// or unparsable
    fn default() -> Self {
        let defaults = PipelineConfig::default();
        let pipeline = PipelineConfig::new()
            .with_analysis_budget(env_parse("REPOAUDIT_ANALYSIS_BUDGET", defaults.analysis_budget))
            .with_map_budget(env_parse("REPOAUDIT_MAP_BUDGET", defaults.map_budget))
            .with_preview_chars(env_parse("REPOAUDIT_PREVIEW_CHARS", defaults.preview_chars))
            .with_writer_budget(env_parse("REPOAUDIT_WRITER_BUDGET", defaults.writer_budget))
            .with_sentinel_min_chars(env_parse(
                "REPOAUDIT_SENTINEL_MIN_CHARS",
                defaults.sentinel_min_chars,
            ))
            .with_max_file_size(env_parse("REPOAUDIT_MAX_FILE_SIZE", defaults.max_file_size))
            .with_workdir(env::var("REPOAUDIT_WORKDIR").ok().map(PathBuf::from));

        Self {
            fast_models: env_list("REPOAUDIT_FAST_MODELS", DEFAULT_FAST_MODELS),
            powerful_models: env_list("REPOAUDIT_POWERFUL_MODELS", DEFAULT_POWERFUL_MODELS),
            architect_models: env_list("REPOAUDIT_ARCHITECT_MODELS", DEFAULT_ARCHITECT_MODELS),
            fallback_models: env_list("REPOAUDIT_FALLBACK_MODELS", DEFAULT_FALLBACK_MODELS),
            writer_models: env_list("REPOAUDIT_WRITER_MODELS", DEFAULT_WRITER_MODELS),
            request_timeout_secs: env_parse("REPOAUDIT_REQUEST_TIMEOUT", DEFAULT_REQUEST_TIMEOUT_SECS),
            model_max_attempts: env_parse("REPOAUDIT_MODEL_MAX_ATTEMPTS", DEFAULT_MODEL_MAX_ATTEMPTS),
            pipeline,
            database: env::var("REPOAUDIT_DATABASE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATABASE)),
            github_api: env::var("REPOAUDIT_GITHUB_API")
                .unwrap_or_else(|_| DEFAULT_GITHUB_API.to_string()),
            job_max_attempts: env_parse("REPOAUDIT_JOB_MAX_ATTEMPTS", DEFAULT_JOB_MAX_ATTEMPTS),
            job_timeout_secs: env_parse("REPOAUDIT_JOB_TIMEOUT", DEFAULT_JOB_TIMEOUT_SECS),
            owner_concurrency: env_parse("REPOAUDIT_OWNER_CONCURRENCY", DEFAULT_OWNER_CONCURRENCY),
            call_log: env::var("REPOAUDIT_CALL_LOG").ok().map(PathBuf::from),
            log_level: env::var("REPOAUDIT_LOG_LEVEL")
                .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
                .to_lowercase(),
            log_json: env_parse("REPOAUDIT_LOG_JSON", false),
        }
    }
}

impl RepoAuditConfig {
    /// Strict load for the CLI: like `default()`, but a set variable that does not
    /// parse is an error instead of silently becoming the default
    pub fn from_env() -> Result<Self, ConfigError> {
        for (key, check) in TYPED_VARS {
            if let Ok(value) = env::var(key) {
                check(&value).map_err(|error| ConfigError::ParseError {
                    field: key.to_string(),
                    error: format!("'{}': {}", value, error),
                })?;
            }
        }
        Ok(Self::default())
    }

    /// Checks value ranges and that every stage has at least one model
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 || self.request_timeout_secs > 600 {
            return Err(ConfigError::ValidationFailed(
                "Request timeout must be between 1 second and 10 minutes".to_string(),
            ));
        }

        for (name, models) in [
            ("REPOAUDIT_FAST_MODELS", &self.fast_models),
            ("REPOAUDIT_WRITER_MODELS", &self.writer_models),
        ] {
            if models.is_empty() {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} must name at least one model",
                    name
                )));
            }
        }
        if self.powerful_models.is_empty()
            && self.architect_models.is_empty()
            && self.fallback_models.is_empty()
        {
            return Err(ConfigError::ValidationFailed(
                "The analysis stage needs at least one powerful, architect or fallback model"
                    .to_string(),
            ));
        }

        let p = &self.pipeline;
        if p.analysis_budget < 1_000 || p.map_budget < 1_000 || p.writer_budget < 1_000 {
            return Err(ConfigError::ValidationFailed(
                "Context budgets must be at least 1000 characters".to_string(),
            ));
        }
        if p.preview_chars == 0 {
            return Err(ConfigError::ValidationFailed(
                "Preview length must be at least 1 character".to_string(),
            ));
        }
        if p.max_file_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "Max file size must be at least 1 byte".to_string(),
            ));
        }

        if self.job_max_attempts == 0 || self.model_max_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "Attempt counts must be at least 1".to_string(),
            ));
        }
        if self.job_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "Job timeout must be at least 1 second".to_string(),
            ));
        }
        if self.owner_concurrency == 0 {
            return Err(ConfigError::ValidationFailed(
                "Owner concurrency must be at least 1".to_string(),
            ));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        Ok(())
    }

    /// Logging setup for the configured level and format; CLI flags apply on top
    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig::new(&self.log_level, self.log_json)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        self.pipeline.clone()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn job_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.job_max_attempts).with_initial_backoff(Duration::from_secs(10))
    }

    fn chain(&self, models: &[String]) -> ModelChain {
        ModelChain::new(
            models
                .iter()
                .map(|model| {
                    ModelProvider::new(Arc::new(GenAIClient::new(model.clone(), self.request_timeout())))
                        .with_id(model.clone())
                        .with_retry(RetryPolicy::new(self.model_max_attempts))
                        .with_timeout(self.request_timeout())
                })
                .collect(),
        )
    }

    /// Fallback chains per tier; the analysis chain is powerful, then architect,
    /// then fallback
    pub fn model_chains(&self) -> ModelTiers {
        ModelTiers::new(
            self.chain(&self.fast_models),
            self.chain(&self.powerful_models)
                .then(self.chain(&self.architect_models))
                .then(self.chain(&self.fallback_models)),
            self.chain(&self.writer_models),
        )
    }

    pub fn executor(&self) -> ModelCallExecutor {
        ModelCallExecutor::new(self.request_timeout())
            .with_call_log(Arc::new(CallLogger::new(self.call_log.clone())))
    }
}

impl fmt::Display for RepoAuditConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "repoaudit configuration:")?;
        writeln!(f, "  Fast models: {}", self.fast_models.join(", "))?;
        writeln!(
            f,
            "  Analysis models: {} | {} | {}",
            self.powerful_models.join(", "),
            self.architect_models.join(", "),
            self.fallback_models.join(", ")
        )?;
        writeln!(f, "  Writer models: {}", self.writer_models.join(", "))?;
        writeln!(f, "  Request Timeout: {}s", self.request_timeout_secs)?;
        writeln!(
            f,
            "  Budgets: analysis {} / map {} / writer {} chars",
            self.pipeline.analysis_budget, self.pipeline.map_budget, self.pipeline.writer_budget
        )?;
        writeln!(f, "  Database: {}", self.database.display())?;
        writeln!(
            f,
            "  Jobs: {} attempts, {}s timeout, {} per owner",
            self.job_max_attempts, self.job_timeout_secs, self.owner_concurrency
        )?;
        writeln!(f, "  Log Level: {}", self.log_level)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    /// Helper to temporarily set environment variables for testing
    struct EnvGuard {
        key: String,
        old_value: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let old_value = env::var(key).ok();
            env::set_var(key, value);
            Self {
                key: key.to_string(),
                old_value,
            }
        }

        fn unset(key: &str) -> Self {
            let old_value = env::var(key).ok();
            env::remove_var(key);
            Self {
                key: key.to_string(),
                old_value,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.old_value {
                Some(v) => env::set_var(&self.key, v),
                None => env::remove_var(&self.key),
            }
        }
    }

    #[test]
    #[serial]
    fn test_default_configuration() {
        let _guards = vec![
            EnvGuard::unset("REPOAUDIT_FAST_MODELS"),
            EnvGuard::unset("REPOAUDIT_ANALYSIS_BUDGET"),
            EnvGuard::unset("REPOAUDIT_JOB_TIMEOUT"),
            EnvGuard::set("REPOAUDIT_LOG_LEVEL", DEFAULT_LOG_LEVEL),
        ];

        let config = RepoAuditConfig::default();

        assert_eq!(config.fast_models, vec!["gpt-4o-mini"]);
        assert_eq!(config.pipeline.analysis_budget, 400_000);
        assert_eq!(config.job_timeout_secs, DEFAULT_JOB_TIMEOUT_SECS);
        assert_eq!(config.log_level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_environment_variable_parsing() {
        let _guards = vec![
            EnvGuard::set("REPOAUDIT_POWERFUL_MODELS", "claude-opus-4-1, gemini-2.5-pro"),
            EnvGuard::set("REPOAUDIT_ARCHITECT_MODELS", ""),
            EnvGuard::set("REPOAUDIT_MAP_BUDGET", "20000"),
            EnvGuard::set("REPOAUDIT_REQUEST_TIMEOUT", "not-a-number"),
            EnvGuard::set("REPOAUDIT_OWNER_CONCURRENCY", "4"),
            EnvGuard::set("REPOAUDIT_LOG_LEVEL", "DEBUG"),
            EnvGuard::set("REPOAUDIT_LOG_JSON", "true"),
        ];

        let config = RepoAuditConfig::default();

        assert_eq!(config.powerful_models, vec!["claude-opus-4-1", "gemini-2.5-pro"]);
        assert!(config.architect_models.is_empty());
        assert_eq!(config.pipeline.map_budget, 20_000);
        assert_eq!(config.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
        assert_eq!(config.owner_concurrency, 4);
        assert_eq!(config.log_level, "debug");
        assert!(config.log_json);
    }

    #[test]
    #[serial]
    fn test_strict_load_reports_unparsable_values() {
        let _guards = vec![
            EnvGuard::set("REPOAUDIT_JOB_TIMEOUT", "soon"),
            EnvGuard::unset("REPOAUDIT_REQUEST_TIMEOUT"),
        ];

        let err = RepoAuditConfig::from_env().unwrap_err();
        match err {
            ConfigError::ParseError { ref field, ref error } => {
                assert_eq!(field, "REPOAUDIT_JOB_TIMEOUT");
                assert!(error.contains("'soon'"));
            }
            other => panic!("Expected ParseError, got {:?}", other),
        }
        assert!(err.to_string().starts_with("Failed to parse REPOAUDIT_JOB_TIMEOUT"));
    }

    #[test]
    #[serial]
    fn test_strict_load_accepts_valid_values() {
        let _guards = vec![
            EnvGuard::set("REPOAUDIT_JOB_TIMEOUT", " 60 "),
            EnvGuard::set("REPOAUDIT_LOG_JSON", "false"),
            EnvGuard::unset("REPOAUDIT_REQUEST_TIMEOUT"),
        ];

        let config = RepoAuditConfig::from_env().unwrap();
        assert_eq!(config.job_timeout_secs, 60);
        assert!(!config.logging().use_json);
    }

    #[test]
    #[serial]
    fn test_analysis_chain_concatenates_tiers() {
        let _guards = vec![
            EnvGuard::set("REPOAUDIT_POWERFUL_MODELS", "p1,p2"),
            EnvGuard::set("REPOAUDIT_ARCHITECT_MODELS", "a1"),
            EnvGuard::set("REPOAUDIT_FALLBACK_MODELS", "f1"),
        ];

        let tiers = RepoAuditConfig::default().model_chains();
        assert_eq!(tiers.analysis.ids(), vec!["p1", "p2", "a1", "f1"]);
    }

    #[test]
    #[serial]
    fn test_configuration_validation() {
        let mut config = RepoAuditConfig::default();
        config.log_level = "info".to_string();
        assert!(config.validate().is_ok());

        let mut bad = config.clone();
        bad.request_timeout_secs = 0;
        assert!(bad.validate().is_err());

        let mut bad = config.clone();
        bad.writer_models.clear();
        assert!(bad.validate().is_err());

        let mut bad = config.clone();
        bad.powerful_models.clear();
        bad.architect_models.clear();
        bad.fallback_models.clear();
        assert!(bad.validate().is_err());

        let mut bad = config.clone();
        bad.pipeline.map_budget = 10;
        assert!(bad.validate().is_err());

        let mut bad = config;
        bad.log_level = "loud".to_string();
        assert!(bad.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_config_display() {
        let display = format!("{}", RepoAuditConfig::default());
        assert!(display.contains("repoaudit configuration:"));
        assert!(display.contains("Writer models:"));
    }
}
