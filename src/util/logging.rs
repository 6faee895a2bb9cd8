//! Structured logging setup for repoaudit
//!
//! Initializes the `tracing` subscriber once per process. Output goes to stderr so
//! that `repoaudit analyze` can print the finished job as JSON on stdout.
//!
//! # Example
//!
//! ```no_run
//! use repoaudit::util::logging;
//! use tracing::{info, warn};
//!
//! logging::init_from_env();
//!
//! info!(analysis_id = "a-1", "Running analysis");
//! warn!(stage = "sentinel", "Sentinel unavailable, defaulting to SAFE");
//! ```

use crate::config::RepoAuditConfig;
use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Configuration for logging initialization
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum level for the `repoaudit` target
    pub level: Level,

    /// JSON lines instead of human-readable output
    pub use_json: bool,

    /// Include the module target (e.g., repoaudit::pipeline) in logs
    pub include_target: bool,

    /// Include file and line number information
    pub include_location: bool,

    /// Include thread ID and name in logs
    pub include_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: true,
            include_location: false,
            include_thread_ids: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// JSON output with location and thread metadata, for log shipping
    pub fn production() -> Self {
        Self {
            level: Level::INFO,
            use_json: true,
            include_target: true,
            include_location: true,
            include_thread_ids: true,
        }
    }

    /// Configured level and output format, as loaded by `RepoAuditConfig`
    pub fn new(level: &str, use_json: bool) -> Self {
        Self {
            level: parse_level(level),
            use_json,
            ..Default::default()
        }
    }

    /// Applies CLI flags on top of the configured level.
    ///
    /// An explicit `--log-level` wins, then `-v` / `-q`, then the configured level.
    pub fn with_flags(mut self, log_level: Option<&str>, verbose: bool, quiet: bool) -> Self {
        if let Some(level_str) = log_level {
            self.level = parse_level(level_str);
        } else if verbose {
            self.level = Level::DEBUG;
        } else if quiet {
            self.level = Level::ERROR;
        }
        self
    }
}

/// Parses a log level, falling back to INFO for unknown values
///
/// ```
/// use repoaudit::util::logging::parse_level;
/// use tracing::Level;
///
/// assert_eq!(parse_level("debug"), Level::DEBUG);
/// assert_eq!(parse_level("bogus"), Level::INFO);
/// ```
pub fn parse_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}

fn build_filter(level: Level) -> EnvFilter {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = format!("repoaudit={}", level).parse() {
        filter = filter.add_directive(directive);
    }

    if env::var("RUST_LOG").is_err() {
        for noisy in ["h2=warn", "hyper=warn", "reqwest=warn", "sqlx=warn"] {
            if let Ok(directive) = noisy.parse() {
                filter = filter.add_directive(directive);
            }
        }
    }

    filter
}

/// Initializes the logging system. Only the first call has an effect.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = build_filter(config.level);

        if config.use_json {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location)
                        .with_thread_ids(config.include_thread_ids)
                        .with_thread_names(config.include_thread_ids),
                )
                .init();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location)
                        .with_thread_ids(config.include_thread_ids)
                        .with_thread_names(config.include_thread_ids),
                )
                .init();
        }
    });
}

pub fn init_default() {
    init_logging(LoggingConfig::default());
}

/// Initializes logging from `REPOAUDIT_LOG_LEVEL` and `REPOAUDIT_LOG_JSON`
pub fn init_from_env() {
    init_logging(RepoAuditConfig::default().logging());
}
