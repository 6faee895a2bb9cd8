//! repoaudit - AI-assisted technical audits and documentation for hosted repositories
//!
//! One analysis run takes a repository, a branch and a user-selected set of files and
//! drives them through a fixed sequence of stages: materialize a snapshot, screen the
//! user's instructions, map the project, run a deep technical audit, generate
//! documents and compute metrics. Every stage reports progress to a persistent job
//! record and a realtime channel, and the run always ends in DONE or FAILED.
//!
//! # Core Concepts
//!
//! - **Collaborators**: the source host ([`source::SourceHost`]), the persistence layer
//!   ([`store::Store`]) and the realtime channel ([`progress::RealtimeChannel`]) are
//!   traits injected through [`pipeline::PipelineContext`]
//! - **Model chains**: each stage calls an ordered list of models through
//!   [`llm::ModelCallExecutor`], which retries transient errors and falls through on
//!   anything else
//! - **Context budgets**: code sent to a model is packed by [`context::pack`] so the
//!   prompt never exceeds a character budget
//!
//! # Example Usage
//!
//! ```ignore
//! use repoaudit::{AnalysisOrchestrator, AnalysisRequest, PipelineContext, RepoAuditConfig};
//! use std::sync::Arc;
//!
//! async fn run(ctx: PipelineContext) -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = AnalysisOrchestrator::new(Arc::new(ctx));
//!     let request = AnalysisRequest::new("analysis-1", "user-1", vec!["src/lib.rs".into()]);
//!     let outcome = orchestrator.run(&request).await?;
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod context;
pub mod fs;
pub mod llm;
pub mod materializer;
pub mod metrics;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod source;
pub mod store;
pub mod util;

// Re-export key types for convenient access
pub use config::{ConfigError, RepoAuditConfig};
pub use llm::{BackendError, LLMClient, ModelCallExecutor, ModelChain, ModelExhaustionError};
pub use metrics::Scores;
pub use output::{ProjectMap, SentinelVerdict, TechnicalAudit};
pub use pipeline::{
    AnalysisJob, AnalysisOrchestrator, AnalysisOutcome, AnalysisRequest, DocType, JobRuntime,
    JobStatus, PipelineContext, PipelineError,
};
pub use store::{MemoryStore, SqliteStore, Store};
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
