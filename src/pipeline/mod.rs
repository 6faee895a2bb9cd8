pub mod config;
pub mod context;
pub mod error;
pub mod job;
pub mod orchestrator;
pub mod persist;
pub mod phases;
pub mod runtime;
pub mod status;

pub use config::PipelineConfig;
pub use context::{ModelTiers, PipelineContext};
pub use error::PipelineError;
pub use job::{AnalysisJob, AnalysisRequest, DocType, JobStatus, Stage};
pub use orchestrator::{AnalysisOrchestrator, AnalysisOutcome};
pub use runtime::JobRuntime;
pub use status::StatusReporter;
