//! Utility modules for repoaudit
//!
//! - Structured logging setup and configuration
//! - Retry policy shared by model calls and job attempts

pub mod logging;
pub mod retry;

pub use logging::{init_default, init_from_env, init_logging, LoggingConfig};
pub use retry::RetryPolicy;
