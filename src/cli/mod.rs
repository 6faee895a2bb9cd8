pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{AnalyzeArgs, CliArgs, Commands, ShowArgs};
pub use output::{OutputFormat, OutputFormatter};
