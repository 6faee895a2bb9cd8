use crate::pipeline::DocType;
use crate::source::RepoCoordinates;
use clap::{Parser, Subcommand, ValueEnum};

/// AI-assisted technical audits and documentation for hosted repositories
#[derive(Parser, Debug)]
#[command(
    name = "repoaudit",
    about = "AI-assisted technical audits and documentation for hosted repositories",
    version,
    author,
    long_about = "repoaudit clones a repository at a branch head, screens optional instructions, \
                  maps the project, runs a deep technical audit through a chain of language \
                  models and generates documentation. Results are stored in a local SQLite \
                  database."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Analyze a repository",
        long_about = "Runs one analysis job to completion and prints the stored job.\n\n\
                      Examples:\n  \
                      repoaudit analyze acme/widgets --files src/main.rs src/lib.rs\n  \
                      repoaudit analyze acme/widgets --files src/lib.rs --doc-types readme api\n  \
                      repoaudit analyze acme/widgets --files src/lib.rs --branch develop --force-refresh"
    )]
    Analyze(AnalyzeArgs),

    #[command(
        about = "Show a stored analysis",
        long_about = "Prints a stored analysis job and the documents of its repository.\n\n\
                      Examples:\n  \
                      repoaudit show 3f2a9c1e-...\n  \
                      repoaudit show 3f2a9c1e-... --format human"
    )]
    Show(ShowArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct AnalyzeArgs {
    #[arg(value_name = "OWNER/NAME", value_parser = parse_coordinates, help = "Repository to analyze")]
    pub repository: RepoCoordinates,

    #[arg(
        long,
        required = true,
        num_args = 1..,
        value_name = "PATH",
        help = "Repository-relative files to include in the analysis"
    )]
    pub files: Vec<String>,

    #[arg(
        long,
        num_args = 1..,
        value_name = "TYPE",
        value_parser = parse_doc_type,
        help = "Documents to generate: readme, api, contributing, changelog, architecture"
    )]
    pub doc_types: Vec<DocType>,

    #[arg(short = 'b', long, value_name = "BRANCH", help = "Branch to analyze (defaults to main)")]
    pub branch: Option<String>,

    #[arg(long, value_name = "TEXT", help = "Free-text instructions for the audit")]
    pub instructions: Option<String>,

    #[arg(long, help = "Re-run even when the commit has not changed")]
    pub force_refresh: bool,

    #[arg(long, default_value = "en", value_name = "LANG", help = "Output language")]
    pub language: String,

    #[arg(long, value_name = "ID", default_value = "local", help = "Owner the job runs for")]
    pub owner: String,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "json",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct ShowArgs {
    #[arg(value_name = "ANALYSIS_ID", help = "Analysis to show")]
    pub analysis_id: String,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "json",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}

fn parse_coordinates(s: &str) -> Result<RepoCoordinates, String> {
    s.parse()
}

fn parse_doc_type(s: &str) -> Result<DocType, String> {
    s.parse()
}
