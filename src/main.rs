use repoaudit::cli::commands::{CliArgs, Commands};
use repoaudit::cli::handlers::{handle_analyze, handle_show};
use repoaudit::config::RepoAuditConfig;
use repoaudit::util::init_logging;
use repoaudit::VERSION;

use clap::Parser;
use tracing::debug;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    let config = match RepoAuditConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    init_logging(
        config
            .logging()
            .with_flags(args.log_level.as_deref(), args.verbose, args.quiet),
    );

    debug!("repoaudit v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match &args.command {
        Commands::Analyze(analyze_args) => handle_analyze(analyze_args, &config, args.quiet).await,
        Commands::Show(show_args) => handle_show(show_args, &config).await,
    };

    std::process::exit(exit_code);
}
