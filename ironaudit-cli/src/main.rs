use clap::Parser;

use ironaudit_cli::cli::{Cli, Commands};
use ironaudit_cli::commands::{self, ConfigSource};
use ironaudit_cli::error::CliError;
use ironaudit_cli::logging;
use ironaudit_cli::output::OutputWriter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let writer = OutputWriter::new(cli.output);
    let source = ConfigSource::resolve(cli.config.as_deref()).await;
    let loaded = source.load().await;

    // An unloadable settings file still gets logging, so `config validate`
    // can report on it.
    let mut general = loaded
        .as_ref()
        .map(|config| config.general.clone())
        .unwrap_or_default();
    if let Some(level) = cli.log_level {
        general.log_level = level;
    }
    logging::init_tracing(&general).map_err(|e| CliError::Config(e.to_string()))?;

    tracing::debug!(source = %source, "settings resolved");

    match cli.command {
        Commands::Audit(args) => commands::audit::execute(args, loaded?, &writer).await,
        Commands::Rules(args) => commands::rules::execute(args, &loaded?, &writer).await,
        Commands::Config(args) => commands::config::execute(args, &source, &writer).await,
    }
}
