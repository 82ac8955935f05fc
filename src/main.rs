use anyhow::Result;
use clap::Parser;
use log::{error, info};

mod cli;

use cli::{Cli, Commands};
use cli::commands::{handle_schema_command, handle_submit_command, handle_validate_command};
use crm_form_actions::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    // Log to a file when asked, to stderr otherwise
    let mut logger = env_logger::Builder::from_default_env();
    if let Some(path) = cli.log_file.as_ref().or(config.settings.log_file.as_ref()) {
        let log_file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        logger.target(env_logger::Target::Pipe(Box::new(log_file)));
    }
    logger.init();
    info!("Starting crm-form-actions");

    let result = match cli.command {
        Commands::Schema(args) => handle_schema_command(args, &config).await,
        Commands::Validate(args) => handle_validate_command(args, &config).await,
        Commands::Submit(args) => handle_submit_command(args, &config).await,
    };
    if let Err(e) = &result {
        error!("Command failed: {:#}", e);
    }
    result
}
