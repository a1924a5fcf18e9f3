//! reqforge CLI entry point.

use clap::Parser;

use reqforge::cli::{handle_error, Cli, Commands};
use reqforge::infrastructure::config::ConfigLoader;
use reqforge::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match cli.config.as_deref() {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(err) => handle_error(err, cli.json),
    };

    let _logger = match LoggerImpl::init(&LogConfig::from(&config.logging)) {
        Ok(logger) => logger,
        Err(err) => handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Run(args) => reqforge::cli::commands::run::execute(args, &config, cli.json).await,
        Commands::Config(args) => {
            reqforge::cli::commands::config::execute(args, &config, cli.json).await
        }
        Commands::Formats => reqforge::cli::commands::formats::execute(cli.json).await,
    };

    if let Err(err) = result {
        handle_error(err, cli.json);
    }
}
