//! Command line interface.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::style;

use commands::config::ConfigArgs;
use commands::run::RunArgs;

#[derive(Parser, Debug)]
#[command(name = "reqforge")]
#[command(about = "Extract verified business requirements from documents", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file to use instead of .reqforge/config.yaml
    #[arg(short, long, global = true, env = "REQFORGE_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the extraction pipeline over one or more documents
    Run(RunArgs),

    /// Configuration commands
    Config(ConfigArgs),

    /// List supported document formats
    Formats,
}

/// Print an error and exit with status 1.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let body = serde_json::json!({
            "success": false,
            "error": format!("{err:#}"),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );
    } else {
        eprintln!("{} {err:#}", style("Error:").red().bold());
    }
    std::process::exit(1);
}
