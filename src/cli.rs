//! CLI interface for git-promotion.

use anyhow::Result;
use clap::{Parser, Subcommand};

pub mod config;
pub mod promote;
pub mod replace;

/// git-promotion: promotes files between stages through pull requests.
#[derive(Parser)]
#[command(name = "git-promotion")]
#[command(about = "Promotes files between stages through pull requests", long_about = None)]
#[command(version)]
pub struct Cli {
    /// The main command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Main command categories.
#[derive(Subcommand)]
pub enum Commands {
    /// Runs a promotion for a trigger event.
    Promote(promote::PromoteCommand),
    /// Promotion configuration operations.
    Config(config::ConfigCommand),
    /// Applies marker substitution to a local file.
    Replace(replace::ReplaceCommand),
}

impl Cli {
    /// Executes the CLI command.
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Promote(promote_cmd) => promote_cmd.execute().await,
            Commands::Config(config_cmd) => config_cmd.execute(),
            Commands::Replace(replace_cmd) => replace_cmd.execute(),
        }
    }
}

/// Parses a `--field key=value` argument.
pub(crate) fn parse_field(s: &str) -> Result<(String, String)> {
    let (k, v) = s
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("Invalid --field format '{}'. Expected key=value", s))?;
    Ok((k.to_string(), v.to_string()))
}
