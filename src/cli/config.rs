//! Configuration-related CLI commands.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;

use crate::config::{ConfigReader, DirectorySource, PromotionConfig};
use crate::event::{TriggerEvent, DEFAULT_NEXT_STAGE};

/// Configuration operations.
#[derive(Parser)]
pub struct ConfigCommand {
    /// Configuration subcommand to execute.
    #[command(subcommand)]
    pub command: ConfigSubcommands,
}

/// Configuration subcommands.
#[derive(Subcommand)]
pub enum ConfigSubcommands {
    /// Shows the configuration resolved for a trigger event.
    Show(ShowCommand),
    /// Validates a configuration file.
    Validate(ValidateCommand),
}

/// Show command options.
#[derive(Parser)]
pub struct ShowCommand {
    /// Trigger event JSON file.
    #[arg(long, value_name = "FILE")]
    pub event: PathBuf,

    /// Directory holding project/stage/service configuration resources.
    #[arg(long, value_name = "DIR")]
    pub config_dir: PathBuf,

    /// Stage the promotion targets.
    #[arg(long, default_value = DEFAULT_NEXT_STAGE)]
    pub next_stage: String,
}

/// Validate command options.
#[derive(Parser)]
pub struct ValidateCommand {
    /// Configuration file to validate.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

impl ConfigCommand {
    /// Executes the config command.
    pub fn execute(self) -> Result<()> {
        match self.command {
            ConfigSubcommands::Show(show_cmd) => show_cmd.execute(),
            ConfigSubcommands::Validate(validate_cmd) => validate_cmd.execute(),
        }
    }
}

impl ShowCommand {
    /// Executes the show command.
    pub fn execute(self) -> Result<()> {
        let event = TriggerEvent::from_file(&self.event)?;
        let (config, hash) = load_resolved_config(&self.config_dir, &event, &self.next_stage)?;
        println!("# hash: {hash}");
        print!("{}", config.to_yaml()?);
        Ok(())
    }
}

impl ValidateCommand {
    /// Executes the validate command.
    pub fn execute(self) -> Result<()> {
        let content = fs::read(&self.file)
            .with_context(|| format!("Failed to read file: {}", self.file.display()))?;
        let config = PromotionConfig::from_slice(&content)?;
        config.validate()?;
        println!(
            "✓ {} is valid ({} path mapping(s))",
            self.file.display(),
            config.spec.paths.len()
        );
        Ok(())
    }
}

/// Reads the configuration for `event`, resolves placeholders and validates it.
///
/// Returns the configuration and the hash of the raw resource.
pub(crate) fn load_resolved_config(
    config_dir: &Path,
    event: &TriggerEvent,
    next_stage: &str,
) -> Result<(PromotionConfig, String)> {
    let source = DirectorySource::new(
        config_dir,
        &event.data.project,
        &event.data.stage,
        &event.data.service,
    );
    let (mut config, hash) = ConfigReader::new(source)
        .read(event.gitcommitid.as_deref())
        .context("could not retrieve config for git-promotion")?;
    config.resolve_placeholders(&event.placeholders(next_stage));
    config.validate()?;
    debug!(project = %event.data.project, hash = %hash, "Resolved promotion configuration");
    Ok((config, hash))
}
