//! Settings and configuration utilities.
//!
//! This module reads settings from $HOME/.git-promotion/settings.json and uses
//! them as a fallback for environment variables.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::repoaccess::github::DEFAULT_API_URL;
use crate::repoaccess::CommitAuthor;

/// Access token for the hosting API.
pub const ENV_ACCESS_TOKEN: &str = "GIT_ACCESS_TOKEN";
/// Hosting API base URL.
pub const ENV_API_URL: &str = "GITHUB_API_URL";
/// Base URL linked from pull request bodies.
pub const ENV_EXTERNAL_URL: &str = "EXTERNAL_URL";
/// Commit author name.
pub const ENV_AUTHOR_NAME: &str = "GIT_PROMOTION_AUTHOR_NAME";
/// Commit author e-mail.
pub const ENV_AUTHOR_EMAIL: &str = "GIT_PROMOTION_AUTHOR_EMAIL";

/// Settings loaded from $HOME/.git-promotion/settings.json.
#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    /// Environment variable overrides.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Settings {
    /// Loads settings from the default location.
    pub fn load() -> Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Self::load_from_path(&settings_path)
    }

    /// Loads settings from a specific path.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // If file doesn't exist, return default settings
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

        serde_json::from_str::<Self>(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))
    }

    /// Returns the default settings path.
    pub fn get_settings_path() -> Result<PathBuf> {
        let home_dir = dirs::home_dir().context("Failed to determine home directory")?;

        Ok(home_dir.join(".git-promotion").join("settings.json"))
    }

    /// Returns an environment variable with fallback to settings.
    pub fn get_env_var(&self, key: &str) -> Option<String> {
        match env::var(key) {
            Ok(value) => Some(value),
            Err(_) => self.env.get(key).cloned(),
        }
    }

    /// Resolves the runtime settings of a promotion.
    pub fn service_settings(&self) -> ServiceSettings {
        let defaults = CommitAuthor::default();
        ServiceSettings {
            api_url: self
                .get_env_var(ENV_API_URL)
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            access_token: self.get_env_var(ENV_ACCESS_TOKEN).filter(|t| !t.is_empty()),
            external_url: self.get_env_var(ENV_EXTERNAL_URL).unwrap_or_default(),
            author: CommitAuthor {
                name: self.get_env_var(ENV_AUTHOR_NAME).unwrap_or(defaults.name),
                email: self.get_env_var(ENV_AUTHOR_EMAIL).unwrap_or(defaults.email),
            },
        }
    }
}

/// Runtime settings resolved from the environment and settings file.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Hosting API base URL.
    pub api_url: String,
    /// Hosting API token, if any.
    pub access_token: Option<String>,
    /// Base URL linked from pull request bodies.
    pub external_url: String,
    /// Commit identity.
    pub author: CommitAuthor,
}
