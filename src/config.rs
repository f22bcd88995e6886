//! Promotion configuration.
//!
//! The configuration is a YAML resource named [`CONFIG_RESOURCE_NAME`]:
//!
//! ```yaml
//! apiVersion: keptn.sh/v1
//! kind: GitPromotion
//! spec:
//!   strategy: flat-pr
//!   target:
//!     repo: https://github.com/owner/${project}-config
//!     secret: git-token
//!     provider: github
//!   paths:
//!     - source: envs/${stage}
//!       target: envs/${nextstage}
//!     - target: shared/versions.yaml
//! ```
//!
//! Unknown fields are rejected.

mod reader;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use reader::{ConfigReader, DirectorySource, ResourceSource, ResourceTier};

/// Name of the configuration resource.
pub const CONFIG_RESOURCE_NAME: &str = "git-promotion.yaml";

/// Opens one pull request with all changes of a promotion.
pub const STRATEGY_FLAT_PR: &str = "flat-pr";

/// Recognised but not implemented.
pub const STRATEGY_BRANCH: &str = "branch";

/// The only supported hosting provider.
pub const PROVIDER_GITHUB: &str = "github";

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No tier held the configuration resource.
    #[error("Unable to find git promotion configuration {0} in any service, stage or project resources")]
    NotFound(String),

    /// Reading a resource failed.
    #[error("Failed to read configuration resource {path}: {source}")]
    Io {
        /// Resource location.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The resource is not a valid configuration document.
    #[error("Error parsing git promotion configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The configuration parsed but cannot be used.
    #[error("Invalid git promotion configuration: {0}")]
    Invalid(String),
}

/// Root of the configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PromotionConfig {
    /// Document API version.
    #[serde(rename = "apiVersion", default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    /// Document kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Promotion settings.
    pub spec: PromotionSpec,
}

/// Promotion settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PromotionSpec {
    /// Promotion strategy, `flat-pr` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    /// Target repository.
    #[serde(default)]
    pub target: Target,
    /// Paths taking part in the promotion.
    #[serde(default)]
    pub paths: Vec<PathMapping>,
}

/// Target repository settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Target {
    /// Repository reference, e.g. `https://github.com/owner/repo`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    /// Name of the secret holding the access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// Hosting provider, `github` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

/// A source/target path pair.
///
/// Without a `source` the target path is promoted in place.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PathMapping {
    /// Path the content is read from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Path the content is written to.
    pub target: String,
}

impl PathMapping {
    /// A mapping promoting `target` in place.
    pub fn in_place(target: impl Into<String>) -> Self {
        Self {
            source: None,
            target: target.into(),
        }
    }

    /// A mapping copying `source` to `target`.
    pub fn renamed(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            target: target.into(),
        }
    }
}

impl PromotionConfig {
    /// Parses a configuration document, rejecting unknown fields.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Parses a configuration resource.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_slice(bytes)?)
    }

    /// Serializes the configuration back to YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Returns the strategy, defaulting to `flat-pr`.
    pub fn strategy(&self) -> &str {
        self.spec.strategy.as_deref().unwrap_or(STRATEGY_FLAT_PR)
    }

    /// Returns the target repository reference.
    pub fn repo(&self) -> Result<&str, ConfigError> {
        self.spec
            .target
            .repo
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| ConfigError::Invalid("spec.target.repo is required".to_string()))
    }

    /// Replaces `${key}` in the target repo, secret and every path.
    pub fn resolve_placeholders(&mut self, placeholders: &BTreeMap<String, String>) {
        let resolve = |value: &mut String| {
            for (key, replacement) in placeholders {
                *value = value.replace(&format!("${{{key}}}"), replacement);
            }
        };
        if let Some(repo) = self.spec.target.repo.as_mut() {
            resolve(repo);
        }
        if let Some(secret) = self.spec.target.secret.as_mut() {
            resolve(secret);
        }
        for path in &mut self.spec.paths {
            resolve(&mut path.target);
            if let Some(source) = path.source.as_mut() {
                resolve(source);
            }
        }
    }

    /// Checks that the configuration can drive a promotion.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.repo()?;
        match self.strategy() {
            STRATEGY_FLAT_PR => {}
            STRATEGY_BRANCH => {
                return Err(ConfigError::Invalid(format!(
                    "strategy {STRATEGY_BRANCH} is not supported, use {STRATEGY_FLAT_PR}"
                )))
            }
            other => return Err(ConfigError::Invalid(format!("unknown strategy {other}"))),
        }
        if let Some(provider) = self.spec.target.provider.as_deref() {
            if !provider.eq_ignore_ascii_case(PROVIDER_GITHUB) {
                return Err(ConfigError::Invalid(format!(
                    "provider {provider} is not supported"
                )));
            }
        }
        validate_paths(&self.spec.paths)
    }
}

/// Checks that `paths` is non-empty and every mapping names a target.
pub fn validate_paths(paths: &[PathMapping]) -> Result<(), ConfigError> {
    if paths.is_empty() {
        return Err(ConfigError::Invalid(
            "spec.paths must contain at least one path".to_string(),
        ));
    }
    for (index, path) in paths.iter().enumerate() {
        if path.target.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "spec.paths[{index}].target must not be empty"
            )));
        }
    }
    Ok(())
}
