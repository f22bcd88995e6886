//! Tiered lookup of the configuration resource.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use sha3::{Digest, Sha3_224};
use tracing::{debug, info};

use super::{ConfigError, PromotionConfig};

/// Where a resource is defined, most specific first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceTier {
    /// Defined for one service in one stage.
    Service,
    /// Defined for every service of a stage.
    Stage,
    /// Defined for the whole project.
    Project,
}

impl ResourceTier {
    /// Lookup order.
    pub const ALL: [Self; 3] = [Self::Service, Self::Stage, Self::Project];
}

impl fmt::Display for ResourceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Service => "service",
            Self::Stage => "stage",
            Self::Project => "project",
        };
        f.write_str(name)
    }
}

/// Supplies configuration resources per tier.
pub trait ResourceSource {
    /// Returns the resource `name` defined at `tier`, or `None` if absent.
    ///
    /// `git_commit_id` pins the revision the resource is read at, when the
    /// source supports revisions.
    fn get_resource(
        &self,
        tier: ResourceTier,
        name: &str,
        git_commit_id: Option<&str>,
    ) -> Result<Option<Vec<u8>>, ConfigError>;
}

/// Reads resources from a directory laid out as
/// `<root>/<project>/<stage>/<service>/<name>`.
///
/// The stage tier is `<root>/<project>/<stage>/<name>` and the project tier
/// `<root>/<project>/<name>`. Revisions are not supported.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
    project: String,
    stage: String,
    service: String,
}

impl DirectorySource {
    /// Creates a source for one project/stage/service.
    pub fn new(
        root: impl Into<PathBuf>,
        project: impl Into<String>,
        stage: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            project: project.into(),
            stage: stage.into(),
            service: service.into(),
        }
    }

    fn tier_path(&self, tier: ResourceTier, name: &str) -> PathBuf {
        let project_dir = self.root.join(&self.project);
        match tier {
            ResourceTier::Service => project_dir.join(&self.stage).join(&self.service).join(name),
            ResourceTier::Stage => project_dir.join(&self.stage).join(name),
            ResourceTier::Project => project_dir.join(name),
        }
    }
}

impl ResourceSource for DirectorySource {
    fn get_resource(
        &self,
        tier: ResourceTier,
        name: &str,
        git_commit_id: Option<&str>,
    ) -> Result<Option<Vec<u8>>, ConfigError> {
        let path = self.tier_path(tier, name);
        if let Some(commit) = git_commit_id {
            debug!(commit, "Directory source ignores commit pinning");
        }
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ConfigError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }
}

/// Finds, hashes and parses the configuration resource.
pub struct ConfigReader<S> {
    source: S,
    resource_name: String,
}

impl<S: ResourceSource> ConfigReader<S> {
    /// Creates a reader for [`super::CONFIG_RESOURCE_NAME`].
    pub fn new(source: S) -> Self {
        Self {
            source,
            resource_name: super::CONFIG_RESOURCE_NAME.to_string(),
        }
    }

    /// Returns the first tier's resource, trying service, stage, then project.
    ///
    /// The project tier is always read without commit pinning, since the
    /// commit may not exist on the project's default branch.
    pub fn find_resource(
        &self,
        git_commit_id: Option<&str>,
    ) -> Result<(ResourceTier, Vec<u8>), ConfigError> {
        for tier in ResourceTier::ALL {
            let commit = match tier {
                ResourceTier::Project => None,
                _ => git_commit_id,
            };
            if let Some(bytes) = self.source.get_resource(tier, &self.resource_name, commit)? {
                debug!(%tier, name = %self.resource_name, "Found configuration resource");
                return Ok((tier, bytes));
            }
        }
        Err(ConfigError::NotFound(self.resource_name.clone()))
    }

    /// Reads the configuration and the SHA3-224 hex digest of its raw bytes.
    pub fn read(&self, git_commit_id: Option<&str>) -> Result<(PromotionConfig, String), ConfigError> {
        let (tier, resource) = self.find_resource(git_commit_id)?;
        let hash = resource_hash(&resource);
        let config = PromotionConfig::from_slice(&resource)?;
        info!(%tier, hash = %hash, "Loaded git promotion configuration");
        Ok((config, hash))
    }
}

/// Lowercase hex SHA3-224 digest of a raw resource.
fn resource_hash(resource: &[u8]) -> String {
    format!("{:x}", Sha3_224::digest(resource))
}
