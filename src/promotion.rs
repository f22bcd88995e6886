//! Flat pull request promotion.
//!
//! A promotion copies the files named by a list of [`PathMapping`]s from a
//! source branch onto a fresh branch, substituting marked values on the way,
//! and opens a single pull request back into the source branch when anything
//! changed.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{validate_paths, ConfigError, PathMapping};
use crate::event::FieldMap;
use crate::replacer::ContentReplacer;
use crate::repoaccess::{RepoAccessError, RepositoryClient, RepositoryFile};

/// Promotion failures.
#[derive(Error, Debug)]
pub enum PromotionError {
    /// The path mappings cannot drive a promotion.
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// The promotion branch already exists.
    #[error("Branch with name {0} already exists")]
    Conflict(String),

    /// A remote operation failed; the promotion branch may be left partially synced.
    #[error("{context}: {source}")]
    RemoteAccess {
        /// Step that failed.
        context: String,
        /// Underlying failure.
        #[source]
        source: RepoAccessError,
    },
}

/// Attaches a step description to a repository failure.
trait RemoteContext<T> {
    fn remote_context(self, context: impl FnOnce() -> String) -> Result<T, PromotionError>;
}

impl<T> RemoteContext<T> for Result<T, RepoAccessError> {
    fn remote_context(self, context: impl FnOnce() -> String) -> Result<T, PromotionError> {
        self.map_err(|source| PromotionError::RemoteAccess {
            context: context(),
            source,
        })
    }
}

/// Terminal outcome of a successful promotion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromotionOutcome {
    /// A mapping matched its baseline, the promotion stopped early.
    NoChangesDetected,
    /// Nothing was written; the promotion branch was deleted.
    NoPullRequestNecessary,
    /// Changes were written and a pull request opened.
    PullRequestOpened {
        /// Pull request number.
        number: u64,
        /// Browser URL of the pull request.
        url: String,
    },
}

impl PromotionOutcome {
    /// Returns the pull request link, if one was opened.
    pub fn pull_request_url(&self) -> Option<&str> {
        match self {
            Self::PullRequestOpened { url, .. } => Some(url),
            _ => None,
        }
    }
}

impl fmt::Display for PromotionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoChangesDetected => f.write_str("no changes detected"),
            Self::NoPullRequestNecessary => f.write_str("no pull request necessary"),
            Self::PullRequestOpened { .. } => f.write_str("opened pull request"),
        }
    }
}

/// What to do when a mapping produces no change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NoChangePolicy {
    /// Stop the whole promotion with [`PromotionOutcome::NoChangesDetected`].
    #[default]
    AbortPromotion,
    /// Skip only this mapping and continue with the next one.
    SkipMapping,
}

/// Options of a [`Promoter`].
#[derive(Debug, Clone, Default)]
pub struct PromoterOptions {
    /// Handling of unchanged mappings.
    pub no_change_policy: NoChangePolicy,
}

/// One promotion request.
#[derive(Debug, Clone, Copy)]
pub struct PromotionRequest<'a> {
    /// Repository reference, used for logging.
    pub repository: &'a str,
    /// Values for marker substitution.
    pub fields: &'a FieldMap,
    /// Branch content is read from and the pull request targets.
    pub source_branch: &'a str,
    /// Branch created for the promotion; must not exist yet.
    pub target_branch: &'a str,
    /// Pull request title.
    pub title: &'a str,
    /// Pull request body.
    pub body: &'a str,
    /// Paths taking part, processed in order.
    pub paths: &'a [PathMapping],
}

/// Runs flat pull request promotions against a [`RepositoryClient`].
pub struct Promoter {
    client: Box<dyn RepositoryClient>,
    replacer: ContentReplacer,
    options: PromoterOptions,
}

impl Promoter {
    /// Creates a promoter.
    pub fn new(
        client: Box<dyn RepositoryClient>,
        replacer: ContentReplacer,
        options: PromoterOptions,
    ) -> Self {
        Self {
            client,
            replacer,
            options,
        }
    }

    /// Promotes the mapped paths from `source_branch` onto a new `target_branch`.
    ///
    /// Any remote failure aborts the promotion and leaves the target branch as
    /// it was at that point; nothing is rolled back.
    pub async fn promote(
        &self,
        request: PromotionRequest<'_>,
    ) -> Result<PromotionOutcome, PromotionError> {
        let PromotionRequest {
            repository,
            fields,
            source_branch,
            target_branch,
            title,
            body,
            paths,
        } = request;
        info!(
            repository,
            source_branch,
            target_branch,
            fields = fields.len(),
            paths = paths.len(),
            "Starting flat pull request promotion"
        );
        validate_paths(paths)?;

        let exists = self
            .client
            .branch_exists(target_branch)
            .await
            .remote_context(|| format!("checking whether branch {target_branch} exists"))?;
        if exists {
            return Err(PromotionError::Conflict(target_branch.to_string()));
        }
        self.client
            .create_branch(source_branch, target_branch)
            .await
            .remote_context(|| format!("creating branch {target_branch} from {source_branch}"))?;

        let mut changes = 0;
        for mapping in paths {
            let source = mapping.source.as_deref().map(normalize_path);
            let target = normalize_path(&mapping.target);
            let effective = source.unwrap_or(target);

            debug!(branch = source_branch, path = effective, "Getting files for branch");
            let mut new_files = self
                .client
                .get_files_for_branch(source_branch, effective)
                .await
                .remote_context(|| format!("reading {effective} on {source_branch}"))?;

            let baseline = match source {
                Some(_) => self
                    .client
                    .get_files_for_branch(source_branch, target)
                    .await
                    .remote_context(|| format!("reading {target} on {source_branch}"))?,
                None => new_files.clone(),
            };

            for file in &mut new_files {
                file.content = self.replacer.replace(&file.content, fields);
                if let Some(source) = source.filter(|s| *s != target) {
                    file.path = rebase_path(&file.path, source, target);
                }
            }

            if !has_changes(&new_files, &baseline) {
                match self.options.no_change_policy {
                    NoChangePolicy::AbortPromotion => {
                        info!(path = target, "No changes detected, stopping promotion");
                        if changes == 0 {
                            self.delete_branch(target_branch).await?;
                        } else {
                            warn!(
                                target_branch,
                                changes, "Leaving promotion branch with earlier changes in place"
                            );
                        }
                        return Ok(PromotionOutcome::NoChangesDetected);
                    }
                    NoChangePolicy::SkipMapping => {
                        info!(path = target, "No changes detected, skipping mapping");
                        continue;
                    }
                }
            }

            let written = self
                .client
                .sync_files_with_branch(target_branch, &baseline, &new_files)
                .await
                .remote_context(|| format!("syncing {target} with branch {target_branch}"))?;
            info!(path = target, written, "Synced mapping");
            changes += written;
        }

        info!(changes, target_branch, "Committed changes to branch");
        if changes > 0 {
            let pr = self
                .client
                .create_pull_request(target_branch, source_branch, title, body)
                .await
                .remote_context(|| {
                    format!("opening pull request from {target_branch} into {source_branch}")
                })?;
            info!(number = pr.number, url = %pr.url, repository, "Opened pull request");
            Ok(PromotionOutcome::PullRequestOpened {
                number: pr.number,
                url: pr.url,
            })
        } else {
            info!(target_branch, "No changes found, deleting branch");
            self.delete_branch(target_branch).await?;
            Ok(PromotionOutcome::NoPullRequestNecessary)
        }
    }

    /// Returns true if `head` has commits that `base` does not.
    pub async fn check_for_new_commits(
        &self,
        base: &str,
        head: &str,
    ) -> Result<bool, PromotionError> {
        self.client
            .check_for_new_commits(base, head)
            .await
            .remote_context(|| format!("comparing {base} with {head}"))
    }

    async fn delete_branch(&self, branch: &str) -> Result<(), PromotionError> {
        self.client
            .delete_branch(branch)
            .await
            .remote_context(|| format!("deleting branch {branch}"))
    }
}

/// Hosting APIs report paths without leading or trailing slashes.
fn normalize_path(path: &str) -> &str {
    path.trim_matches('/')
}

/// Moves `path` from below `source` to below `target`.
fn rebase_path(path: &str, source: &str, target: &str) -> String {
    match path.strip_prefix(source) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => format!("{target}{rest}"),
        _ => path.to_string(),
    }
}

/// Returns true unless both sets hold the same paths with identical content.
fn has_changes(new: &[RepositoryFile], baseline: &[RepositoryFile]) -> bool {
    if new.len() != baseline.len() {
        return true;
    }
    let by_path: HashMap<&str, &str> = new
        .iter()
        .map(|f| (f.path.as_str(), f.content.as_str()))
        .collect();
    baseline
        .iter()
        .any(|f| by_path.get(f.path.as_str()) != Some(&f.content.as_str()))
}
