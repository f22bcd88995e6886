//! Remote repository access.
//!
//! [`RepositoryClient`] is the capability set the promotion engine needs from
//! a git hosting service. [`GitHubClient`] talks to the GitHub REST API.

pub mod error;
pub mod github;
#[cfg(test)]
pub(crate) mod test_utils;

use std::collections::HashMap;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::Serialize;
use tracing::{debug, info};

pub use error::RepoAccessError;
pub use github::{parse_repository_reference, CommitAuthor, GitHubClient, GitHubConfig};

/// HTTP request timeout for hosting API calls.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Result type of every repository operation.
pub type RepoResult<T> = std::result::Result<T, RepoAccessError>;

/// Snapshot of one file on a branch.
///
/// `version` is the opaque revision token the hosting service requires as a
/// precondition when the file is later updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryFile {
    /// Repository-relative path, without a leading slash.
    pub path: String,
    /// Decoded text content.
    pub content: String,
    /// Revision token of this content.
    pub version: String,
}

impl RepositoryFile {
    /// Creates a file snapshot.
    pub fn new(
        path: impl Into<String>,
        content: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            version: version.into(),
        }
    }
}

/// A pull request opened on the hosting service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequest {
    /// Pull request number.
    pub number: u64,
    /// Browser URL of the pull request.
    pub url: String,
}

/// Git hosting operations used by a promotion.
pub trait RepositoryClient: Send + Sync {
    /// Returns true if a branch with this name exists.
    fn branch_exists<'a>(&'a self, name: &'a str) -> BoxFuture<'a, RepoResult<bool>>;

    /// Creates `new_name` pointing at the tip of `from_ref`.
    ///
    /// Fails with [`RepoAccessError::BranchAlreadyExists`] if the ref exists.
    fn create_branch<'a>(
        &'a self,
        from_ref: &'a str,
        new_name: &'a str,
    ) -> BoxFuture<'a, RepoResult<()>>;

    /// Deletes a branch.
    fn delete_branch<'a>(&'a self, name: &'a str) -> BoxFuture<'a, RepoResult<()>>;

    /// Returns every file at `path` on `branch`.
    ///
    /// A file path yields one entry, a directory is walked depth-first. A path
    /// that does not exist yields an empty set.
    fn get_files_for_branch<'a>(
        &'a self,
        branch: &'a str,
        path: &'a str,
    ) -> BoxFuture<'a, RepoResult<Vec<RepositoryFile>>>;

    /// Creates a file that does not exist yet.
    fn create_file<'a>(
        &'a self,
        branch: &'a str,
        path: &'a str,
        content: &'a str,
    ) -> BoxFuture<'a, RepoResult<()>>;

    /// Replaces the content of a file, provided it is still at `version`.
    fn update_file<'a>(
        &'a self,
        branch: &'a str,
        path: &'a str,
        content: &'a str,
        version: &'a str,
    ) -> BoxFuture<'a, RepoResult<()>>;

    /// Deletes a file, provided it is still at `version`.
    fn delete_file<'a>(
        &'a self,
        branch: &'a str,
        path: &'a str,
        version: &'a str,
    ) -> BoxFuture<'a, RepoResult<()>>;

    /// Opens a pull request merging `head` into `base`.
    fn create_pull_request<'a>(
        &'a self,
        head: &'a str,
        base: &'a str,
        title: &'a str,
        body: &'a str,
    ) -> BoxFuture<'a, RepoResult<PullRequest>>;

    /// Returns true if `head` has commits that `base` does not.
    fn check_for_new_commits<'a>(
        &'a self,
        base: &'a str,
        head: &'a str,
    ) -> BoxFuture<'a, RepoResult<bool>>;

    /// Reconciles `branch` so the files of `current` become `new`.
    ///
    /// Files are matched by path. Paths only in `new` are created, paths in
    /// both with different content are updated against the version in
    /// `current`, paths only in `current` are deleted. Unchanged files are not
    /// written. Returns the number of writes made; the first failing write
    /// aborts the sync.
    fn sync_files_with_branch<'a>(
        &'a self,
        branch: &'a str,
        current: &'a [RepositoryFile],
        new: &'a [RepositoryFile],
    ) -> BoxFuture<'a, RepoResult<usize>> {
        Box::pin(async move {
            info!(
                branch,
                current = current.len(),
                new = new.len(),
                "Syncing files with branch"
            );
            let current_by_path: HashMap<&str, &RepositoryFile> =
                current.iter().map(|f| (f.path.as_str(), f)).collect();
            let new_by_path: HashMap<&str, &RepositoryFile> =
                new.iter().map(|f| (f.path.as_str(), f)).collect();

            let mut changes = 0;
            for file in new {
                match current_by_path.get(file.path.as_str()) {
                    None => {
                        debug!(branch, path = %file.path, "Creating file");
                        self.create_file(branch, &file.path, &file.content).await?;
                        changes += 1;
                    }
                    Some(existing) if existing.content != file.content => {
                        debug!(branch, path = %file.path, version = %existing.version, "Updating file");
                        self.update_file(branch, &file.path, &file.content, &existing.version)
                            .await?;
                        changes += 1;
                    }
                    Some(_) => {
                        debug!(branch, path = %file.path, "Ignoring file, no changes detected");
                    }
                }
            }
            for file in current {
                if !new_by_path.contains_key(file.path.as_str()) {
                    debug!(branch, path = %file.path, version = %file.version, "Deleting file");
                    self.delete_file(branch, &file.path, &file.version).await?;
                    changes += 1;
                }
            }
            Ok(changes)
        })
    }
}
