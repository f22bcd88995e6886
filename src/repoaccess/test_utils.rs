//! Shared test utilities for the `repoaccess` module.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;

use super::{PullRequest, RepoAccessError, RepoResult, RepositoryClient, RepositoryFile};

/// A write recorded by [`InMemoryRepository`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Write {
    Create {
        branch: String,
        path: String,
    },
    Update {
        branch: String,
        path: String,
        version: String,
    },
    Delete {
        branch: String,
        path: String,
        version: String,
    },
}

/// A pull request recorded by [`InMemoryRepository`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordedPullRequest {
    pub head: String,
    pub base: String,
    pub title: String,
    pub body: String,
}

#[derive(Default)]
struct State {
    /// branch -> path -> (content, version)
    branches: BTreeMap<String, BTreeMap<String, (String, String)>>,
    next_version: u64,
    writes: Vec<Write>,
    pull_requests: Vec<RecordedPullRequest>,
    deleted_branches: Vec<String>,
    failing_paths: HashSet<String>,
}

impl State {
    fn next_version(&mut self) -> String {
        self.next_version += 1;
        format!("v{}", self.next_version)
    }

    fn branch_mut(&mut self, branch: &str) -> RepoResult<&mut BTreeMap<String, (String, String)>> {
        self.branches
            .get_mut(branch)
            .ok_or_else(|| RepoAccessError::BranchNotFound(branch.to_string()))
    }

    fn check_failure(&self, path: &str) -> RepoResult<()> {
        if self.failing_paths.contains(path) {
            return Err(RepoAccessError::ApiRequestFailed {
                status: 500,
                message: format!("injected failure for {path}"),
            });
        }
        Ok(())
    }
}

/// In-memory [`RepositoryClient`] with GitHub-like precondition checks.
///
/// Clones share state, so a test can keep one handle for inspection after
/// moving another into a promoter.
#[derive(Clone, Default)]
pub(crate) struct InMemoryRepository {
    state: Arc<Mutex<State>>,
}

impl InMemoryRepository {
    /// Creates a repository with an empty `main` branch.
    pub(crate) fn new() -> Self {
        let repo = Self::default();
        repo.state
            .lock()
            .unwrap()
            .branches
            .insert("main".to_string(), BTreeMap::new());
        repo
    }

    /// Writes a file directly, bypassing preconditions and the write log.
    pub(crate) fn put_file(&self, branch: &str, path: &str, content: &str) {
        let mut state = self.state.lock().unwrap();
        let version = state.next_version();
        state
            .branches
            .entry(branch.to_string())
            .or_default()
            .insert(path.to_string(), (content.to_string(), version));
    }

    /// Creates an empty branch directly.
    pub(crate) fn add_branch(&self, branch: &str) {
        self.state
            .lock()
            .unwrap()
            .branches
            .entry(branch.to_string())
            .or_default();
    }

    /// Makes every write to `path` fail.
    pub(crate) fn fail_writes_to(&self, path: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_paths
            .insert(path.to_string());
    }

    pub(crate) fn has_branch(&self, branch: &str) -> bool {
        self.state.lock().unwrap().branches.contains_key(branch)
    }

    pub(crate) fn content_of(&self, branch: &str, path: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .branches
            .get(branch)
            .and_then(|files| files.get(path))
            .map(|(content, _)| content.clone())
    }

    pub(crate) fn version_of(&self, branch: &str, path: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .branches
            .get(branch)
            .and_then(|files| files.get(path))
            .map(|(_, version)| version.clone())
    }

    pub(crate) fn paths_of(&self, branch: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .branches
            .get(branch)
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn writes(&self) -> Vec<Write> {
        self.state.lock().unwrap().writes.clone()
    }

    pub(crate) fn pull_requests(&self) -> Vec<RecordedPullRequest> {
        self.state.lock().unwrap().pull_requests.clone()
    }

    pub(crate) fn deleted_branches(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted_branches.clone()
    }
}

impl RepositoryClient for InMemoryRepository {
    fn branch_exists<'a>(&'a self, name: &'a str) -> BoxFuture<'a, RepoResult<bool>> {
        Box::pin(async move { Ok(self.has_branch(name)) })
    }

    fn create_branch<'a>(
        &'a self,
        from_ref: &'a str,
        new_name: &'a str,
    ) -> BoxFuture<'a, RepoResult<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            if state.branches.contains_key(new_name) {
                return Err(RepoAccessError::BranchAlreadyExists(new_name.to_string()));
            }
            let files = state.branch_mut(from_ref)?.clone();
            state.branches.insert(new_name.to_string(), files);
            Ok(())
        })
    }

    fn delete_branch<'a>(&'a self, name: &'a str) -> BoxFuture<'a, RepoResult<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state
                .branches
                .remove(name)
                .ok_or_else(|| RepoAccessError::BranchNotFound(name.to_string()))?;
            state.deleted_branches.push(name.to_string());
            Ok(())
        })
    }

    fn get_files_for_branch<'a>(
        &'a self,
        branch: &'a str,
        path: &'a str,
    ) -> BoxFuture<'a, RepoResult<Vec<RepositoryFile>>> {
        Box::pin(async move {
            let state = self.state.lock().unwrap();
            // Unknown branches read as empty, like a 404 from the contents API
            let Some(files) = state.branches.get(branch) else {
                return Ok(Vec::new());
            };
            let dir_prefix = format!("{}/", path.trim_end_matches('/'));
            Ok(files
                .iter()
                .filter(|(p, _)| p.as_str() == path || p.starts_with(&dir_prefix))
                .map(|(p, (content, version))| RepositoryFile::new(p, content, version))
                .collect())
        })
    }

    fn create_file<'a>(
        &'a self,
        branch: &'a str,
        path: &'a str,
        content: &'a str,
    ) -> BoxFuture<'a, RepoResult<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.check_failure(path)?;
            let version = state.next_version();
            let files = state.branch_mut(branch)?;
            if files.contains_key(path) {
                return Err(RepoAccessError::ApiRequestFailed {
                    status: 422,
                    message: format!("{path} already exists and no version was supplied"),
                });
            }
            files.insert(path.to_string(), (content.to_string(), version));
            state.writes.push(Write::Create {
                branch: branch.to_string(),
                path: path.to_string(),
            });
            Ok(())
        })
    }

    fn update_file<'a>(
        &'a self,
        branch: &'a str,
        path: &'a str,
        content: &'a str,
        version: &'a str,
    ) -> BoxFuture<'a, RepoResult<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.check_failure(path)?;
            let new_version = state.next_version();
            let files = state.branch_mut(branch)?;
            let current = files.get(path).is_some_and(|(_, v)| v == version);
            if !current {
                return Err(RepoAccessError::StaleVersion {
                    path: path.to_string(),
                    version: version.to_string(),
                });
            }
            files.insert(path.to_string(), (content.to_string(), new_version));
            state.writes.push(Write::Update {
                branch: branch.to_string(),
                path: path.to_string(),
                version: version.to_string(),
            });
            Ok(())
        })
    }

    fn delete_file<'a>(
        &'a self,
        branch: &'a str,
        path: &'a str,
        version: &'a str,
    ) -> BoxFuture<'a, RepoResult<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.check_failure(path)?;
            let files = state.branch_mut(branch)?;
            let current = files.get(path).is_some_and(|(_, v)| v == version);
            if !current {
                return Err(RepoAccessError::StaleVersion {
                    path: path.to_string(),
                    version: version.to_string(),
                });
            }
            files.remove(path);
            state.writes.push(Write::Delete {
                branch: branch.to_string(),
                path: path.to_string(),
                version: version.to_string(),
            });
            Ok(())
        })
    }

    fn create_pull_request<'a>(
        &'a self,
        head: &'a str,
        base: &'a str,
        title: &'a str,
        body: &'a str,
    ) -> BoxFuture<'a, RepoResult<PullRequest>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.pull_requests.push(RecordedPullRequest {
                head: head.to_string(),
                base: base.to_string(),
                title: title.to_string(),
                body: body.to_string(),
            });
            let number = state.pull_requests.len() as u64;
            Ok(PullRequest {
                number,
                url: format!("https://example.test/pull/{number}"),
            })
        })
    }

    fn check_for_new_commits<'a>(
        &'a self,
        base: &'a str,
        head: &'a str,
    ) -> BoxFuture<'a, RepoResult<bool>> {
        Box::pin(async move {
            let state = self.state.lock().unwrap();
            let base_files = state.branches.get(base);
            let head_files = state.branches.get(head);
            Ok(base_files != head_files)
        })
    }
}
