//! GitHub REST API client implementation.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::future::BoxFuture;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use super::{PullRequest, RepoAccessError, RepoResult, RepositoryClient, RepositoryFile};

/// Public GitHub API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

const API_VERSION: &str = "2022-11-28";

/// Identity used as author and committer of promotion commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitAuthor {
    /// Display name.
    pub name: String,
    /// E-mail address.
    pub email: String,
}

impl Default for CommitAuthor {
    fn default() -> Self {
        Self {
            name: "keptn".to_string(),
            email: "keptn-no-reply@github.com".to_string(),
        }
    }
}

/// Connection settings for one GitHub repository.
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    /// API base URL, e.g. `https://api.github.com` or `https://ghe.example.com/api/v3`.
    pub api_url: String,
    /// Access token; anonymous requests are sent when absent.
    pub token: Option<String>,
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Commit identity.
    pub author: CommitAuthor,
}

impl GitHubConfig {
    /// Builds a config for a repository reference such as
    /// `https://github.com/owner/repo`.
    pub fn for_repository(
        reference: &str,
        api_url: impl Into<String>,
        token: Option<String>,
    ) -> RepoResult<Self> {
        let (owner, repo) = parse_repository_reference(reference)?;
        Ok(Self {
            api_url: api_url.into(),
            token,
            owner,
            repo,
            author: CommitAuthor::default(),
        })
    }

    /// Replaces the commit identity.
    #[must_use]
    pub fn with_author(mut self, author: CommitAuthor) -> Self {
        self.author = author;
        self
    }
}

/// Extracts `(owner, repo)` from a repository reference.
///
/// Accepts `https://host/owner/repo(.git)`, `git@host:owner/repo(.git)` and
/// bare `owner/repo`.
pub fn parse_repository_reference(reference: &str) -> RepoResult<(String, String)> {
    let trimmed = reference.trim().trim_end_matches('/');
    let repo_path = if let Some((_, rest)) = trimmed
        .strip_prefix("git@")
        .and_then(|s| s.split_once(':'))
    {
        rest.to_string()
    } else if trimmed.contains("://") {
        let url = Url::parse(trimmed)
            .map_err(|e| RepoAccessError::InvalidRepository(format!("{reference}: {e}")))?;
        url.path().trim_matches('/').to_string()
    } else {
        trimmed.to_string()
    };

    let repo_path = repo_path.strip_suffix(".git").unwrap_or(&repo_path);
    match repo_path.split('/').collect::<Vec<_>>().as_slice() {
        [owner, repo] if !owner.is_empty() && !repo.is_empty() => {
            Ok(((*owner).to_string(), (*repo).to_string()))
        }
        _ => Err(RepoAccessError::InvalidRepository(format!(
            "{reference}: expected owner/repo"
        ))),
    }
}

/// Git ref as returned by `GET /git/ref/...`.
#[derive(Deserialize)]
struct GitRef {
    object: GitObject,
}

#[derive(Deserialize)]
struct GitObject {
    sha: String,
}

#[derive(Serialize)]
struct CreateRefRequest<'a> {
    #[serde(rename = "ref")]
    git_ref: String,
    sha: &'a str,
}

/// One entry of a contents response.
#[derive(Deserialize)]
struct ContentEntry {
    #[serde(rename = "type")]
    entry_type: String,
    path: String,
    sha: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

/// A contents response is a single entry for a file, a list for a directory.
#[derive(Deserialize)]
#[serde(untagged)]
enum ContentsResponse {
    Directory(Vec<ContentEntry>),
    Entry(ContentEntry),
}

#[derive(Serialize)]
struct FileWriteRequest<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
    author: &'a CommitAuthor,
    committer: &'a CommitAuthor,
}

#[derive(Serialize)]
struct CreatePullRequestRequest<'a> {
    title: &'a str,
    body: &'a str,
    head: &'a str,
    base: &'a str,
}

#[derive(Deserialize)]
struct PullRequestResponse {
    number: u64,
    html_url: String,
}

#[derive(Deserialize)]
struct CompareResponse {
    #[serde(default)]
    commits: Vec<serde_json::Value>,
}

/// GitHub implementation of [`RepositoryClient`].
pub struct GitHubClient {
    /// HTTP client for API requests.
    client: Client,
    /// Repository and identity settings.
    config: GitHubConfig,
}

impl GitHubClient {
    /// Creates a new GitHub client.
    pub fn new(config: GitHubConfig) -> RepoResult<Self> {
        let client = Client::builder()
            .timeout(super::REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RepoAccessError::NetworkError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Returns the repository settings.
    pub fn config(&self) -> &GitHubConfig {
        &self.config
    }

    /// Builds `{api_url}/repos/{owner}/{repo}/{segments...}`.
    ///
    /// Each segment may itself contain `/`; every part is percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> RepoResult<Url> {
        let mut url = Url::parse(&self.config.api_url).map_err(|e| {
            RepoAccessError::InvalidRepository(format!("{}: {e}", self.config.api_url))
        })?;
        url.path_segments_mut()
            .map_err(|()| {
                RepoAccessError::InvalidRepository(format!(
                    "{} cannot be used as API base",
                    self.config.api_url
                ))
            })?
            .pop_if_empty()
            .extend(["repos", self.config.owner.as_str(), self.config.repo.as_str()])
            .extend(
                segments
                    .iter()
                    .flat_map(|s| s.split('/'))
                    .filter(|s| !s.is_empty()),
            );
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .header(USER_AGENT, concat!("git-promotion/", env!("CARGO_PKG_VERSION")));
        match &self.config.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> RepoResult<Response> {
        builder
            .send()
            .await
            .map_err(|e| RepoAccessError::NetworkError(e.to_string()))
    }

    /// Returns the commit SHA a branch points at.
    async fn branch_head(&self, name: &str) -> RepoResult<String> {
        let url = self.endpoint(&["git/ref/heads", name])?;
        let response = self.send(self.request(Method::GET, url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(RepoAccessError::BranchNotFound(name.to_string()));
        }
        let git_ref: GitRef = parse_json(check_error_response(response).await?).await?;
        Ok(git_ref.object.sha)
    }

    /// Fetches the raw contents response for `path`, or `None` on 404.
    async fn get_contents(&self, branch: &str, path: &str) -> RepoResult<Option<ContentsResponse>> {
        let mut url = self.endpoint(&["contents", path])?;
        url.query_pairs_mut().append_pair("ref", branch);
        let response = self.send(self.request(Method::GET, url)).await?;
        debug!(branch, path, status = %response.status(), "Fetched contents");
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let contents = parse_json(check_error_response(response).await?).await?;
        Ok(Some(contents))
    }

    /// Fetches and decodes a single file.
    async fn get_file(&self, branch: &str, path: &str) -> RepoResult<Option<RepositoryFile>> {
        match self.get_contents(branch, path).await? {
            None => Ok(None),
            Some(ContentsResponse::Entry(entry)) if entry.entry_type == "file" => {
                decode_file(entry).map(Some)
            }
            Some(_) => Err(RepoAccessError::InvalidResponseFormat(format!(
                "expected a file at {path}"
            ))),
        }
    }

    /// Walks `path` depth-first, appending every file found to `files`.
    fn collect_files<'a>(
        &'a self,
        branch: &'a str,
        path: &'a str,
        files: &'a mut Vec<RepositoryFile>,
    ) -> BoxFuture<'a, RepoResult<()>> {
        Box::pin(async move {
            match self.get_contents(branch, path).await? {
                None => {
                    debug!(branch, path, "Path does not exist, nothing to collect");
                }
                Some(ContentsResponse::Entry(entry)) => {
                    if entry.entry_type == "file" {
                        files.push(decode_file(entry)?);
                    } else {
                        warn!(path = %entry.path, entry_type = %entry.entry_type, "Skipping unsupported entry type");
                    }
                }
                Some(ContentsResponse::Directory(entries)) => {
                    for entry in entries {
                        debug!(path = %entry.path, entry_type = %entry.entry_type, "Processing entry");
                        match entry.entry_type.as_str() {
                            "file" => {
                                if let Some(file) = self.get_file(branch, &entry.path).await? {
                                    files.push(file);
                                }
                            }
                            "dir" => self.collect_files(branch, &entry.path, files).await?,
                            other => {
                                warn!(path = %entry.path, entry_type = other, "Skipping unsupported entry type");
                            }
                        }
                    }
                }
            }
            Ok(())
        })
    }

    /// Creates or updates a file through `PUT /contents/{path}`.
    async fn put_file(
        &self,
        branch: &str,
        path: &str,
        content: &str,
        version: Option<&str>,
    ) -> RepoResult<()> {
        let message = if version.is_some() {
            "(build) update file"
        } else {
            "(build) create file"
        };
        let request = FileWriteRequest {
            message,
            content: Some(STANDARD.encode(content)),
            branch,
            sha: version,
            author: &self.config.author,
            committer: &self.config.author,
        };
        let url = self.endpoint(&["contents", path])?;
        let response = self
            .send(self.request(Method::PUT, url).json(&request))
            .await?;
        check_write_response(response, path, version).await
    }
}

/// Decodes a base64 file entry into a [`RepositoryFile`].
fn decode_file(entry: ContentEntry) -> RepoResult<RepositoryFile> {
    let encoded = entry.content.unwrap_or_default();
    match entry.encoding.as_deref() {
        Some("base64") | None => {}
        Some(other) => {
            return Err(RepoAccessError::InvalidResponseFormat(format!(
                "unsupported encoding {other} for {}",
                entry.path
            )))
        }
    }
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD.decode(compact).map_err(|e| {
        RepoAccessError::InvalidResponseFormat(format!("invalid base64 in {}: {e}", entry.path))
    })?;
    let content = String::from_utf8(bytes).map_err(|e| {
        RepoAccessError::InvalidResponseFormat(format!("{} is not UTF-8 text: {e}", entry.path))
    })?;
    Ok(RepositoryFile {
        path: entry.path,
        content,
        version: entry.sha,
    })
}

/// Checks an HTTP response for error status.
///
/// On failure, reads the error body into [`RepoAccessError::ApiRequestFailed`].
async fn check_error_response(response: Response) -> RepoResult<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let error_text = response.text().await.unwrap_or_else(|e| {
        debug!("Failed to read error response body: {e}");
        String::new()
    });
    Err(RepoAccessError::ApiRequestFailed {
        status: status.as_u16(),
        message: error_text,
    })
}

/// Maps a rejected precondition on a file write to [`RepoAccessError::StaleVersion`].
async fn check_write_response(
    response: Response,
    path: &str,
    version: Option<&str>,
) -> RepoResult<()> {
    let status = response.status();
    if let Some(version) = version {
        if status == StatusCode::CONFLICT || status == StatusCode::UNPROCESSABLE_ENTITY {
            return Err(RepoAccessError::StaleVersion {
                path: path.to_string(),
                version: version.to_string(),
            });
        }
    }
    check_error_response(response).await.map(drop)
}

async fn parse_json<T: serde::de::DeserializeOwned>(response: Response) -> RepoResult<T> {
    response
        .json()
        .await
        .map_err(|e| RepoAccessError::InvalidResponseFormat(e.to_string()))
}

impl RepositoryClient for GitHubClient {
    fn branch_exists<'a>(&'a self, name: &'a str) -> BoxFuture<'a, RepoResult<bool>> {
        Box::pin(async move {
            let url = self.endpoint(&["git/ref/heads", name])?;
            let response = self.send(self.request(Method::GET, url)).await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(false);
            }
            check_error_response(response).await?;
            Ok(true)
        })
    }

    fn create_branch<'a>(
        &'a self,
        from_ref: &'a str,
        new_name: &'a str,
    ) -> BoxFuture<'a, RepoResult<()>> {
        Box::pin(async move {
            let sha = self.branch_head(from_ref).await?;
            let request = CreateRefRequest {
                git_ref: format!("refs/heads/{new_name}"),
                sha: &sha,
            };
            let url = self.endpoint(&["git/refs"])?;
            let response = self
                .send(self.request(Method::POST, url).json(&request))
                .await?;
            if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
                return Err(RepoAccessError::BranchAlreadyExists(new_name.to_string()));
            }
            check_error_response(response).await?;
            info!(from = from_ref, branch = new_name, sha = %sha, "Created branch");
            Ok(())
        })
    }

    fn delete_branch<'a>(&'a self, name: &'a str) -> BoxFuture<'a, RepoResult<()>> {
        Box::pin(async move {
            let url = self.endpoint(&["git/refs/heads", name])?;
            let response = self.send(self.request(Method::DELETE, url)).await?;
            if response.status() == StatusCode::NOT_FOUND
                || response.status() == StatusCode::UNPROCESSABLE_ENTITY
            {
                return Err(RepoAccessError::BranchNotFound(name.to_string()));
            }
            check_error_response(response).await?;
            info!(branch = name, "Deleted branch");
            Ok(())
        })
    }

    fn get_files_for_branch<'a>(
        &'a self,
        branch: &'a str,
        path: &'a str,
    ) -> BoxFuture<'a, RepoResult<Vec<RepositoryFile>>> {
        Box::pin(async move {
            let mut files = Vec::new();
            self.collect_files(branch, path, &mut files).await?;
            info!(branch, path, count = files.len(), "Collected files");
            Ok(files)
        })
    }

    fn create_file<'a>(
        &'a self,
        branch: &'a str,
        path: &'a str,
        content: &'a str,
    ) -> BoxFuture<'a, RepoResult<()>> {
        Box::pin(self.put_file(branch, path, content, None))
    }

    fn update_file<'a>(
        &'a self,
        branch: &'a str,
        path: &'a str,
        content: &'a str,
        version: &'a str,
    ) -> BoxFuture<'a, RepoResult<()>> {
        Box::pin(self.put_file(branch, path, content, Some(version)))
    }

    fn delete_file<'a>(
        &'a self,
        branch: &'a str,
        path: &'a str,
        version: &'a str,
    ) -> BoxFuture<'a, RepoResult<()>> {
        Box::pin(async move {
            let request = FileWriteRequest {
                message: "(build) delete file",
                content: None,
                branch,
                sha: Some(version),
                author: &self.config.author,
                committer: &self.config.author,
            };
            let url = self.endpoint(&["contents", path])?;
            let response = self
                .send(self.request(Method::DELETE, url).json(&request))
                .await?;
            check_write_response(response, path, Some(version)).await
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
            let request = CreatePullRequestRequest {
                title,
                body,
                head,
                base,
            };
            let url = self.endpoint(&["pulls"])?;
            let response = self
                .send(self.request(Method::POST, url).json(&request))
                .await?;
            let pr: PullRequestResponse = parse_json(check_error_response(response).await?).await?;
            info!(number = pr.number, url = %pr.html_url, head, base, "Opened pull request");
            Ok(PullRequest {
                number: pr.number,
                url: pr.html_url,
            })
        })
    }

    fn check_for_new_commits<'a>(
        &'a self,
        base: &'a str,
        head: &'a str,
    ) -> BoxFuture<'a, RepoResult<bool>> {
        Box::pin(async move {
            let range = format!("{base}...{head}");
            let url = self.endpoint(&["compare", &range])?;
            let response = self.send(self.request(Method::GET, url)).await?;
            let compare: CompareResponse = parse_json(check_error_response(response).await?).await?;
            info!(
                owner = %self.config.owner,
                repo = %self.config.repo,
                base,
                head,
                commits = compare.commits.len(),
                "Compared branches"
            );
            Ok(!compare.commits.is_empty())
        })
    }
}
