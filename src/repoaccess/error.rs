//! Repository access errors.

use thiserror::Error;

/// Failures of a remote repository operation.
#[derive(Error, Debug)]
pub enum RepoAccessError {
    /// The hosting service could not be reached.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The hosting API answered with an unexpected status.
    #[error("Hosting API request failed: HTTP {status}: {message}")]
    ApiRequestFailed {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// The hosting API answered with a body that could not be understood.
    #[error("Invalid response format from hosting API: {0}")]
    InvalidResponseFormat(String),

    /// A write was rejected because the file changed since `version` was read.
    #[error("File {path} changed on the remote since version {version} was read")]
    StaleVersion {
        /// File path.
        path: String,
        /// Version token supplied as precondition.
        version: String,
    },

    /// The branch to create already exists.
    #[error("Branch {0} already exists")]
    BranchAlreadyExists(String),

    /// The branch does not exist.
    #[error("Branch {0} not found")]
    BranchNotFound(String),

    /// The repository reference could not be parsed.
    #[error("Invalid repository reference: {0}")]
    InvalidRepository(String),
}
