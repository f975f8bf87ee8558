//! Repository accessor trait and hosting-service integration.
//!
//! Provides an abstraction over the remote source-control host so the
//! pipeline stages can be driven by the real GitHub API or an in-memory
//! double in tests.

pub mod github;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::RepoId;

/// Errors from the hosting service.
#[derive(Error, Debug)]
pub enum RepoError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("{operation} failed with HTTP {status}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("unexpected response from {operation}: {message}")]
    Decode { operation: String, message: String },

    #[error("{path} is not a directory")]
    NotADirectory { path: String },

    #[error("{path} is not valid UTF-8 text")]
    NotText { path: String },
}

impl RepoError {
    /// HTTP status of the failed call, when the host answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            RepoError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Short description safe to show to an end user: no URLs or request
    /// internals, just what the host said.
    pub fn summary(&self) -> String {
        match self {
            RepoError::Status { status, body, .. } if body.is_empty() => format!("HTTP {status}"),
            RepoError::Status { status, body, .. } => format!("HTTP {status}: {body}"),
            RepoError::Transport { .. } => "the hosting service could not be reached".to_string(),
            RepoError::Decode { .. } => "the hosting service sent an unexpected response".to_string(),
            RepoError::NotADirectory { path } => format!("{path} is not a directory"),
            RepoError::NotText { path } => format!("{path} is not a text file"),
        }
    }
}

/// Kind of a directory listing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    /// Symlinks, submodules and anything else the host reports.
    Other,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Repository-relative path.
    pub path: String,
    pub kind: EntryKind,
}

/// A file's decoded content plus the blob SHA the host needs for
/// compare-and-swap writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub path: String,
    pub content: String,
    pub sha: String,
}

/// A freshly opened pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedPullRequest {
    pub number: u64,
    pub html_url: String,
}

/// Read/write access to a repository host.
///
/// Every call is a single remote round-trip; nothing is cached or retried.
#[async_trait]
pub trait RepositoryAccessor: Send + Sync {
    /// SHA of the commit at the tip of `branch`.
    async fn branch_tip_sha(&self, repo: &RepoId, branch: &str) -> Result<String, RepoError>;

    /// Create `refs/heads/<new_branch>` pointing at `from_sha`.
    async fn create_branch(
        &self,
        repo: &RepoId,
        new_branch: &str,
        from_sha: &str,
    ) -> Result<(), RepoError>;

    /// List one directory level at `git_ref`.
    async fn list_directory(
        &self,
        repo: &RepoId,
        path: &str,
        git_ref: &str,
    ) -> Result<Vec<DirEntry>, RepoError>;

    /// Fetch a file at `git_ref`; `Ok(None)` when it does not exist.
    ///
    /// Content that is not valid UTF-8 fails with [`RepoError::NotText`].
    async fn get_file(
        &self,
        repo: &RepoId,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<RemoteFile>, RepoError>;

    async fn create_file(
        &self,
        repo: &RepoId,
        path: &str,
        message: &str,
        content: &str,
        branch: &str,
    ) -> Result<(), RepoError>;

    async fn update_file(
        &self,
        repo: &RepoId,
        path: &str,
        message: &str,
        content: &str,
        current_sha: &str,
        branch: &str,
    ) -> Result<(), RepoError>;

    async fn delete_file(
        &self,
        repo: &RepoId,
        path: &str,
        message: &str,
        current_sha: &str,
        branch: &str,
    ) -> Result<(), RepoError>;

    /// Open a pull request on `base_repo` from `head` (`owner:branch`) into `base_branch`.
    async fn create_pull_request(
        &self,
        base_repo: &RepoId,
        head: &str,
        base_branch: &str,
        title: &str,
        body: &str,
    ) -> Result<CreatedPullRequest, RepoError>;
}
