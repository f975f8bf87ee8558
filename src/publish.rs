//! Publisher: opens the pull request for a patch branch.

use thiserror::Error;

use crate::constants::AI_DISCLOSURE;
use crate::models::{PullRequestRef, RepoId};
use crate::repo::{RepoError, RepositoryAccessor};

/// Pull request creation failed. The branch and its commits are untouched.
#[derive(Error, Debug)]
#[error("could not open pull request from {head}: {cause}")]
pub struct PublishError {
    pub head: String,
    #[source]
    pub cause: RepoError,
}

/// What to publish and where.
#[derive(Debug, Clone)]
pub struct PublishRequest<'a> {
    /// Repository receiving the pull request.
    pub base_repo: &'a RepoId,
    /// Owner of the repository holding `branch`.
    pub head_owner: &'a str,
    pub branch: &'a str,
    pub base_branch: &'a str,
    pub title: &'a str,
    pub body: &'a str,
}

impl PublishRequest<'_> {
    /// `owner:branch`, the form the hosting API expects for cross-repo heads.
    pub fn head(&self) -> String {
        format!("{}:{}", self.head_owner, self.branch)
    }
}

/// Open the pull request described by `request`.
pub async fn publish(
    accessor: &dyn RepositoryAccessor,
    request: &PublishRequest<'_>,
) -> Result<PullRequestRef, PublishError> {
    let head = request.head();
    let body = pr_body(request.body);

    let created = accessor
        .create_pull_request(
            request.base_repo,
            &head,
            request.base_branch,
            request.title,
            &body,
        )
        .await
        .map_err(|cause| PublishError {
            head: head.clone(),
            cause,
        })?;

    tracing::info!(
        number = created.number,
        url = %created.html_url,
        head = %head,
        base = %request.base_repo,
        "pull request opened"
    );

    Ok(PullRequestRef {
        number: created.number,
        url: created.html_url,
    })
}

/// Model-supplied body followed by the generated-change disclosure.
pub fn pr_body(body: &str) -> String {
    let body = body.trim_end();
    if body.is_empty() {
        format!("---\n{AI_DISCLOSURE}\n")
    } else {
        format!("{body}\n\n---\n{AI_DISCLOSURE}\n")
    }
}
