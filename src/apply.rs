//! Change applier.
//!
//! Writes a validated change set onto the patch branch, one commit per
//! file. Each entry is classified against a fresh lookup on the branch
//! itself, so update and delete always carry the branch's current blob SHA
//! rather than the one seen in the snapshot.

use thiserror::Error;

use crate::config::FailurePolicy;
use crate::models::{
    AppliedFile, AppliedSummary, ChangeKind, FailedFile, FileChange, ProposedChangeSet, RepoId,
};
use crate::repo::{RemoteFile, RepoError, RepositoryAccessor};

/// A single file operation failed.
#[derive(Error, Debug)]
#[error("{file}: {cause}")]
pub struct ApplyError {
    pub file: String,
    #[source]
    pub cause: RepoError,
}

/// Apply every entry of `change_set` to `branch` on `repo`.
///
/// Under [`FailurePolicy::Abort`] the first failure is returned and the
/// remaining entries are not attempted. Under [`FailurePolicy::Continue`]
/// failures are collected into [`AppliedSummary::failed`]. Writes that
/// already landed are never undone.
pub async fn apply_change_set(
    accessor: &dyn RepositoryAccessor,
    repo: &RepoId,
    change_set: &ProposedChangeSet,
    branch: &str,
    policy: FailurePolicy,
) -> Result<AppliedSummary, ApplyError> {
    let mut summary = AppliedSummary::new(branch);

    for (path, change) in &change_set.changes {
        match apply_one(accessor, repo, path, change, branch).await {
            Ok(kind) => {
                tracing::info!(path = %path, kind = %kind, branch, "file applied");
                summary.applied.push(AppliedFile {
                    path: path.clone(),
                    kind,
                });
            }
            Err(cause) => {
                tracing::warn!(path = %path, branch, error = %cause, "file write failed");
                match policy {
                    FailurePolicy::Abort => {
                        return Err(ApplyError {
                            file: path.clone(),
                            cause,
                        });
                    }
                    FailurePolicy::Continue => summary.failed.push(FailedFile {
                        path: path.clone(),
                        reason: cause.summary(),
                    }),
                }
            }
        }
    }

    Ok(summary)
}

/// Classify every entry against `git_ref` without writing anything.
pub async fn preview_change_set(
    accessor: &dyn RepositoryAccessor,
    repo: &RepoId,
    change_set: &ProposedChangeSet,
    git_ref: &str,
) -> Result<Vec<AppliedFile>, ApplyError> {
    let mut planned = Vec::with_capacity(change_set.changes.len());
    for (path, change) in &change_set.changes {
        let current = fetch_current(accessor, repo, path, git_ref)
            .await
            .map_err(|cause| ApplyError {
                file: path.clone(),
                cause,
            })?;
        planned.push(AppliedFile {
            path: path.clone(),
            kind: ChangeKind::classify(change, current.as_ref().map(|f| f.content.as_str())),
        });
    }
    Ok(planned)
}

async fn apply_one(
    accessor: &dyn RepositoryAccessor,
    repo: &RepoId,
    path: &str,
    change: &FileChange,
    branch: &str,
) -> Result<ChangeKind, RepoError> {
    let current = fetch_current(accessor, repo, path, branch).await?;
    let kind = ChangeKind::classify(change, current.as_ref().map(|f| f.content.as_str()));
    let sha = current.map(|f| f.sha);

    match (kind, sha.as_deref()) {
        (ChangeKind::Create, _) => {
            accessor
                .create_file(repo, path, &change.commit_message, &change.updated_code, branch)
                .await?;
        }
        (ChangeKind::Update, Some(sha)) => {
            accessor
                .update_file(
                    repo,
                    path,
                    &change.commit_message,
                    &change.updated_code,
                    sha,
                    branch,
                )
                .await?;
        }
        (ChangeKind::Delete, Some(sha)) => {
            accessor
                .delete_file(repo, path, &change.commit_message, sha, branch)
                .await?;
        }
        (kind, _) => {
            tracing::debug!(path, %kind, "no write needed");
        }
    }

    Ok(kind)
}

async fn fetch_current(
    accessor: &dyn RepositoryAccessor,
    repo: &RepoId,
    path: &str,
    git_ref: &str,
) -> Result<Option<RemoteFile>, RepoError> {
    accessor.get_file(repo, path, git_ref).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::{CreatedPullRequest, DirEntry};
    use async_trait::async_trait;
    use indexmap::IndexMap;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Branch contents plus a log of every write, with optional failure on
    /// a given path.
    #[derive(Default)]
    struct Branch {
        files: Mutex<HashMap<String, (String, String)>>,
        writes: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    impl Branch {
        fn with(files: &[(&str, &str)]) -> Self {
            let files = files
                .iter()
                .map(|(p, c)| (p.to_string(), (c.to_string(), format!("sha-{p}"))))
                .collect();
            Self {
                files: Mutex::new(files),
                ..Self::default()
            }
        }

        fn record(&self, op: &str, path: &str) -> Result<(), RepoError> {
            if self.fail_on.as_deref() == Some(path) {
                return Err(RepoError::Status {
                    operation: format!("{op} {path}"),
                    status: 409,
                    body: "sha does not match".into(),
                });
            }
            self.writes.lock().unwrap().push(format!("{op} {path}"));
            Ok(())
        }

        fn writes(&self) -> Vec<String> {
            self.writes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RepositoryAccessor for Branch {
        async fn branch_tip_sha(&self, _: &RepoId, _: &str) -> Result<String, RepoError> {
            unreachable!()
        }
        async fn create_branch(&self, _: &RepoId, _: &str, _: &str) -> Result<(), RepoError> {
            unreachable!()
        }
        async fn list_directory(&self, _: &RepoId, _: &str, _: &str) -> Result<Vec<DirEntry>, RepoError> {
            unreachable!()
        }
        async fn get_file(&self, _: &RepoId, path: &str, _: &str) -> Result<Option<RemoteFile>, RepoError> {
            Ok(self.files.lock().unwrap().get(path).map(|(c, s)| RemoteFile {
                path: path.into(),
                content: c.clone(),
                sha: s.clone(),
            }))
        }
        async fn create_file(&self, _: &RepoId, path: &str, _: &str, content: &str, _: &str) -> Result<(), RepoError> {
            self.record("create", path)?;
            self.files
                .lock()
                .unwrap()
                .insert(path.into(), (content.into(), "new".into()));
            Ok(())
        }
        async fn update_file(&self, _: &RepoId, path: &str, _: &str, content: &str, sha: &str, _: &str) -> Result<(), RepoError> {
            assert_eq!(sha, format!("sha-{path}"), "update must use the branch SHA");
            self.record("update", path)?;
            self.files
                .lock()
                .unwrap()
                .insert(path.into(), (content.into(), "new".into()));
            Ok(())
        }
        async fn delete_file(&self, _: &RepoId, path: &str, _: &str, sha: &str, _: &str) -> Result<(), RepoError> {
            assert_eq!(sha, format!("sha-{path}"), "delete must use the branch SHA");
            self.record("delete", path)?;
            self.files.lock().unwrap().remove(path);
            Ok(())
        }
        async fn create_pull_request(&self, _: &RepoId, _: &str, _: &str, _: &str, _: &str) -> Result<CreatedPullRequest, RepoError> {
            unreachable!()
        }
    }

    fn change_set(entries: &[(&str, &str)]) -> ProposedChangeSet {
        let changes: IndexMap<_, _> = entries
            .iter()
            .map(|(p, code)| {
                (
                    p.to_string(),
                    FileChange {
                        commit_message: format!("touch {p}"),
                        updated_code: code.to_string(),
                    },
                )
            })
            .collect();
        ProposedChangeSet {
            pr_title: "t".into(),
            pr_body: String::new(),
            changes,
        }
    }

    fn repo() -> RepoId {
        RepoId::new("fork", "bot")
    }

    #[tokio::test]
    async fn classifies_each_entry_against_branch() {
        let branch = Branch::with(&[("a.py", "old"), ("b.py", "gone soon"), ("same.py", "x")]);
        let set = change_set(&[
            ("a.py", "new"),
            ("b.py", ""),
            ("c.py", "fresh"),
            ("ghost.py", ""),
            ("same.py", "x"),
        ]);

        let summary = apply_change_set(&branch, &repo(), &set, "auto-fix-1", FailurePolicy::Abort)
            .await
            .unwrap();

        assert_eq!(
            branch.writes(),
            vec!["update a.py", "delete b.py", "create c.py"]
        );
        let kinds: Vec<_> = summary.applied.iter().map(|f| f.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ChangeKind::Update,
                ChangeKind::Delete,
                ChangeKind::Create,
                ChangeKind::Skip,
                ChangeKind::Unchanged
            ]
        );
        assert_eq!(summary.commits(), 3);
        assert_eq!(summary.branch, "auto-fix-1");
    }

    #[tokio::test]
    async fn abort_stops_at_first_failure() {
        let mut branch = Branch::with(&[("b.py", "old")]);
        branch.fail_on = Some("b.py".into());
        let set = change_set(&[("a.py", "A"), ("b.py", "B"), ("c.py", "C")]);

        let err = apply_change_set(&branch, &repo(), &set, "br", FailurePolicy::Abort)
            .await
            .unwrap_err();

        assert_eq!(err.file, "b.py");
        assert_eq!(err.cause.status(), Some(409));
        assert_eq!(branch.writes(), vec!["create a.py"]);
    }

    #[tokio::test]
    async fn continue_collects_failures() {
        let mut branch = Branch::with(&[("b.py", "old")]);
        branch.fail_on = Some("b.py".into());
        let set = change_set(&[("a.py", "A"), ("b.py", "B"), ("c.py", "C")]);

        let summary = apply_change_set(&branch, &repo(), &set, "br", FailurePolicy::Continue)
            .await
            .unwrap();

        assert_eq!(branch.writes(), vec!["create a.py", "create c.py"]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].path, "b.py");
        assert!(summary.failed[0].reason.contains("409"));
    }

    #[tokio::test]
    async fn preview_writes_nothing() {
        let branch = Branch::with(&[("a.py", "old")]);
        let set = change_set(&[("a.py", ""), ("b.py", "B")]);
        let planned = preview_change_set(&branch, &repo(), &set, "main").await.unwrap();
        assert_eq!(planned[0].kind, ChangeKind::Delete);
        assert_eq!(planned[1].kind, ChangeKind::Create);
        assert!(branch.writes().is_empty());
    }
}
