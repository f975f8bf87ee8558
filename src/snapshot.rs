//! Snapshot builder.
//!
//! Walks a subtree of the remote repository at a given ref and captures
//! every regular file's content. Traversal uses an explicit work stack so
//! deep trees never grow the call stack, and each directory is listed at
//! most once. Files that are not UTF-8 text are left out of the snapshot.

use std::collections::HashSet;

use thiserror::Error;

use crate::models::{RepoId, RepositorySnapshot};
use crate::repo::{EntryKind, RepoError, RepositoryAccessor};

/// Errors while capturing a snapshot.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("could not list {path}: {source}")]
    List { path: String, source: RepoError },

    #[error("could not read {path}: {source}")]
    Read { path: String, source: RepoError },

    #[error("{path} was listed but no longer exists")]
    Vanished { path: String },
}

/// Capture every file under `root` on `git_ref`.
///
/// Fails on the first listing or read error; a partial snapshot is never
/// returned.
pub async fn build_snapshot(
    accessor: &dyn RepositoryAccessor,
    repo: &RepoId,
    root: &str,
    git_ref: &str,
) -> Result<RepositorySnapshot, SnapshotError> {
    let root = root.trim_matches('/');
    let mut snapshot = RepositorySnapshot::new(root, git_ref);
    let mut pending = vec![root.to_string()];
    let mut visited = HashSet::new();

    while let Some(dir) = pending.pop() {
        if !visited.insert(dir.clone()) {
            tracing::warn!(path = %dir, "directory listed twice, skipping");
            continue;
        }

        let entries = accessor
            .list_directory(repo, &dir, git_ref)
            .await
            .map_err(|source| SnapshotError::List {
                path: display_path(&dir),
                source,
            })?;

        for entry in entries {
            match entry.kind {
                EntryKind::Dir => pending.push(entry.path),
                EntryKind::File => {
                    let fetched = accessor.get_file(repo, &entry.path, git_ref).await;
                    let file = match fetched {
                        Ok(file) => file,
                        Err(RepoError::NotText { .. }) => {
                            tracing::debug!(path = %entry.path, "skipping non-text file");
                            continue;
                        }
                        Err(source) => {
                            return Err(SnapshotError::Read {
                                path: entry.path,
                                source,
                            });
                        }
                    };
                    let file = file.ok_or_else(|| SnapshotError::Vanished {
                        path: entry.path.clone(),
                    })?;
                    snapshot.insert(entry.path, file.content);
                }
                EntryKind::Other => {
                    tracing::debug!(path = %entry.path, "skipping non-regular entry");
                }
            }
        }
    }

    tracing::info!(
        files = snapshot.len(),
        bytes = snapshot.total_bytes(),
        root = %display_path(root),
        git_ref,
        "snapshot captured"
    );
    Ok(snapshot)
}

fn display_path(path: &str) -> String {
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::{CreatedPullRequest, DirEntry, RemoteFile};
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Read-only tree: directory path → entries, file path → content.
    struct Tree {
        dirs: HashMap<String, Vec<DirEntry>>,
        files: HashMap<String, String>,
        binary: HashSet<String>,
    }

    fn entry(path: &str, kind: EntryKind) -> DirEntry {
        DirEntry {
            path: path.to_string(),
            kind,
        }
    }

    #[async_trait]
    impl RepositoryAccessor for Tree {
        async fn branch_tip_sha(&self, _: &RepoId, _: &str) -> Result<String, RepoError> {
            unreachable!()
        }
        async fn create_branch(&self, _: &RepoId, _: &str, _: &str) -> Result<(), RepoError> {
            unreachable!()
        }
        async fn list_directory(
            &self,
            _: &RepoId,
            path: &str,
            _: &str,
        ) -> Result<Vec<DirEntry>, RepoError> {
            self.dirs.get(path).cloned().ok_or(RepoError::Status {
                operation: "directory listing".into(),
                status: 404,
                body: "Not Found".into(),
            })
        }
        async fn get_file(
            &self,
            _: &RepoId,
            path: &str,
            _: &str,
        ) -> Result<Option<RemoteFile>, RepoError> {
            if self.binary.contains(path) {
                return Err(RepoError::NotText {
                    path: path.to_string(),
                });
            }
            Ok(self.files.get(path).map(|c| RemoteFile {
                path: path.to_string(),
                content: c.clone(),
                sha: format!("sha-{path}"),
            }))
        }
        async fn create_file(&self, _: &RepoId, _: &str, _: &str, _: &str, _: &str) -> Result<(), RepoError> {
            unreachable!()
        }
        async fn update_file(&self, _: &RepoId, _: &str, _: &str, _: &str, _: &str, _: &str) -> Result<(), RepoError> {
            unreachable!()
        }
        async fn delete_file(&self, _: &RepoId, _: &str, _: &str, _: &str, _: &str) -> Result<(), RepoError> {
            unreachable!()
        }
        async fn create_pull_request(&self, _: &RepoId, _: &str, _: &str, _: &str, _: &str) -> Result<CreatedPullRequest, RepoError> {
            unreachable!()
        }
    }

    fn sample_tree() -> Tree {
        let mut dirs = HashMap::new();
        dirs.insert(
            "src".to_string(),
            vec![
                entry("src/bot.py", EntryKind::File),
                entry("src/utils", EntryKind::Dir),
                entry("src/link", EntryKind::Other),
            ],
        );
        dirs.insert(
            "src/utils".to_string(),
            vec![
                entry("src/utils/helper.py", EntryKind::File),
                entry("src/utils/deep", EntryKind::Dir),
            ],
        );
        dirs.insert(
            "src/utils/deep".to_string(),
            vec![entry("src/utils/deep/x.py", EntryKind::File)],
        );
        let files = [
            ("src/bot.py", "print('bot')"),
            ("src/utils/helper.py", "def help(): pass"),
            ("src/utils/deep/x.py", "X = 1"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Tree {
            dirs,
            files,
            binary: HashSet::new(),
        }
    }

    #[tokio::test]
    async fn captures_every_nested_file() {
        let tree = sample_tree();
        let repo = RepoId::new("me", "bot");
        let snapshot = build_snapshot(&tree, &repo, "src", "main").await.unwrap();

        let paths: Vec<_> = snapshot.iter().map(|(p, _)| p).collect();
        assert_eq!(
            paths,
            vec!["src/bot.py", "src/utils/deep/x.py", "src/utils/helper.py"]
        );
        assert_eq!(snapshot.get("src/utils/deep/x.py"), Some("X = 1"));
        assert_eq!(snapshot.git_ref, "main");
    }

    #[tokio::test]
    async fn directories_and_other_entries_are_never_stored() {
        let tree = sample_tree();
        let snapshot = build_snapshot(&tree, &RepoId::new("me", "bot"), "/src/", "main")
            .await
            .unwrap();
        assert!(!snapshot.contains("src/utils"));
        assert!(!snapshot.contains("src/link"));
        assert_eq!(snapshot.root, "src");
    }

    #[tokio::test]
    async fn listing_failure_is_reported_with_path() {
        let mut tree = sample_tree();
        tree.dirs.remove("src/utils/deep");
        let err = build_snapshot(&tree, &RepoId::new("me", "bot"), "src", "main")
            .await
            .unwrap_err();
        assert!(matches!(err, SnapshotError::List { ref path, .. } if path == "src/utils/deep"));
    }

    #[tokio::test]
    async fn binary_files_are_skipped() {
        let mut tree = sample_tree();
        tree.dirs
            .get_mut("src")
            .unwrap()
            .push(entry("src/logo.png", EntryKind::File));
        tree.binary.insert("src/logo.png".to_string());

        let snapshot = build_snapshot(&tree, &RepoId::new("me", "bot"), "src", "main")
            .await
            .unwrap();
        assert!(!snapshot.contains("src/logo.png"));
        assert_eq!(snapshot.len(), 3);
    }

    #[tokio::test]
    async fn vanished_file_fails_the_snapshot() {
        let mut tree = sample_tree();
        tree.files.remove("src/bot.py");
        let err = build_snapshot(&tree, &RepoId::new("me", "bot"), "src", "main")
            .await
            .unwrap_err();
        assert!(matches!(err, SnapshotError::Vanished { .. }));
    }

    #[tokio::test]
    async fn cyclic_listing_terminates() {
        let mut tree = sample_tree();
        tree.dirs
            .get_mut("src/utils/deep")
            .unwrap()
            .push(entry("src/utils", EntryKind::Dir));
        let snapshot = build_snapshot(&tree, &RepoId::new("me", "bot"), "src", "main")
            .await
            .unwrap();
        assert_eq!(snapshot.len(), 3);
    }
}
