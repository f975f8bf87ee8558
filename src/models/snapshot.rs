//! Repository snapshot type.

use indexmap::IndexMap;

/// File contents captured from one subtree of a repository at one ref.
///
/// Keys are repository-relative paths of regular files; directories are
/// expanded during capture and never stored. Entries are kept sorted by
/// path so the composed prompt is stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositorySnapshot {
    /// Subtree the snapshot was rooted at (empty string = repository root).
    pub root: String,
    /// Branch or ref the contents were read from.
    pub git_ref: String,
    files: IndexMap<String, String>,
}

impl RepositorySnapshot {
    pub fn new(root: impl Into<String>, git_ref: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            git_ref: git_ref.into(),
            files: IndexMap::new(),
        }
    }

    /// Build a snapshot from already-known `(path, content)` pairs.
    pub fn from_files(
        root: impl Into<String>,
        git_ref: impl Into<String>,
        files: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        let mut snapshot = Self::new(root, git_ref);
        for (path, content) in files {
            snapshot.insert(path, content);
        }
        snapshot
    }

    /// Record a file, keeping the map sorted by path.
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) {
        let path = path.into();
        match self.files.binary_search_keys(&path) {
            Ok(_) => {
                self.files.insert(path, content.into());
            }
            Err(idx) => {
                self.files.shift_insert(idx, path, content.into());
            }
        }
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Iterate `(path, content)` in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Total size of all captured contents in bytes.
    pub fn total_bytes(&self) -> usize {
        self.files.values().map(String::len).sum()
    }
}
