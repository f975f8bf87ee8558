//! Proposed change-set types.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The validated proposal returned by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedChangeSet {
    pub pr_title: String,
    pub pr_body: String,
    /// Path → change, in the order the model listed them.
    pub changes: IndexMap<String, FileChange>,
}

impl ProposedChangeSet {
    /// `true` when the model decided nothing needs to change.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// One proposed edit to a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub commit_message: String,
    /// Full replacement content. An empty string requests deletion.
    pub updated_code: String,
}

impl FileChange {
    pub fn is_deletion(&self) -> bool {
        self.updated_code.is_empty()
    }
}

/// What the applier does with one entry once it knows the branch state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
    /// Deletion requested for a file that does not exist.
    Skip,
    /// Update whose content already matches the branch.
    Unchanged,
}

impl ChangeKind {
    /// Classify a change against the file's current branch content.
    ///
    /// `current` is `None` when the file does not exist on the branch.
    pub fn classify(change: &FileChange, current: Option<&str>) -> Self {
        match (change.is_deletion(), current) {
            (true, Some(_)) => ChangeKind::Delete,
            (true, None) => ChangeKind::Skip,
            (false, None) => ChangeKind::Create,
            (false, Some(existing)) if existing == change.updated_code => ChangeKind::Unchanged,
            (false, Some(_)) => ChangeKind::Update,
        }
    }

    /// Whether this kind results in a commit on the branch.
    pub fn writes(self) -> bool {
        matches!(self, ChangeKind::Create | ChangeKind::Update | ChangeKind::Delete)
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ChangeKind::Create => "create",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
            ChangeKind::Skip => "skip",
            ChangeKind::Unchanged => "unchanged",
        };
        f.write_str(label)
    }
}
