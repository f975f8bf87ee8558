//! Results of the apply and publish stages.

use serde::Serialize;

use super::changeset::ChangeKind;

/// One file the applier handled successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedFile {
    pub path: String,
    pub kind: ChangeKind,
}

/// One file whose write failed (only collected under the `continue` policy).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFile {
    pub path: String,
    pub reason: String,
}

/// Everything the applier did on the patch branch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AppliedSummary {
    pub branch: String,
    pub applied: Vec<AppliedFile>,
    pub failed: Vec<FailedFile>,
}

impl AppliedSummary {
    pub fn new(branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            ..Self::default()
        }
    }

    /// Number of commits that landed on the branch.
    pub fn commits(&self) -> usize {
        self.applied.iter().filter(|f| f.kind.writes()).count()
    }

    pub fn count(&self, kind: ChangeKind) -> usize {
        self.applied.iter().filter(|f| f.kind == kind).count()
    }
}

/// A pull request opened by the publisher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequestRef {
    pub number: u64,
    pub url: String,
}
