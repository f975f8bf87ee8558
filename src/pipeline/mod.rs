//! Patch pipeline: snapshot → prompt → model → validate → branch → apply → publish.
//!
//! Every stage runs sequentially inside one invocation. All stage failures
//! are typed and mapped to a single user-facing message at this boundary;
//! nothing is retried and partially applied writes are never rolled back.

pub mod branch;

use std::sync::Arc;

use thiserror::Error;
use tracing::Instrument;

use crate::apply::{self, ApplyError};
use crate::config::{Config, ConfigError};
use crate::llm::{CompletionGateway, LlmError};
use crate::models::{AppliedFile, AppliedSummary, ChangeKind, ProposedChangeSet, PullRequestRef};
use crate::progress::{ProgressTracker, Stage, StageStatus};
use crate::prompt;
use crate::publish::{self, PublishError, PublishRequest};
use crate::repo::{RepoError, RepositoryAccessor};
use crate::snapshot::{self, SnapshotError};
use crate::validate::{self, SchemaError};

pub use branch::{RunContext, generate_branch_name};

/// Reading from the repository failed before any write.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("could not resolve the tip of {branch}: {cause}")]
    BaseTip {
        branch: String,
        #[source]
        cause: RepoError,
    },

    #[error("could not look up {file}: {cause}")]
    Preview {
        file: String,
        #[source]
        cause: RepoError,
    },
}

impl FetchError {
    fn summary(&self) -> String {
        match self {
            FetchError::Snapshot(SnapshotError::List { path, source }) => {
                format!("listing {path} failed ({})", source.summary())
            }
            FetchError::Snapshot(SnapshotError::Read { path, source }) => {
                format!("reading {path} failed ({})", source.summary())
            }
            FetchError::Snapshot(SnapshotError::Vanished { path }) => {
                format!("{path} disappeared while it was being read")
            }
            FetchError::BaseTip { branch, cause } => {
                format!("the tip of {branch} could not be resolved ({})", cause.summary())
            }
            FetchError::Preview { file, cause } => {
                format!("looking up {file} failed ({})", cause.summary())
            }
        }
    }
}

/// Every way a pipeline run can fail.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("repository read failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("model request failed: {0}")]
    Llm(#[from] LlmError),

    #[error("invalid model response: {0}")]
    Schema(#[from] SchemaError),

    #[error("could not create branch {branch}: {cause}")]
    Branch {
        branch: String,
        #[source]
        cause: RepoError,
    },

    #[error("writing {file} on {branch} failed: {reason}")]
    GitWrite {
        branch: String,
        file: String,
        reason: String,
    },

    #[error("{cause}")]
    Publish {
        branch: String,
        #[source]
        cause: PublishError,
    },
}

impl PipelineError {
    /// Which stage failed and why, phrased for the person who asked.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::Config(e) => format!("Cannot start: {e}."),
            PipelineError::Fetch(e) => {
                format!("Could not read the repository: {}. Nothing was changed.", e.summary())
            }
            PipelineError::Llm(LlmError::Status { status, body }) => format!(
                "The language model request failed with HTTP {status}: {body}. Nothing was changed."
            ),
            PipelineError::Llm(LlmError::EmptyResponse) => {
                "The language model returned an empty response. Nothing was changed.".to_string()
            }
            PipelineError::Llm(e) => {
                format!("The language model request failed: {e}. Nothing was changed.")
            }
            PipelineError::Schema(SchemaError::InvalidJson { reason, .. }) => format!(
                "Failed to parse the model's response as JSON ({reason}). Nothing was changed."
            ),
            PipelineError::Schema(e) => format!(
                "The model's response did not match the expected format: {e}. Nothing was changed."
            ),
            PipelineError::Branch { branch, cause } => format!(
                "Could not create branch {branch}: {}. Nothing was changed.",
                cause.summary()
            ),
            PipelineError::GitWrite {
                branch,
                file,
                reason,
            } => format!(
                "Failed to apply the change to {file}: {reason}. \
                 Changes committed before it remain on branch {branch}; no pull request was opened."
            ),
            PipelineError::Publish { branch, cause } => format!(
                "All changes were committed to branch {branch}, but the pull request could not be opened: {}.",
                cause.cause.summary()
            ),
        }
    }
}

/// How a successful run ended.
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    /// The model proposed an empty change set; no branch was created.
    NoChanges,
    /// Dry run: what would be written, classified against the base branch.
    DryRun {
        change_set: ProposedChangeSet,
        planned: Vec<AppliedFile>,
    },
    /// The branch was created but every entry was a no-op, so there is
    /// nothing to propose.
    NothingCommitted { branch: String },
    Published {
        branch: String,
        pull_request: PullRequestRef,
        summary: AppliedSummary,
    },
}

impl PipelineOutcome {
    pub fn message(&self) -> String {
        match self {
            PipelineOutcome::NoChanges => "No changes proposed.".to_string(),
            PipelineOutcome::DryRun {
                change_set,
                planned,
            } => {
                let mut out = format!("Dry run: \"{}\"\n", change_set.pr_title);
                for file in planned {
                    out.push_str(&format!("  {:<9} {}\n", file.kind.to_string(), file.path));
                }
                out.push_str("No branch was created and nothing was written.");
                out
            }
            PipelineOutcome::NothingCommitted { branch } => format!(
                "Every proposed change already matched the base branch. \
                 Branch {branch} has no new commits, so no pull request was opened."
            ),
            PipelineOutcome::Published {
                branch,
                pull_request,
                summary,
            } => {
                let mut out = format!(
                    "Opened pull request #{} ({}) from branch {branch} with {} commit(s).",
                    pull_request.number,
                    pull_request.url,
                    summary.commits()
                );
                if !summary.failed.is_empty() {
                    out.push_str("\nThese files could not be written:");
                    for failed in &summary.failed {
                        out.push_str(&format!("\n  {}: {}", failed.path, failed.reason));
                    }
                }
                out
            }
        }
    }
}

/// Runs patch requests against one base/fork pair.
///
/// Holds no per-run state; any number of runs may execute concurrently on
/// the same pipeline, each with its own [`RunContext`] and progress tracker.
pub struct PatchPipeline {
    accessor: Arc<dyn RepositoryAccessor>,
    gateway: Arc<dyn CompletionGateway>,
    config: Config,
    dry_run: bool,
}

impl PatchPipeline {
    pub fn new(
        accessor: Arc<dyn RepositoryAccessor>,
        gateway: Arc<dyn CompletionGateway>,
        config: Config,
    ) -> Self {
        Self {
            accessor,
            gateway,
            config,
            dry_run: false,
        }
    }

    /// Stop after validation and report what would be written.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run once and render the result as a single message, success or not.
    pub async fn run(&self, instruction: &str) -> String {
        match self.execute(instruction).await {
            Ok(outcome) => outcome.message(),
            Err(e) => {
                tracing::warn!(error = %e, "pipeline failed");
                e.user_message()
            }
        }
    }

    /// Run once with a fresh [`RunContext`] and no progress display.
    pub async fn execute(&self, instruction: &str) -> Result<PipelineOutcome, PipelineError> {
        self.execute_with_progress(instruction, &ProgressTracker::disabled())
            .await
    }

    /// Run once, reporting stages to `progress`.
    ///
    /// The tracker belongs to this run alone; give each concurrent run its own.
    pub async fn execute_with_progress(
        &self,
        instruction: &str,
        progress: &ProgressTracker,
    ) -> Result<PipelineOutcome, PipelineError> {
        let ctx = RunContext::new(instruction, &self.config.pipeline.branch_prefix);
        let span = tracing::info_span!("pipeline", run_id = %ctx.run_id, branch = %ctx.branch);
        let result = self.execute_in(&ctx, progress).instrument(span).await;
        progress.finish();
        result
    }

    async fn execute_in(
        &self,
        ctx: &RunContext,
        progress: &ProgressTracker,
    ) -> Result<PipelineOutcome, PipelineError> {
        self.config.validate()?;
        let base_repo = self.config.base_repo()?;
        let fork_repo = self.config.fork_repo()?;
        let repo_cfg = &self.config.repository;
        let accessor = self.accessor.as_ref();

        tracing::info!(base = %base_repo, fork = %fork_repo, "patch run started");

        // Snapshot
        progress.update(Stage::Snapshot, StageStatus::InProgress);
        let snapshot = snapshot::build_snapshot(
            accessor,
            fork_repo,
            &repo_cfg.snapshot_root,
            &repo_cfg.base_branch,
        )
        .await
        .map_err(FetchError::from)
        .inspect_err(|e| fail(progress, Stage::Snapshot, e))?;
        done(progress, Stage::Snapshot, Some(format!("{} file(s)", snapshot.len())));

        // Prompt
        let composed = prompt::compose_prompt(&snapshot, &ctx.instruction);
        tracing::debug!(
            system_bytes = composed.system.len(),
            user_bytes = composed.user.len(),
            "prompt composed"
        );
        done(progress, Stage::Prompt, None);

        // Model
        progress.update(Stage::Complete, StageStatus::InProgress);
        let raw = self
            .gateway
            .complete(&composed.system, &composed.user)
            .await
            .inspect_err(|e| fail(progress, Stage::Complete, e))?;
        done(progress, Stage::Complete, None);

        // Validate
        let change_set =
            validate::parse_change_set(&raw).inspect_err(|e| fail(progress, Stage::Validate, e))?;
        done(
            progress,
            Stage::Validate,
            Some(format!("{} change(s)", change_set.changes.len())),
        );
        tracing::info!(changes = change_set.changes.len(), title = %change_set.pr_title, "change set validated");

        if change_set.is_empty() {
            tracing::info!("model proposed no changes");
            return Ok(PipelineOutcome::NoChanges);
        }

        if self.dry_run {
            let planned = apply::preview_change_set(
                accessor,
                fork_repo,
                &change_set,
                &repo_cfg.base_branch,
            )
            .await
            .map_err(|ApplyError { file, cause }| FetchError::Preview { file, cause })?;
            return Ok(PipelineOutcome::DryRun {
                change_set,
                planned,
            });
        }

        // Branch
        progress.update(Stage::Branch, StageStatus::InProgress);
        let tip = accessor
            .branch_tip_sha(base_repo, &repo_cfg.base_branch)
            .await
            .map_err(|cause| FetchError::BaseTip {
                branch: repo_cfg.base_branch.clone(),
                cause,
            })
            .inspect_err(|e| fail(progress, Stage::Branch, e))?;
        accessor
            .create_branch(fork_repo, &ctx.branch, &tip)
            .await
            .map_err(|cause| PipelineError::Branch {
                branch: ctx.branch.clone(),
                cause,
            })
            .inspect_err(|e| fail(progress, Stage::Branch, e))?;
        tracing::info!(from = %tip, "patch branch created");
        done(progress, Stage::Branch, Some(ctx.branch.clone()));

        // Apply
        progress.update(Stage::Apply, StageStatus::InProgress);
        let policy = self.config.pipeline.on_file_error;
        let summary = apply::apply_change_set(accessor, fork_repo, &change_set, &ctx.branch, policy)
            .await
            .map_err(|ApplyError { file, cause }| PipelineError::GitWrite {
                branch: ctx.branch.clone(),
                file,
                reason: cause.summary(),
            })
            .inspect_err(|e| fail(progress, Stage::Apply, e))?;

        if summary.commits() == 0 {
            if let Some(first) = summary.failed.first() {
                let err = PipelineError::GitWrite {
                    branch: ctx.branch.clone(),
                    file: first.path.clone(),
                    reason: first.reason.clone(),
                };
                fail(progress, Stage::Apply, &err);
                return Err(err);
            }
            done(progress, Stage::Apply, Some("no commits".to_string()));
            return Ok(PipelineOutcome::NothingCommitted {
                branch: ctx.branch.clone(),
            });
        }
        done(
            progress,
            Stage::Apply,
            Some(format!(
                "{} created, {} updated, {} deleted",
                summary.count(ChangeKind::Create),
                summary.count(ChangeKind::Update),
                summary.count(ChangeKind::Delete)
            )),
        );

        // Publish
        progress.update(Stage::Publish, StageStatus::InProgress);
        let request = PublishRequest {
            base_repo,
            head_owner: &fork_repo.owner,
            branch: &ctx.branch,
            base_branch: &repo_cfg.base_branch,
            title: &change_set.pr_title,
            body: &change_set.pr_body,
        };
        let pull_request = publish::publish(accessor, &request)
            .await
            .map_err(|cause| PipelineError::Publish {
                branch: ctx.branch.clone(),
                cause,
            })
            .inspect_err(|e| fail(progress, Stage::Publish, e))?;
        done(progress, Stage::Publish, Some(pull_request.url.clone()));

        Ok(PipelineOutcome::Published {
            branch: ctx.branch.clone(),
            pull_request,
            summary,
        })
    }
}

fn done(progress: &ProgressTracker, stage: Stage, detail: Option<String>) {
    progress.update(stage, StageStatus::Done(detail));
}

fn fail(progress: &ProgressTracker, stage: Stage, error: &dyn std::fmt::Display) {
    progress.update(stage, StageStatus::Failed(error.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_failure_names_branch() {
        let err = PipelineError::Publish {
            branch: "auto-fix-12345678".into(),
            cause: PublishError {
                head: "me:auto-fix-12345678".into(),
                cause: RepoError::Status {
                    operation: "pull request creation".into(),
                    status: 422,
                    body: "No commits between main and auto-fix-12345678".into(),
                },
            },
        };
        let msg = err.user_message();
        assert!(msg.contains("auto-fix-12345678"));
        assert!(msg.contains("HTTP 422"));
    }

    #[test]
    fn git_write_failure_names_file_and_branch() {
        let err = PipelineError::GitWrite {
            branch: "auto-fix-abcdef01".into(),
            file: "src/c.py".into(),
            reason: "HTTP 409: sha does not match".into(),
        };
        let msg = err.user_message();
        assert!(msg.contains("src/c.py"));
        assert!(msg.contains("auto-fix-abcdef01"));
        assert!(msg.contains("no pull request was opened"));
    }

    #[test]
    fn schema_failure_mentions_json() {
        let err = PipelineError::Schema(SchemaError::InvalidJson {
            reason: "EOF while parsing".into(),
            preview: "{".into(),
        });
        assert!(err.user_message().contains("JSON"));
    }

    #[test]
    fn transport_details_stay_out_of_messages() {
        let err = PipelineError::Fetch(FetchError::BaseTip {
            branch: "main".into(),
            cause: RepoError::Transport {
                url: "https://api.github.com/repos/a/b/git/ref/heads/main".into(),
                message: "dns error".into(),
            },
        });
        assert!(!err.user_message().contains("https://"));
    }

    #[test]
    fn published_message_lists_failed_files() {
        let mut summary = AppliedSummary::new("auto-fix-1");
        summary.applied.push(AppliedFile {
            path: "a.py".into(),
            kind: ChangeKind::Create,
        });
        summary.failed.push(crate::models::FailedFile {
            path: "b.py".into(),
            reason: "HTTP 409".into(),
        });
        let msg = PipelineOutcome::Published {
            branch: "auto-fix-1".into(),
            pull_request: PullRequestRef {
                number: 7,
                url: "https://github.com/up/bot/pull/7".into(),
            },
            summary,
        }
        .message();
        assert!(msg.contains("https://github.com/up/bot/pull/7"));
        assert!(msg.contains("auto-fix-1"));
        assert!(msg.contains("b.py: HTTP 409"));
    }
}
