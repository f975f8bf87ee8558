//! Clap argument types and config overrides.

use clap::Parser;
use std::path::PathBuf;

use autopatch::config::{Config, FailurePolicy};
use autopatch::models::{ProviderName, RepoId};

/// Turn a natural-language instruction into a pull request.
#[derive(Parser, Debug)]
#[command(
    name = "autopatch",
    version = autopatch::constants::VERSION,
    about = "Instruction-driven repository patch agent: snapshot, ask a model, commit, open a PR.",
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Propose changes for an instruction and open a pull request.
    Run(Box<RunArgs>),

    /// List the files the snapshot would capture.
    Snapshot(SnapshotArgs),

    /// Print the effective configuration with secrets redacted.
    Config(ConfigArgs),

    /// Print version and build information.
    Version,
}

/// Settings shared by every command that talks to the repository.
#[derive(clap::Args, Debug)]
pub struct RepoArgs {
    /// Directory holding `.autopatch.toml` (default: current directory).
    #[arg(long, default_value = ".")]
    pub path: PathBuf,

    /// Upstream repository that receives the pull request (owner/name).
    #[arg(long)]
    pub base_repo: Option<RepoId>,

    /// Repository the patch branch is pushed to (owner/name).
    #[arg(long)]
    pub fork_repo: Option<RepoId>,

    /// Subtree captured into the snapshot.
    #[arg(long)]
    pub root: Option<String>,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// The instruction, e.g. "add a LICENSE file with MIT text".
    #[arg(num_args = 1.., trailing_var_arg = true, required_unless_present = "message")]
    pub instruction: Vec<String>,

    /// Raw chat message; the trigger marker and mentions are stripped.
    #[arg(long, conflicts_with = "instruction")]
    pub message: Option<String>,

    #[command(flatten)]
    pub repo: RepoArgs,

    /// LLM provider.
    #[arg(long)]
    pub provider: Option<ProviderName>,

    /// Model name.
    #[arg(long)]
    pub model: Option<String>,

    /// Keep applying remaining files after a write fails.
    #[arg(long, default_value_t = false)]
    pub continue_on_error: bool,

    /// Stop after validation and show what would change.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Disable the stage progress display.
    #[arg(long, default_value_t = false)]
    pub no_progress: bool,
}

/// Arguments for the `snapshot` subcommand.
#[derive(Parser, Debug)]
pub struct SnapshotArgs {
    #[command(flatten)]
    pub repo: RepoArgs,

    /// Branch or ref to read (default: the configured base branch).
    #[arg(long = "ref")]
    pub git_ref: Option<String>,
}

/// Arguments for the `config` subcommand.
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Directory holding `.autopatch.toml` (default: current directory).
    #[arg(long, default_value = ".")]
    pub path: PathBuf,
}

impl RepoArgs {
    /// Layer the flags over an already loaded config.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(ref base) = self.base_repo {
            config.repository.base = Some(base.clone());
        }
        if let Some(ref fork) = self.fork_repo {
            config.repository.fork = Some(fork.clone());
        }
        if let Some(ref root) = self.root {
            config.repository.snapshot_root = root.clone();
        }
    }
}

impl RunArgs {
    pub fn apply_to(&self, config: &mut Config) {
        self.repo.apply_to(config);
        if let Some(provider) = self.provider {
            config.switch_provider(provider);
        }
        if let Some(ref model) = self.model {
            config.provider.model = model.clone();
        }
        if self.continue_on_error {
            config.pipeline.on_file_error = FailurePolicy::Continue;
        }
    }

    /// The instruction as typed, or `None` when `--message` is used.
    pub fn joined_instruction(&self) -> Option<String> {
        if self.instruction.is_empty() {
            None
        } else {
            Some(self.instruction.join(" "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("autopatch").chain(args.iter().copied())).unwrap()
    }

    fn run_args(args: &[&str]) -> RunArgs {
        match parse(args).command {
            Command::Run(run) => *run,
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn instruction_words_are_joined() {
        let run = run_args(&["run", "add", "a", "LICENSE", "file"]);
        assert_eq!(run.joined_instruction().as_deref(), Some("add a LICENSE file"));
        assert!(!run.dry_run);
    }

    #[test]
    fn message_replaces_instruction() {
        let run = run_args(&["run", "--message", "<@1> Dev mode fix typo"]);
        assert_eq!(run.joined_instruction(), None);
        assert_eq!(run.message.as_deref(), Some("<@1> Dev mode fix typo"));
    }

    #[test]
    fn run_requires_instruction_or_message() {
        assert!(Cli::try_parse_from(["autopatch", "run"]).is_err());
    }

    #[test]
    fn flags_override_config() {
        let run = run_args(&[
            "run",
            "--base-repo",
            "up/bot",
            "--fork-repo",
            "me/bot",
            "--root",
            "lib",
            "--provider",
            "anthropic",
            "--model",
            "claude-sonnet-4-5",
            "--continue-on-error",
            "do",
            "it",
        ]);
        let mut config = Config::default();
        config.provider.api_key = Some("sk-openai".to_string());
        run.apply_to(&mut config);
        assert_eq!(config.repository.base, Some(RepoId::new("up", "bot")));
        assert_eq!(config.repository.fork, Some(RepoId::new("me", "bot")));
        assert_eq!(config.repository.snapshot_root, "lib");
        assert_eq!(config.provider.name, ProviderName::Anthropic);
        assert_eq!(config.provider.api_key, None);
        assert_eq!(config.provider.model, "claude-sonnet-4-5");
        assert_eq!(config.pipeline.on_file_error, FailurePolicy::Continue);
    }

    #[test]
    fn malformed_repo_is_rejected() {
        assert!(Cli::try_parse_from(["autopatch", "snapshot", "--base-repo", "nope"]).is_err());
    }

    #[test]
    fn snapshot_ref_flag() {
        match parse(&["snapshot", "--ref", "dev"]).command {
            Command::Snapshot(args) => assert_eq!(args.git_ref.as_deref(), Some("dev")),
            other => panic!("expected snapshot, got {other:?}"),
        }
    }
}
