//! autopatch: instruction-driven repository patch agent.
//!
//! Entry point and error handling boundary. Uses `anyhow` for
//! ergonomic error propagation and user-facing messages.

mod cli;

use std::io::IsTerminal;
use std::path::Path;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use autopatch::config::Config;
use autopatch::constants;
use autopatch::env::Env;
use autopatch::llm;
use autopatch::pipeline::PatchPipeline;
use autopatch::progress::ProgressTracker;
use autopatch::repo::github::GitHubClient;
use autopatch::snapshot;
use autopatch::trigger::{self, TriggerError};
use autopatch::worker::{self, LogIndicator};

use cli::args::{Cli, Command, ConfigArgs, RunArgs, SnapshotArgs};

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("Error: {err:#}");
        process::exit(1);
    }
}

/// Log to stderr, filtered by `AUTOPATCH_LOG` (default `warn`).
fn init_tracing() {
    let filter = EnvFilter::try_from_env(constants::ENV_LOG)
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => run_patch(*args).await,
        Command::Snapshot(args) => run_snapshot(args).await,
        Command::Config(args) => run_config(args),
        Command::Version => run_version(),
    }
}

/// Print detailed version and build information.
fn run_version() -> Result<()> {
    println!(
        "{} {}",
        constants::APP_NAME.bold(),
        constants::VERSION.green().bold()
    );
    println!("{}     {}", "target:".dimmed(), constants::TARGET);
    Ok(())
}

fn load_config(path: &Path, env: &Env) -> Result<Config> {
    let dir = std::fs::canonicalize(path)
        .with_context(|| format!("--path directory not found: {}", path.display()))?;
    Config::load(Some(&dir), env).context("failed to load configuration")
}

/// Print the merged configuration with secrets masked.
fn run_config(args: ConfigArgs) -> Result<()> {
    let config = load_config(&args.path, &Env::real())?;
    print!("{}", config.to_redacted_toml());
    Ok(())
}

/// List every file the snapshot would capture.
async fn run_snapshot(args: SnapshotArgs) -> Result<()> {
    let mut config = load_config(&args.repo.path, &Env::real())?;
    args.repo.apply_to(&mut config);

    let repo = config.fork_repo().context("cannot take a snapshot")?.clone();
    let git_ref = args
        .git_ref
        .unwrap_or_else(|| config.repository.base_branch.clone());
    let client = GitHubClient::from_config(&config).context("failed to set up GitHub client")?;

    let snapshot =
        snapshot::build_snapshot(&client, &repo, &config.repository.snapshot_root, &git_ref)
            .await
            .with_context(|| format!("failed to snapshot {repo}@{git_ref}"))?;

    for (path, content) in snapshot.iter() {
        println!("{:>10}  {path}", cli::human_size(content.len()));
    }
    eprintln!(
        "\n  {} {} file(s), {} from {repo}@{git_ref}",
        "✔".green().bold(),
        snapshot.len(),
        cli::human_size(snapshot.total_bytes()),
    );
    Ok(())
}

/// Run the full patch pipeline for one instruction.
async fn run_patch(args: RunArgs) -> Result<()> {
    let env = Env::real();
    let mut config = load_config(&args.repo.path, &env)?;
    args.apply_to(&mut config);
    config.resolve_api_key(&env);

    let instruction = match (args.joined_instruction(), args.message.as_deref()) {
        (Some(instruction), _) => instruction,
        (None, Some(message)) => match trigger::parse_command(message, &config.trigger.marker) {
            None => bail!(
                "message does not contain the trigger marker \"{}\"",
                config.trigger.marker
            ),
            Some(Err(TriggerError::EmptyInstruction)) => {
                bail!("message contains the trigger marker but no instruction")
            }
            Some(Ok(instruction)) => instruction,
        },
        (None, None) => bail!("an instruction or --message is required"),
    };

    config.validate().context("incomplete configuration")?;

    let accessor = Arc::new(GitHubClient::from_config(&config).context("failed to set up GitHub client")?);
    let gateway = llm::build_gateway(&config.provider).context("failed to set up LLM provider")?;

    let show_progress = !args.no_progress && std::io::stderr().is_terminal();
    let heartbeat = Duration::from_secs(config.pipeline.heartbeat_secs);
    let progress = ProgressTracker::new(
        format!("Patching {}", config.repository.snapshot_root),
        show_progress,
    );

    if show_progress {
        cli::print_header(&instruction, args.dry_run);
        progress.start();
    }

    let pipeline = Arc::new(PatchPipeline::new(accessor, gateway, config).with_dry_run(args.dry_run));

    let outcome = if show_progress {
        pipeline.execute_with_progress(&instruction, &progress).await
    } else {
        let work = {
            let pipeline = Arc::clone(&pipeline);
            async move { pipeline.execute(&instruction).await }
        };
        worker::run_with_heartbeat(work, &LogIndicator, heartbeat)
            .await
            .context("pipeline task ended abnormally")?
    };

    match outcome {
        Ok(outcome) => {
            println!("{}", outcome.message());
            Ok(())
        }
        Err(e) => {
            tracing::debug!(error = ?e, "pipeline error detail");
            eprintln!("{} {}", "✖".red().bold(), e.user_message().red());
            process::exit(1);
        }
    }
}
