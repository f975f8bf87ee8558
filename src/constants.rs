//! App-wide constants.
//!
//! Centralises the tool name, config paths, environment variable names,
//! and pipeline naming conventions so a rename only requires changing this file.

/// Display name of the tool (lowercase).
pub const APP_NAME: &str = "autopatch";

/// Crate version baked in at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Target triple baked in by `build.rs`.
pub const TARGET: &str = env!("TARGET");

/// Local config filename (e.g. `.autopatch.toml` in the working directory).
pub const CONFIG_FILENAME: &str = ".autopatch.toml";

/// Directory name under `~/.config/` for global config.
pub const CONFIG_DIR: &str = "autopatch";

/// Default REST endpoint of the hosting service.
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// Branch every patch branch is cut from and every pull request targets.
pub const DEFAULT_BASE_BRANCH: &str = "main";

/// Subtree captured into the snapshot when nothing else is configured.
pub const DEFAULT_SNAPSHOT_ROOT: &str = "src";

/// Prefix of every patch branch name.
pub const BRANCH_PREFIX: &str = "auto-fix-";

/// Number of hex characters appended to [`BRANCH_PREFIX`].
pub const BRANCH_SUFFIX_LEN: usize = 8;

/// Pull request title used when the model does not supply one.
pub const DEFAULT_PR_TITLE: &str = "Automated changes";

/// Marker that turns a chat message into a patch request.
pub const DEFAULT_TRIGGER_MARKER: &str = "Dev mode";

/// Footer appended to every pull request body.
pub const AI_DISCLOSURE: &str =
    "This pull request was generated automatically by autopatch from a natural-language instruction. Review every change before merging.";

// ── Environment variable names ──────────────────────────────────────

pub const ENV_PROVIDER: &str = "AUTOPATCH_PROVIDER";
pub const ENV_MODEL: &str = "AUTOPATCH_MODEL";
pub const ENV_API_KEY: &str = "AUTOPATCH_API_KEY";
pub const ENV_BASE_URL: &str = "AUTOPATCH_BASE_URL";
pub const ENV_GITHUB_TOKEN: &str = "AUTOPATCH_GITHUB_TOKEN";
pub const ENV_GITHUB_TOKEN_FALLBACK: &str = "GITHUB_TOKEN";
pub const ENV_BASE_REPO: &str = "AUTOPATCH_BASE_REPO";
pub const ENV_FORK_REPO: &str = "AUTOPATCH_FORK_REPO";
pub const ENV_SNAPSHOT_ROOT: &str = "AUTOPATCH_SNAPSHOT_ROOT";
pub const ENV_API_URL: &str = "AUTOPATCH_GITHUB_API_URL";
pub const ENV_LOG: &str = "AUTOPATCH_LOG";
