//! Config struct and loading logic.
//!
//! Priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables
//! 3. `.autopatch.toml` in the working directory
//! 4. `~/.config/autopatch/config.toml` (global defaults)
//! 5. Built-in defaults

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::constants;
use crate::env::Env;
use crate::models::{ProviderName, RepoId};

/// Errors during config loading and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseFile {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("missing required setting {field} ({hint})")]
    Missing {
        field: &'static str,
        hint: &'static str,
    },

    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub repository: RepositoryConfig,
    pub pipeline: PipelineConfig,
    pub trigger: TriggerConfig,
}

/// LLM provider configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub name: ProviderName,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub temperature: f64,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: ProviderName::OpenAI,
            model: "gpt-4o".to_string(),
            base_url: None,
            api_key: None,
            timeout_secs: 300,
            temperature: 0.0,
        }
    }
}

/// Hosting-service configuration.
///
/// `base` receives the pull request; `fork` receives the patch branch
/// and its commits. They may name the same repository.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub base: Option<RepoId>,
    pub fork: Option<RepoId>,
    pub token: Option<String>,
    pub api_url: String,
    pub base_branch: String,
    pub snapshot_root: String,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for RepositoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryConfig")
            .field("base", &self.base)
            .field("fork", &self.fork)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("api_url", &self.api_url)
            .field("base_branch", &self.base_branch)
            .field("snapshot_root", &self.snapshot_root)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            base: None,
            fork: None,
            token: None,
            api_url: constants::GITHUB_API_URL.to_string(),
            base_branch: constants::DEFAULT_BASE_BRANCH.to_string(),
            snapshot_root: constants::DEFAULT_SNAPSHOT_ROOT.to_string(),
            timeout_secs: 30,
        }
    }
}

/// What the applier does when a single file write fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop at the first failed file.
    #[default]
    Abort,
    /// Attempt every file and report all failures.
    Continue,
}

/// Pipeline behaviour knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub on_file_error: FailurePolicy,
    /// Seconds between "still working" signals while a run is in flight.
    pub heartbeat_secs: u64,
    pub branch_prefix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            on_file_error: FailurePolicy::Abort,
            heartbeat_secs: 8,
            branch_prefix: constants::BRANCH_PREFIX.to_string(),
        }
    }
}

/// Chat trigger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    pub marker: String,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            marker: constants::DEFAULT_TRIGGER_MARKER.to_string(),
        }
    }
}

impl Config {
    /// Load configuration with proper layering.
    ///
    /// Reads from global config, local config in `work_dir`, then applies
    /// environment variable overrides.
    pub fn load(work_dir: Option<&Path>, env: &Env) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        // Layer 4: global config
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                let global = Self::load_file(&global_path)?;
                config.merge(global);
            }
        }

        // Layer 3: local config
        if let Some(dir) = work_dir {
            let local_path = dir.join(constants::CONFIG_FILENAME);
            if local_path.exists() {
                let local = Self::load_file(&local_path)?;
                config.merge(local);
            }
        }

        // Layer 2: environment variables
        config.apply_env_vars(env);

        Ok(config)
    }

    /// Load a config from a specific file.
    fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseFile {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the global config file path.
    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(constants::CONFIG_DIR).join("config.toml"))
    }

    /// Merge another config into this one (other takes precedence for non-default values).
    fn merge(&mut self, other: Config) {
        // Provider settings
        let default_provider = ProviderConfig::default();
        if other.provider.name != default_provider.name {
            self.switch_provider(other.provider.name);
        }
        if other.provider.model != default_provider.model {
            self.provider.model = other.provider.model;
        }
        if other.provider.base_url.is_some() {
            self.provider.base_url = other.provider.base_url;
        }
        if other.provider.api_key.is_some() {
            self.provider.api_key = other.provider.api_key;
        }
        if other.provider.timeout_secs != default_provider.timeout_secs {
            self.provider.timeout_secs = other.provider.timeout_secs;
        }
        if other.provider.temperature != default_provider.temperature {
            self.provider.temperature = other.provider.temperature;
        }

        // Repository settings
        let default_repo = RepositoryConfig::default();
        if other.repository.base.is_some() {
            self.repository.base = other.repository.base;
        }
        if other.repository.fork.is_some() {
            self.repository.fork = other.repository.fork;
        }
        if other.repository.token.is_some() {
            self.repository.token = other.repository.token;
        }
        if other.repository.api_url != default_repo.api_url {
            self.repository.api_url = other.repository.api_url;
        }
        if other.repository.base_branch != default_repo.base_branch {
            self.repository.base_branch = other.repository.base_branch;
        }
        if other.repository.snapshot_root != default_repo.snapshot_root {
            self.repository.snapshot_root = other.repository.snapshot_root;
        }
        if other.repository.timeout_secs != default_repo.timeout_secs {
            self.repository.timeout_secs = other.repository.timeout_secs;
        }

        // Pipeline settings
        let default_pipeline = PipelineConfig::default();
        if other.pipeline.on_file_error != default_pipeline.on_file_error {
            self.pipeline.on_file_error = other.pipeline.on_file_error;
        }
        if other.pipeline.heartbeat_secs != default_pipeline.heartbeat_secs {
            self.pipeline.heartbeat_secs = other.pipeline.heartbeat_secs;
        }
        if other.pipeline.branch_prefix != default_pipeline.branch_prefix {
            self.pipeline.branch_prefix = other.pipeline.branch_prefix;
        }

        // Trigger settings
        if other.trigger.marker != TriggerConfig::default().marker {
            self.trigger.marker = other.trigger.marker;
        }
    }

    /// Apply environment variable overrides.
    fn apply_env_vars(&mut self, env: &Env) {
        if let Some(val) = env.get(constants::ENV_PROVIDER) {
            match val.parse::<ProviderName>() {
                Ok(name) => self.switch_provider(name),
                Err(_) => tracing::warn!(
                    "ignoring invalid {} value: {val}",
                    constants::ENV_PROVIDER
                ),
            }
        }
        if let Some(val) = env.get(constants::ENV_MODEL) {
            self.provider.model = val;
        }
        if let Some(val) = env.get(constants::ENV_BASE_URL) {
            self.provider.base_url = Some(val);
        }

        self.resolve_api_key(env);

        let token = env.first_of(&[
            constants::ENV_GITHUB_TOKEN,
            constants::ENV_GITHUB_TOKEN_FALLBACK,
        ]);
        if token.is_some() {
            self.repository.token = token;
        }

        for (var, slot) in [
            (constants::ENV_BASE_REPO, &mut self.repository.base),
            (constants::ENV_FORK_REPO, &mut self.repository.fork),
        ] {
            if let Some(val) = env.get(var) {
                match val.parse::<RepoId>() {
                    Ok(repo) => *slot = Some(repo),
                    Err(e) => tracing::warn!("ignoring invalid {var} value: {e}"),
                }
            }
        }

        if let Some(val) = env.get(constants::ENV_SNAPSHOT_ROOT) {
            self.repository.snapshot_root = val;
        }
        if let Some(val) = env.get(constants::ENV_API_URL) {
            self.repository.api_url = val;
        }
    }

    /// Select a provider, dropping a key that belonged to a different one.
    ///
    /// Follow with [`Config::resolve_api_key`] to pick up the new provider's key.
    pub fn switch_provider(&mut self, name: ProviderName) {
        if self.provider.name != name {
            self.provider.name = name;
            self.provider.api_key = None;
        }
    }

    /// Pick up the API key for the current provider from the environment.
    ///
    /// Call again after a CLI flag switches the provider.
    pub fn resolve_api_key(&mut self, env: &Env) {
        let api_key = env.first_of(&[
            constants::ENV_API_KEY,
            self.provider.name.api_key_env_var(),
        ]);
        if api_key.is_some() {
            self.provider.api_key = api_key;
        }
    }

    /// Check that everything a patch run needs is present.
    ///
    /// Called before any remote call so a misconfigured deployment never
    /// touches the hosting service.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.github_token()?;
        self.base_repo()?;
        self.fork_repo()?;
        if self.provider.api_key.is_none() {
            return Err(ConfigError::Missing {
                field: "provider.api_key",
                hint: "set AUTOPATCH_API_KEY or the provider-specific key variable",
            });
        }
        if self.provider.name == ProviderName::OpenAICompatible && self.provider.base_url.is_none()
        {
            return Err(ConfigError::Missing {
                field: "provider.base_url",
                hint: "the openai-compatible provider needs an explicit endpoint",
            });
        }
        if self.pipeline.branch_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "pipeline.branch_prefix",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn github_token(&self) -> Result<&str, ConfigError> {
        self.repository
            .token
            .as_deref()
            .ok_or(ConfigError::Missing {
                field: "repository.token",
                hint: "set AUTOPATCH_GITHUB_TOKEN or GITHUB_TOKEN",
            })
    }

    pub fn base_repo(&self) -> Result<&RepoId, ConfigError> {
        self.repository.base.as_ref().ok_or(ConfigError::Missing {
            field: "repository.base",
            hint: "set AUTOPATCH_BASE_REPO to owner/name",
        })
    }

    pub fn fork_repo(&self) -> Result<&RepoId, ConfigError> {
        self.repository.fork.as_ref().ok_or(ConfigError::Missing {
            field: "repository.fork",
            hint: "set AUTOPATCH_FORK_REPO to owner/name",
        })
    }

    /// Render the effective configuration as TOML with secrets masked.
    pub fn to_redacted_toml(&self) -> String {
        let mut redacted = self.clone();
        if redacted.provider.api_key.is_some() {
            redacted.provider.api_key = Some("[REDACTED]".to_string());
        }
        if redacted.repository.token.is_some() {
            redacted.repository.token = Some("[REDACTED]".to_string());
        }
        toml::to_string_pretty(&redacted).unwrap_or_default()
    }
}
