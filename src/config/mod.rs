//! Configuration loading and layering.
//!
//! Handles `.autopatch.toml` loading, environment variable resolution,
//! CLI flag merging, and the required-settings check that gates every run.

pub mod loader;

pub use loader::{
    Config, ConfigError, FailurePolicy, PipelineConfig, ProviderConfig, RepositoryConfig,
    TriggerConfig,
};
