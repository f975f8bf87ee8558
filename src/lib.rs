//! autopatch: instruction-driven repository patch agent (library crate).
//!
//! Re-exports public modules for integration tests and embedding in other
//! front ends such as chat bots.

pub mod apply;
pub mod config;
pub mod constants;
pub mod env;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod prompt;
pub mod publish;
pub mod repo;
pub mod snapshot;
pub mod trigger;
pub mod validate;
pub mod worker;
