//! Chat trigger parsing.
//!
//! A chat message becomes a patch request when it contains the configured
//! marker. The marker and any mention tokens are removed; what remains is
//! the instruction.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// `<@123>`, `<@!123>` (nickname) and `<@&123>` (role) mentions.
static MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@[!&]?\d+>").expect("mention pattern is valid"));

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TriggerError {
    #[error("the message contains the trigger but no instruction")]
    EmptyInstruction,
}

/// Extract the instruction from `message`.
///
/// Returns `None` when `marker` does not occur (case-sensitive), so the
/// caller can ignore the message entirely.
pub fn parse_command(message: &str, marker: &str) -> Option<Result<String, TriggerError>> {
    if marker.is_empty() || !message.contains(marker) {
        return None;
    }

    let stripped = message.replace(marker, " ");
    let stripped = MENTION.replace_all(&stripped, " ");
    let instruction = stripped.split_whitespace().collect::<Vec<_>>().join(" ");

    if instruction.is_empty() {
        Some(Err(TriggerError::EmptyInstruction))
    } else {
        Some(Ok(instruction))
    }
}
