//! LLM gateway trait and provider dispatch.
//!
//! The pipeline only needs "send these two messages, get raw text back".
//! OpenAI-family providers are called directly over the chat-completions
//! wire format (so HTTP status and body are reported exactly); every other
//! provider goes through rig-core.

pub mod openai;
pub mod rig;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::ProviderConfig;

/// Errors from the completion service.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("completion request failed with HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("completion service returned an empty response")]
    EmptyResponse,

    #[error("completion request failed: {0}")]
    Transport(String),

    #[error("{provider} error: {message}")]
    Provider { provider: String, message: String },

    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

/// Single-shot structured completion.
///
/// Implementations make exactly one attempt; retrying is the caller's
/// decision.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    /// Send the system and user messages, return the raw response text.
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError>;
}

/// Build the gateway matching `config.name`.
pub fn build_gateway(config: &ProviderConfig) -> Result<Arc<dyn CompletionGateway>, LlmError> {
    if config.name.speaks_chat_completions() {
        Ok(Arc::new(openai::ChatCompletionsGateway::new(config.clone())?))
    } else {
        Ok(Arc::new(rig::RigGateway::new(config.clone())?))
    }
}

/// Reject blank completions so callers never see an empty string.
pub(crate) fn non_empty(text: String) -> Result<String, LlmError> {
    if text.trim().is_empty() {
        Err(LlmError::EmptyResponse)
    } else {
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProviderName;

    fn config(name: ProviderName) -> ProviderConfig {
        ProviderConfig {
            name,
            api_key: Some("sk-test".into()),
            ..ProviderConfig::default()
        }
    }

    #[test]
    fn builds_gateway_for_every_provider() {
        for name in [
            ProviderName::OpenAI,
            ProviderName::Anthropic,
            ProviderName::Gemini,
            ProviderName::Groq,
        ] {
            assert!(build_gateway(&config(name)).is_ok(), "{name}");
        }
    }

    #[test]
    fn missing_api_key_is_not_configured() {
        let mut cfg = config(ProviderName::Anthropic);
        cfg.api_key = None;
        assert!(matches!(
            build_gateway(&cfg).err().unwrap(),
            LlmError::NotConfigured(_)
        ));
    }

    #[test]
    fn blank_text_is_empty_response() {
        assert!(matches!(non_empty("  \n".into()), Err(LlmError::EmptyResponse)));
        assert_eq!(non_empty("{}".into()).unwrap(), "{}");
    }
}
