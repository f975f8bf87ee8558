//! rig-core gateway for providers without a chat-completions endpoint.
//!
//! Supports Anthropic, Cohere, Gemini, Perplexity, DeepSeek, xAI and Groq.
//! The response is returned as raw text; JSON validation happens later.

use std::time::Duration;

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers;

use crate::config::ProviderConfig;
use crate::models::ProviderName;

use super::{CompletionGateway, LlmError, non_empty};

/// Maximum tokens per completion.
///
/// Large because the model returns whole files, and some providers
/// default to a limit that truncates them.
const MAX_TOKENS: u64 = 65536;

/// Build a preamble-only agent and prompt it once.
macro_rules! prompt_once {
    ($client:expr, $model:expr, $temperature:expr, $system:expr, $user:expr, $label:expr) => {{
        let agent = $client
            .agent($model)
            .preamble($system)
            .temperature($temperature)
            .max_tokens(MAX_TOKENS)
            .build();
        agent.prompt($user).await.map_err(|e| LlmError::Provider {
            provider: $label.to_string(),
            message: e.to_string(),
        })
    }};
}

/// Create a rig-core client using the `Client::new(api_key)` convention.
macro_rules! new_client {
    ($provider_mod:path, $api_key:expr, $label:expr) => {{
        <$provider_mod>::new($api_key).map_err(|e| LlmError::Provider {
            provider: $label.to_string(),
            message: format!("failed to create client: {e}"),
        })
    }};
}

/// rig-core backed gateway.
pub struct RigGateway {
    config: ProviderConfig,
    api_key: String,
}

impl std::fmt::Debug for RigGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RigGateway")
            .field("config", &self.config)
            .finish()
    }
}

impl RigGateway {
    pub fn new(config: ProviderConfig) -> Result<Self, LlmError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            LlmError::NotConfigured(format!(
                "no API key found for provider '{}'. Set {} or {}.",
                config.name,
                crate::constants::ENV_API_KEY,
                config.name.api_key_env_var()
            ))
        })?;
        Ok(Self { config, api_key })
    }

    async fn call_rig(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let model = self.config.model.as_str();
        let temperature = self.config.temperature;
        let api_key = self.api_key.as_str();

        match self.config.name {
            ProviderName::Anthropic => {
                let client: providers::anthropic::Client = providers::anthropic::Client::builder()
                    .api_key(api_key)
                    .build()
                    .map_err(|e| LlmError::Provider {
                        provider: "Anthropic".to_string(),
                        message: format!("failed to create client: {e}"),
                    })?;
                prompt_once!(client, model, temperature, system, user, "Anthropic")
            }
            ProviderName::Cohere => {
                let client = new_client!(providers::cohere::Client, api_key, "Cohere")?;
                prompt_once!(client, model, temperature, system, user, "Cohere")
            }
            ProviderName::Gemini => {
                let client = new_client!(providers::gemini::Client, api_key, "Gemini")?;
                prompt_once!(client, model, temperature, system, user, "Gemini")
            }
            ProviderName::Perplexity => {
                let client = new_client!(providers::perplexity::Client, api_key, "Perplexity")?;
                prompt_once!(client, model, temperature, system, user, "Perplexity")
            }
            ProviderName::DeepSeek => {
                let client = new_client!(providers::deepseek::Client, api_key, "DeepSeek")?;
                prompt_once!(client, model, temperature, system, user, "DeepSeek")
            }
            ProviderName::XAI => {
                let client = new_client!(providers::xai::Client, api_key, "xAI")?;
                prompt_once!(client, model, temperature, system, user, "xAI")
            }
            ProviderName::Groq => {
                let client = new_client!(providers::groq::Client, api_key, "Groq")?;
                prompt_once!(client, model, temperature, system, user, "Groq")
            }
            ProviderName::OpenAI | ProviderName::OpenAICompatible => Err(LlmError::NotConfigured(
                format!("{} is served by the chat-completions gateway", self.config.name),
            )),
        }
    }
}

#[async_trait]
impl CompletionGateway for RigGateway {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        tracing::debug!(provider = %self.config.name, model = %self.config.model, "sending rig completion");
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let text = tokio::time::timeout(timeout, self.call_rig(system, user))
            .await
            .map_err(|_| {
                LlmError::Transport(format!(
                    "{} did not answer within {}s",
                    self.config.name, self.config.timeout_secs
                ))
            })??;
        non_empty(text)
    }
}
