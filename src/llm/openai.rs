//! Direct chat-completions gateway for OpenAI and OpenAI-compatible APIs.
//!
//! Requests JSON-object output so the model cannot wrap its answer in
//! prose. Non-2xx responses surface as [`LlmError::Status`] with the
//! response body untouched.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;
use crate::models::ProviderName;

use super::{CompletionGateway, LlmError, non_empty};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f64,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Chat-completions client.
pub struct ChatCompletionsGateway {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f64,
}

impl std::fmt::Debug for ChatCompletionsGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsGateway")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .finish()
    }
}

impl ChatCompletionsGateway {
    pub fn new(config: ProviderConfig) -> Result<Self, LlmError> {
        let api_key = config.api_key.ok_or_else(|| {
            LlmError::NotConfigured(format!(
                "no API key found for provider '{}'. Set {} or {}.",
                config.name,
                crate::constants::ENV_API_KEY,
                config.name.api_key_env_var()
            ))
        })?;

        let base_url = match (config.name, config.base_url) {
            (_, Some(url)) => url,
            (ProviderName::OpenAICompatible, None) => {
                return Err(LlmError::NotConfigured(
                    "openai-compatible provider requires base_url to be set".to_string(),
                ));
            }
            (_, None) => OPENAI_BASE_URL.to_string(),
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            model: config.model,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl CompletionGateway for ChatCompletionsGateway {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        tracing::debug!(endpoint = %self.endpoint, model = %self.model, "sending chat completion");

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| LlmError::Provider {
            provider: "openai".to_string(),
            message: format!("unreadable completion envelope: {e}"),
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default();

        non_empty(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_defaults_to_openai() {
        let gw = ChatCompletionsGateway::new(ProviderConfig {
            api_key: Some("k".into()),
            ..ProviderConfig::default()
        })
        .unwrap();
        assert_eq!(gw.endpoint, "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn compatible_requires_base_url() {
        let err = ChatCompletionsGateway::new(ProviderConfig {
            name: ProviderName::OpenAICompatible,
            api_key: Some("k".into()),
            ..ProviderConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, LlmError::NotConfigured(_)));
    }

    #[test]
    fn trailing_slash_in_base_url_is_trimmed() {
        let gw = ChatCompletionsGateway::new(ProviderConfig {
            name: ProviderName::OpenAICompatible,
            api_key: Some("k".into()),
            base_url: Some("http://localhost:11434/v1/".into()),
            ..ProviderConfig::default()
        })
        .unwrap();
        assert_eq!(gw.endpoint, "http://localhost:11434/v1/chat/completions");
    }

    #[test]
    fn debug_redacts_key() {
        let gw = ChatCompletionsGateway::new(ProviderConfig {
            api_key: Some("sk-very-secret".into()),
            ..ProviderConfig::default()
        })
        .unwrap();
        let out = format!("{gw:?}");
        assert!(!out.contains("sk-very-secret"));
        assert!(out.contains("[REDACTED]"));
    }

    #[test]
    fn request_serializes_json_object_format() {
        let req = ChatRequest {
            model: "gpt-4o",
            messages: [
                ChatMessage {
                    role: "system",
                    content: "s",
                },
                ChatMessage {
                    role: "user",
                    content: "u",
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["response_format"]["type"], "json_object");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "u");
    }
}
