//! OpenAI-compatible chat completions provider
//!
//! Works against any endpoint speaking the `/chat/completions` protocol.
//! The API key is read from the environment variable named in config.

use super::{GenerateOptions, LLMError, LLMProvider, Message};
use crate::config::OpenAIConfig;
use async_trait::async_trait;
use serde_json::json;

pub struct OpenAIProvider {
    config: OpenAIConfig,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAIProvider {
    /// Build a provider, reading the key from `config.api_key_env`
    pub fn new(config: OpenAIConfig) -> Self {
        let api_key = std::env::var(&config.api_key_env).ok();
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: OpenAIConfig, api_key: Option<String>) -> Self {
        Self {
            config,
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn models(&self) -> Vec<String> {
        self.config.models.clone()
    }

    async fn check_health(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate(&self, messages: &[Message], options: &GenerateOptions) -> super::Result<String> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            LLMError::AuthenticationFailed(format!("{} is not set", self.config.api_key_env))
        })?;

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let api_messages: Vec<serde_json::Value> = messages
            .iter()
            .map(|msg| {
                json!({
                    "role": msg.role.to_string(),
                    "content": msg.content
                })
            })
            .collect();

        let mut payload = json!({
            "model": options.model,
            "messages": api_messages,
        });
        if let Some(temperature) = options.temperature {
            payload["temperature"] = json!(temperature);
        }

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| LLMError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            return Err(match status.as_u16() {
                401 | 403 => LLMError::AuthenticationFailed(text),
                429 => LLMError::RateLimitExceeded,
                code if code >= 500 => LLMError::ProviderUnavailable(format!("{}: {}", status, text)),
                _ => LLMError::InvalidRequest(text),
            });
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        data.get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .map(str::to_string)
            .ok_or_else(|| LLMError::ParseError("No message content in response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str) -> OpenAIConfig {
        OpenAIConfig {
            base_url: base_url.to_string(),
            api_key_env: "LODESTAR_TEST_OPENAI_KEY".to_string(),
            models: vec!["gpt-4.1-mini".to_string()],
        }
    }

    fn options() -> GenerateOptions {
        GenerateOptions {
            model: "gpt-4.1-mini".to_string(),
            temperature: Some(0.9),
        }
    }

    #[tokio::test]
    async fn test_generate_sends_model_and_temperature() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"model": "gpt-4.1-mini", "temperature": 0.9})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "{\"name\": \"Lynda\"}"}}]
            })))
            .mount(&server)
            .await;

        let provider = OpenAIProvider::with_api_key(config(&server.uri()), Some("sk-test".to_string()));
        let reply = provider
            .generate(&[Message::user("Who?")], &options())
            .await
            .unwrap();
        assert_eq!(reply, r#"{"name": "Lynda"}"#);
        assert!(provider.check_health().await);
    }

    #[tokio::test]
    async fn test_error_statuses_mapped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let provider = OpenAIProvider::with_api_key(config(&server.uri()), Some("sk-test".to_string()));
        let err = provider
            .generate(&[Message::user("hi")], &options())
            .await
            .unwrap_err();
        assert!(matches!(err, LLMError::RateLimitExceeded));
    }

    #[tokio::test]
    async fn test_missing_key() {
        let provider = OpenAIProvider::with_api_key(config("http://127.0.0.1:9"), None);
        assert!(!provider.check_health().await);
        let err = provider
            .generate(&[Message::user("hi")], &options())
            .await
            .unwrap_err();
        assert!(matches!(err, LLMError::AuthenticationFailed(_)));
    }
}
