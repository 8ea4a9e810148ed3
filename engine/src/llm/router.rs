//! Model Router
//!
//! Resolves an action's [`ModelSelectionCriteria`] to a provider and a
//! concrete model, then makes the call under a timeout. Providers are
//! consulted in registration order, so the first provider serving a model
//! wins.

use super::{GenerateOptions, LLMError, LLMProvider, LlmOptions, Message, ModelSelectionCriteria};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default per-call timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Routes model calls to registered providers
pub struct ModelRouter {
    providers: Vec<Arc<dyn LLMProvider>>,
    default_model: Option<String>,
    timeout: Duration,
}

impl ModelRouter {
    pub fn new(providers: Vec<Arc<dyn LLMProvider>>) -> Self {
        Self {
            providers,
            default_model: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Model used for `Auto` selection when a provider serves it
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn default_model(&self) -> Option<&str> {
        self.default_model.as_deref()
    }

    fn provider_for(&self, model: &str) -> Option<&Arc<dyn LLMProvider>> {
        self.providers
            .iter()
            .find(|provider| provider.models().iter().any(|m| m == model))
    }

    /// Pick the provider and model for the given options
    pub fn resolve(
        &self,
        options: &LlmOptions,
    ) -> super::Result<(Arc<dyn LLMProvider>, GenerateOptions)> {
        let (provider, model) = match &options.criteria {
            ModelSelectionCriteria::ByName(model) => {
                let provider = self
                    .provider_for(model)
                    .ok_or_else(|| LLMError::NoMatchingModel(model.clone()))?;
                (provider, model.clone())
            }
            ModelSelectionCriteria::FirstOf(models) => models
                .iter()
                .find_map(|model| self.provider_for(model).map(|p| (p, model.clone())))
                .ok_or_else(|| LLMError::NoMatchingModel(models.join(", ")))?,
            ModelSelectionCriteria::Auto => {
                let preferred = self
                    .default_model
                    .as_ref()
                    .and_then(|model| self.provider_for(model).map(|p| (p, model.clone())));
                match preferred {
                    Some(found) => found,
                    None => self
                        .providers
                        .iter()
                        .find_map(|p| p.models().into_iter().next().map(|m| (p, m)))
                        .ok_or_else(|| LLMError::NoMatchingModel("auto".to_string()))?,
                }
            }
        };

        Ok((
            Arc::clone(provider),
            GenerateOptions {
                model,
                temperature: options.temperature,
            },
        ))
    }

    /// Generate a reply; returns the text and the model that produced it
    pub async fn generate(
        &self,
        messages: &[Message],
        options: &LlmOptions,
    ) -> super::Result<(String, String)> {
        let (provider, resolved) = self.resolve(options)?;
        debug!(
            "Calling {} model {} (timeout: {}s)",
            provider.name(),
            resolved.model,
            self.timeout.as_secs()
        );

        match tokio::time::timeout(self.timeout, provider.generate(messages, &resolved)).await {
            Ok(Ok(reply)) => Ok((reply, resolved.model)),
            Ok(Err(e)) => {
                warn!("Provider {} failed: {}", provider.name(), e);
                Err(e)
            }
            Err(_) => {
                warn!(
                    "Provider {} timed out after {}s",
                    provider.name(),
                    self.timeout.as_secs()
                );
                Err(LLMError::Timeout)
            }
        }
    }

    /// Check the health of all registered providers
    pub async fn check_health(&self) -> Vec<(String, bool)> {
        let mut results = Vec::new();
        for provider in &self.providers {
            let is_healthy = provider.check_health().await;
            results.push((provider.name().to_string(), is_healthy));
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct MockProvider {
        name: String,
        models: Vec<String>,
        delay: Duration,
    }

    impl MockProvider {
        fn new(name: &str, models: &[&str]) -> Arc<dyn LLMProvider> {
            Arc::new(Self {
                name: name.to_string(),
                models: models.iter().map(|m| m.to_string()).collect(),
                delay: Duration::ZERO,
            })
        }
    }

    #[async_trait]
    impl LLMProvider for MockProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn models(&self) -> Vec<String> {
            self.models.clone()
        }

        async fn generate(
            &self,
            _messages: &[Message],
            options: &GenerateOptions,
        ) -> super::super::Result<String> {
            tokio::time::sleep(self.delay).await;
            Ok(format!("{}:{}", self.name, options.model))
        }
    }

    fn router() -> ModelRouter {
        ModelRouter::new(vec![
            MockProvider::new("local", &["llama3"]),
            MockProvider::new("openai", &["gpt-4.1-mini", "gpt-4.1"]),
        ])
    }

    #[test]
    fn test_resolve_by_name() {
        let (provider, resolved) = router()
            .resolve(&LlmOptions::by_name("gpt-4.1").with_temperature(0.9))
            .unwrap();
        assert_eq!(provider.name(), "openai");
        assert_eq!(resolved.model, "gpt-4.1");
        assert_eq!(resolved.temperature, Some(0.9));
    }

    #[test]
    fn test_resolve_unknown_model() {
        let err = router()
            .resolve(&LlmOptions::by_name("claude"))
            .err()
            .unwrap();
        assert!(matches!(err, LLMError::NoMatchingModel(m) if m == "claude"));
    }

    #[test]
    fn test_resolve_first_of_skips_unserved() {
        let (provider, resolved) = router()
            .resolve(&LlmOptions::first_of(["missing", "llama3", "gpt-4.1"]))
            .unwrap();
        assert_eq!(provider.name(), "local");
        assert_eq!(resolved.model, "llama3");
    }

    #[test]
    fn test_resolve_auto_prefers_default() {
        let router = router().with_default_model("gpt-4.1-mini");
        let (_, resolved) = router.resolve(&LlmOptions::auto()).unwrap();
        assert_eq!(resolved.model, "gpt-4.1-mini");

        // Unserved default falls back to the first provider's first model
        let router = router.with_default_model("unknown");
        let (_, resolved) = router.resolve(&LlmOptions::auto()).unwrap();
        assert_eq!(resolved.model, "llama3");

        let empty = ModelRouter::new(vec![]);
        assert!(empty.resolve(&LlmOptions::auto()).is_err());
    }

    #[tokio::test]
    async fn test_generate_and_timeout() {
        let (reply, model) = router()
            .generate(&[Message::user("hi")], &LlmOptions::by_name("llama3"))
            .await
            .unwrap();
        assert_eq!(reply, "local:llama3");
        assert_eq!(model, "llama3");

        let slow: Arc<dyn LLMProvider> = Arc::new(MockProvider {
            name: "slow".to_string(),
            models: vec!["m".to_string()],
            delay: Duration::from_millis(200),
        });
        let router = ModelRouter::new(vec![slow]).with_timeout(Duration::from_millis(10));
        let err = router
            .generate(&[Message::user("hi")], &LlmOptions::auto())
            .await
            .unwrap_err();
        assert!(matches!(err, LLMError::Timeout));
    }

    #[tokio::test]
    async fn test_check_health() {
        let health = router().check_health().await;
        assert_eq!(
            health,
            vec![("local".to_string(), true), ("openai".to_string(), true)]
        );
    }
}
