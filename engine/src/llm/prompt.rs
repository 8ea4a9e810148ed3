//! Prompt Runner
//!
//! Turns prompts into typed objects for action bodies. Model failures and
//! unparseable replies surface as [`ActionError`]s the executor knows how to
//! retry.

use super::router::ModelRouter;
use super::{extract_json, LlmOptions, Message};
use sdk::types::{ActionError, ActionOutcome};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::debug;

const OBJECT_INSTRUCTIONS: &str =
    "Reply with a single JSON object and nothing else. Do not wrap it in prose.";

const OPTIONAL_OBJECT_INSTRUCTIONS: &str = "Reply with a single JSON object and nothing else. \
     If the information needed to fill every field is not present, reply with null.";

/// The latest prompt sent through the runner
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub prompt: String,
    pub options: LlmOptions,
    /// Model the router picked; `None` if resolution failed
    pub model: Option<String>,
}

/// Runs prompts for actions against the model router
pub struct PromptRunner {
    router: Arc<ModelRouter>,
    last: Mutex<Option<RecordedCall>>,
}

impl PromptRunner {
    pub fn new(router: Arc<ModelRouter>) -> Self {
        Self {
            router,
            last: Mutex::new(None),
        }
    }

    /// Plain text completion
    pub async fn generate_text(&self, prompt: &str, options: &LlmOptions) -> Result<String, ActionError> {
        self.call(prompt, None, options).await
    }

    /// Ask the model for a `T`
    ///
    /// # Errors
    ///
    /// `ActionError::Recoverable` if the reply holds no JSON object or the
    /// object does not decode as `T`.
    pub async fn create_object<T: DeserializeOwned>(
        &self,
        prompt: &str,
        options: &LlmOptions,
    ) -> Result<T, ActionError> {
        let reply = self.call(prompt, Some(OBJECT_INSTRUCTIONS), options).await?;
        let value = extract_json(&reply).ok_or_else(|| malformed("no JSON object in reply"))?;
        serde_json::from_value(value).map_err(|e| malformed(&e.to_string()))
    }

    /// Ask the model for a `T` that may not be derivable from the prompt
    ///
    /// Returns `ActionOutcome::Nothing` when the model answers `null`, an
    /// empty object, or an object missing required fields.
    pub async fn create_object_if_possible<T>(
        &self,
        prompt: &str,
        options: &LlmOptions,
    ) -> Result<ActionOutcome, ActionError>
    where
        T: DeserializeOwned + serde::Serialize,
    {
        let reply = self
            .call(prompt, Some(OPTIONAL_OBJECT_INSTRUCTIONS), options)
            .await?;
        let value = extract_json(&reply).ok_or_else(|| malformed("no JSON value in reply"))?;

        match value {
            Value::Null => Ok(ActionOutcome::Nothing),
            Value::Object(ref map) if map.is_empty() => Ok(ActionOutcome::Nothing),
            value => match serde_json::from_value::<T>(value) {
                Ok(object) => ActionOutcome::produced(&object),
                Err(e) => {
                    debug!("Model could not fill the object: {}", e);
                    Ok(ActionOutcome::Nothing)
                }
            },
        }
    }

    /// Most recent call, if any
    pub fn last_call(&self) -> Option<RecordedCall> {
        self.last.lock().ok().and_then(|last| last.clone())
    }

    async fn call(
        &self,
        prompt: &str,
        instructions: Option<&str>,
        options: &LlmOptions,
    ) -> Result<String, ActionError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(instructions) = instructions {
            messages.push(Message::system(instructions));
        }
        messages.push(Message::user(prompt));

        let result = self.router.generate(&messages, options).await;

        let model = result.as_ref().ok().map(|(_, model)| model.clone());
        if let Ok(mut last) = self.last.lock() {
            *last = Some(RecordedCall {
                prompt: prompt.to_string(),
                options: options.clone(),
                model,
            });
        }

        let (reply, _) = result?;
        Ok(reply)
    }
}

fn malformed(detail: &str) -> ActionError {
    ActionError::recoverable(format!("malformed model output: {}", detail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{GenerateOptions, LLMProvider};
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    /// Replies with a fixed string
    struct Canned(String);

    #[async_trait]
    impl LLMProvider for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        fn models(&self) -> Vec<String> {
            vec!["canned-1".to_string()]
        }

        async fn generate(&self, _messages: &[Message], _options: &GenerateOptions) -> crate::llm::Result<String> {
            Ok(self.0.clone())
        }
    }

    fn runner(reply: &str) -> PromptRunner {
        let router = ModelRouter::new(vec![Arc::new(Canned(reply.to_string()))]);
        PromptRunner::new(Arc::new(router))
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Person {
        name: String,
    }

    #[tokio::test]
    async fn test_create_object() {
        let runner = runner("Sure:\n```json\n{\"name\": \"Lynda\"}\n```");
        let person: Person = runner
            .create_object("Create a person from this input", &LlmOptions::auto())
            .await
            .unwrap();
        assert_eq!(person.name, "Lynda");

        let call = runner.last_call().unwrap();
        assert_eq!(call.prompt, "Create a person from this input");
        assert_eq!(call.model.as_deref(), Some("canned-1"));
    }

    #[tokio::test]
    async fn test_create_object_malformed_is_recoverable() {
        let runner = runner("I'd rather not.");
        let err = runner
            .create_object::<Person>("who?", &LlmOptions::auto())
            .await
            .unwrap_err();
        assert!(err.is_recoverable());

        let runner = runner_with_wrong_shape();
        let err = runner
            .create_object::<Person>("who?", &LlmOptions::auto())
            .await
            .unwrap_err();
        assert!(err.is_recoverable());
    }

    fn runner_with_wrong_shape() -> PromptRunner {
        runner(r#"{"title": "not a person"}"#)
    }

    #[tokio::test]
    async fn test_create_object_if_possible() {
        let outcome = runner("null")
            .create_object_if_possible::<Person>("who?", &LlmOptions::auto())
            .await
            .unwrap();
        assert_eq!(outcome, ActionOutcome::Nothing);

        let outcome = runner("{}")
            .create_object_if_possible::<Person>("who?", &LlmOptions::auto())
            .await
            .unwrap();
        assert_eq!(outcome, ActionOutcome::Nothing);

        let outcome = runner(r#"{"name": "Lynda"}"#)
            .create_object_if_possible::<Person>("who?", &LlmOptions::auto())
            .await
            .unwrap();
        assert_eq!(outcome, ActionOutcome::Produced(json!({"name": "Lynda"})));
    }

    #[tokio::test]
    async fn test_unserved_model_is_fatal_and_recorded() {
        let runner = runner("{}");
        let options = LlmOptions::by_name("gpt-4.1-mini").with_temperature(0.9);
        let err = runner.generate_text("hi", &options).await.unwrap_err();
        assert!(!err.is_recoverable());

        let call = runner.last_call().unwrap();
        assert_eq!(call.options, options);
        assert!(call.model.is_none());
    }

    #[tokio::test]
    async fn test_only_latest_call_is_kept() {
        let runner = runner(r#"{"name": "Lynda"}"#);
        assert!(runner.last_call().is_none());

        for prompt in ["first", "second", "third"] {
            runner.generate_text(prompt, &LlmOptions::auto()).await.unwrap();
        }

        let call = runner.last_call().unwrap();
        assert_eq!(call.prompt, "third");
        assert_eq!(call.model.as_deref(), Some("canned-1"));
    }
}
