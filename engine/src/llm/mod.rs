//! LLM Provider Abstraction Layer
//!
//! Actions that need a model go through a [`prompt::PromptRunner`], which asks
//! the [`router::ModelRouter`] for a provider serving the requested model. The
//! [`LLMProvider`] trait is the contract every backend implements.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod openai;
pub mod prompt;
pub mod router;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("No provider serves {0}")]
    NoMatchingModel(String),
}

impl LLMError {
    /// Whether trying the same call again may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LLMError::ProviderUnavailable(_)
                | LLMError::RateLimitExceeded
                | LLMError::NetworkError(_)
                | LLMError::Timeout
                | LLMError::ParseError(_)
        )
    }
}

impl From<LLMError> for sdk::types::ActionError {
    fn from(err: LLMError) -> Self {
        if err.is_transient() {
            sdk::types::ActionError::recoverable(err.to_string())
        } else {
            sdk::types::ActionError::fatal(err.to_string())
        }
    }
}

/// Message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// Which model a call should use
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "models", rename_all = "snake_case")]
pub enum ModelSelectionCriteria {
    /// Exactly this model
    ByName(String),
    /// The first of these models any provider serves
    FirstOf(Vec<String>),
    /// The configured default model, else whatever the first provider offers
    #[default]
    Auto,
}

/// Per-call model options chosen by an action
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LlmOptions {
    pub criteria: ModelSelectionCriteria,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl LlmOptions {
    pub fn auto() -> Self {
        Self::default()
    }

    pub fn by_name(model: impl Into<String>) -> Self {
        Self {
            criteria: ModelSelectionCriteria::ByName(model.into()),
            temperature: None,
        }
    }

    pub fn first_of<I, S>(models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            criteria: ModelSelectionCriteria::FirstOf(models.into_iter().map(Into::into).collect()),
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Options resolved for a single provider call
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateOptions {
    pub model: String,
    pub temperature: Option<f64>,
}

/// LLM Provider trait that all providers must implement
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Provider name (e.g. "openai")
    fn name(&self) -> &str;

    /// Models this provider can serve, preferred first
    fn models(&self) -> Vec<String>;

    /// Generate a text reply for the conversation
    async fn generate(&self, messages: &[Message], options: &GenerateOptions) -> Result<String>;

    /// Check if the provider is currently healthy and available
    async fn check_health(&self) -> bool {
        true
    }
}

/// Extract the first JSON value from a model reply
///
/// Handles, in order:
/// 1. the whole reply being JSON (including a bare `null`)
/// 2. the body of the first markdown code fence
/// 3. the first balanced `{...}` object embedded in prose
pub fn extract_json(content: &str) -> Option<serde_json::Value> {
    let trimmed = content.trim();

    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    if let Some(inner) = extract_fenced_json(trimmed) {
        if let Ok(value) = serde_json::from_str(inner.trim()) {
            return Some(value);
        }
    }

    let mut rest = trimmed;
    while let Some(pos) = rest.find('{') {
        let candidate = &rest[pos..];
        if let Some(json_str) = extract_balanced_json(candidate) {
            if let Ok(value) = serde_json::from_str(json_str) {
                return Some(value);
            }
        }
        rest = &candidate[1..];
    }

    None
}

/// Extract the body of the first markdown code fence in the text.
///
/// Works even when there is trailing prose after the closing ```.
fn extract_fenced_json(content: &str) -> Option<&str> {
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // Skip the language tag line (e.g. "json\n")
    let body_start_rel = after_opening.find('\n')? + 1;
    let body_start = fence_start + 3 + body_start_rel;

    let closing = content[body_start..].find("```")?;
    let body_end = body_start + closing;

    if body_start >= body_end {
        return None;
    }

    Some(&content[body_start..body_end])
}

/// Extract a balanced JSON object starting at position 0 of `s`.
///
/// Counts `{` / `}` depth, respecting string literals.
fn extract_balanced_json(s: &str) -> Option<&str> {
    if !s.starts_with('{') {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
