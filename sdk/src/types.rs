//! Action declaration and data-plane types

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::errors::EngineError;

/// Cost assigned to actions that do not declare one
pub const DEFAULT_ACTION_COST: f64 = 0.0;

/// Identifier of a data type flowing between actions
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeKey(String);

impl TypeKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key for a domain type implementing [`Typed`]
    pub fn of<T: Typed>() -> Self {
        Self::new(T::TYPE_KEY)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for TypeKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Domain types that can live on the blackboard
///
/// The key names the single world slot the type occupies.
pub trait Typed {
    const TYPE_KEY: &'static str;

    fn type_key() -> TypeKey {
        TypeKey::new(Self::TYPE_KEY)
    }
}

/// Declaration of an action: what it consumes, produces, costs and needs
///
/// Immutable once registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub name: String,
    pub input_types: Vec<TypeKey>,
    pub output_type: TypeKey,
    pub cost: f64,
    pub required_capabilities: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Set when producing the output completes a user-facing goal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub achieves_goal: Option<String>,
}

impl ActionSpec {
    /// Create a spec with no inputs, default cost and no capabilities
    pub fn new(name: impl Into<String>, output_type: impl Into<TypeKey>) -> Self {
        Self {
            name: name.into(),
            input_types: Vec::new(),
            output_type: output_type.into(),
            cost: DEFAULT_ACTION_COST,
            required_capabilities: BTreeSet::new(),
            description: None,
            achieves_goal: None,
        }
    }

    /// Add a required input type; repeated inputs are kept once
    pub fn with_input(mut self, input: impl Into<TypeKey>) -> Self {
        let input = input.into();
        if !self.input_types.contains(&input) {
            self.input_types.push(input);
        }
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.required_capabilities.insert(capability.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn achieves_goal(mut self, description: impl Into<String>) -> Self {
        self.achieves_goal = Some(description.into());
        self
    }

    /// Reject names and costs the planner cannot work with
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.name.trim().is_empty() {
            return Err(EngineError::InvalidAction {
                name: self.name.clone(),
                reason: "name must not be empty".to_string(),
            });
        }
        if !self.cost.is_finite() || self.cost < 0.0 {
            return Err(EngineError::InvalidAction {
                name: self.name.clone(),
                reason: format!("cost must be finite and non-negative, got {}", self.cost),
            });
        }
        Ok(())
    }
}

/// Values handed to an action body, keyed by input type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionInputs {
    values: HashMap<TypeKey, serde_json::Value>,
}

impl ActionInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<TypeKey>, value: serde_json::Value) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<TypeKey>, value: serde_json::Value) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &TypeKey) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    /// Deserialize the input slot for `T`
    ///
    /// A missing or undecodable input is a wiring bug, so it maps to
    /// [`ActionError::Fatal`].
    pub fn get_as<T: Typed + DeserializeOwned>(&self) -> Result<T, ActionError> {
        let value = self
            .values
            .get(&TypeKey::of::<T>())
            .ok_or_else(|| ActionError::fatal(format!("missing input {}", T::TYPE_KEY)))?;
        serde_json::from_value(value.clone())
            .map_err(|e| ActionError::fatal(format!("input {} malformed: {}", T::TYPE_KEY, e)))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A single labelled field of an input form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    pub label: String,
}

/// Request for a value that only the outside world can supply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputRequest {
    pub prompt: String,
    pub expected_type: TypeKey,
    #[serde(default)]
    pub fields: Vec<FormField>,
}

impl InputRequest {
    pub fn new(prompt: impl Into<String>, expected_type: impl Into<TypeKey>) -> Self {
        Self {
            prompt: prompt.into(),
            expected_type: expected_type.into(),
            fields: Vec::new(),
        }
    }

    /// Request a form submission for `T`
    pub fn form<T: Typed>(prompt: impl Into<String>) -> Self {
        Self::new(prompt, TypeKey::of::<T>())
    }

    pub fn with_field(mut self, name: impl Into<String>, label: impl Into<String>) -> Self {
        self.fields.push(FormField {
            name: name.into(),
            label: label.into(),
        });
        self
    }
}

/// What an action body returned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ActionOutcome {
    /// The action materialized its output
    Produced(serde_json::Value),
    /// The action ran but could not produce its output (e.g. nothing to extract)
    Nothing,
    /// The action needs an external value before the session can continue
    AwaitInput(InputRequest),
}

impl ActionOutcome {
    /// Serialize a domain value into a `Produced` outcome
    pub fn produced<T: Serialize>(value: &T) -> Result<Self, ActionError> {
        serde_json::to_value(value)
            .map(Self::Produced)
            .map_err(|e| ActionError::fatal(format!("failed to encode output: {}", e)))
    }
}

/// Failure raised by an action body
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActionError {
    /// Transient or malformed-output failure; the executor may retry
    #[error("recoverable: {0}")]
    Recoverable(String),

    /// Failure that retrying cannot fix
    #[error("fatal: {0}")]
    Fatal(String),
}

impl ActionError {
    pub fn recoverable(reason: impl Into<String>) -> Self {
        Self::Recoverable(reason.into())
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::Fatal(reason.into())
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Recoverable(_))
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::Recoverable(reason) | Self::Fatal(reason) => reason,
        }
    }
}

impl From<anyhow::Error> for ActionError {
    fn from(err: anyhow::Error) -> Self {
        Self::Fatal(format!("{:#}", err))
    }
}

/// A value delivered from outside to resume a suspended session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalValue {
    pub type_key: TypeKey,
    pub value: serde_json::Value,
}

impl ExternalValue {
    pub fn new(type_key: impl Into<TypeKey>, value: serde_json::Value) -> Self {
        Self {
            type_key: type_key.into(),
            value,
        }
    }

    /// Encode a domain value under its own type key
    pub fn typed<T: Typed + Serialize>(value: &T) -> Result<Self, EngineError> {
        Ok(Self {
            type_key: TypeKey::of::<T>(),
            value: serde_json::to_value(value)?,
        })
    }
}
