//! Action Registry
//!
//! Holds every declared action together with its executable body. Actions
//! are registered at process start; afterwards the registry is shared
//! read-only (behind an `Arc`) by planners and executors of all sessions.

use sdk::action::Action;
use sdk::errors::EngineError;
use sdk::types::{ActionSpec, TypeKey};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A registered action: its declaration, body and registration position
#[derive(Clone)]
pub struct RegisteredAction {
    spec: Arc<ActionSpec>,
    body: Arc<dyn Action>,
    order: usize,
}

impl RegisteredAction {
    pub fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    /// Shared handle to the declaration, as stored in plans
    pub fn shared_spec(&self) -> Arc<ActionSpec> {
        Arc::clone(&self.spec)
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn body(&self) -> Arc<dyn Action> {
        Arc::clone(&self.body)
    }

    /// Zero-based registration position, used as the planner tie-break
    pub fn order(&self) -> usize {
        self.order
    }
}

impl std::fmt::Debug for RegisteredAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredAction")
            .field("spec", &self.spec)
            .field("order", &self.order)
            .finish()
    }
}

/// Registry of declared actions
#[derive(Debug, Default)]
pub struct ActionRegistry {
    actions: Vec<RegisteredAction>,
    by_name: HashMap<String, usize>,
    by_output: HashMap<TypeKey, Vec<usize>>,
}

impl ActionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action
    ///
    /// # Errors
    ///
    /// - `DuplicateAction` if an action with the same name exists
    /// - `InvalidAction` if the spec has an empty name or a bad cost
    pub fn register(
        &mut self,
        spec: ActionSpec,
        body: impl Action + 'static,
    ) -> Result<(), EngineError> {
        self.register_arc(spec, Arc::new(body))
    }

    /// Register an action whose body is already shared
    pub fn register_arc(
        &mut self,
        spec: ActionSpec,
        body: Arc<dyn Action>,
    ) -> Result<(), EngineError> {
        spec.validate()?;

        if self.by_name.contains_key(&spec.name) {
            return Err(EngineError::DuplicateAction(spec.name));
        }

        let order = self.actions.len();
        debug!(
            "Registering action {} ({} -> {}, cost {})",
            spec.name,
            spec.input_types
                .iter()
                .map(TypeKey::as_str)
                .collect::<Vec<_>>()
                .join(", "),
            spec.output_type,
            spec.cost
        );

        self.by_name.insert(spec.name.clone(), order);
        self.by_output
            .entry(spec.output_type.clone())
            .or_default()
            .push(order);
        self.actions.push(RegisteredAction {
            spec: Arc::new(spec),
            body,
            order,
        });

        Ok(())
    }

    /// All actions producing `output_type`, in registration order
    pub fn lookup(&self, output_type: &TypeKey) -> Vec<&RegisteredAction> {
        self.by_output
            .get(output_type)
            .map(|indices| indices.iter().map(|&i| &self.actions[i]).collect())
            .unwrap_or_default()
    }

    /// Find an action by name
    pub fn get(&self, name: &str) -> Option<&RegisteredAction> {
        self.by_name.get(name).map(|&i| &self.actions[i])
    }

    /// Actions that declare they achieve a user-facing goal
    pub fn goals(&self) -> Vec<&RegisteredAction> {
        self.actions
            .iter()
            .filter(|action| action.spec.achieves_goal.is_some())
            .collect()
    }

    /// Iterate actions in registration order
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredAction> {
        self.actions.iter()
    }

    /// Names of all actions in registration order
    pub fn action_names(&self) -> Vec<&str> {
        self.actions.iter().map(|a| a.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
