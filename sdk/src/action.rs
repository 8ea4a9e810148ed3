//! Action trait
//!
//! Every registered action pairs an [`ActionSpec`](crate::types::ActionSpec)
//! with an implementation of [`Action`]. Collaborators (model runners,
//! services) are passed into the implementing struct or captured by the
//! closure given to [`fn_action`].

use crate::types::{ActionError, ActionInputs, ActionOutcome};
use async_trait::async_trait;
use std::future::Future;

/// Executable body of an action
#[async_trait]
pub trait Action: Send + Sync {
    /// Run the action against the inputs gathered from the world
    async fn execute(&self, inputs: &ActionInputs) -> Result<ActionOutcome, ActionError>;
}

/// Action backed by an async closure
pub struct FnAction<F> {
    f: F,
}

/// Wrap an async closure as an [`Action`]
///
/// ```
/// use sdk::action::{fn_action, Action};
/// use sdk::types::{ActionInputs, ActionOutcome};
///
/// let action = fn_action(|_inputs: ActionInputs| async move {
///     Ok(ActionOutcome::Produced(serde_json::json!({"summary": "a fine day"})))
/// });
/// # let _ = &action;
/// ```
pub fn fn_action<F, Fut>(f: F) -> FnAction<F>
where
    F: Fn(ActionInputs) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ActionOutcome, ActionError>> + Send,
{
    FnAction { f }
}

#[async_trait]
impl<F, Fut> Action for FnAction<F>
where
    F: Fn(ActionInputs) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ActionOutcome, ActionError>> + Send,
{
    async fn execute(&self, inputs: &ActionInputs) -> Result<ActionOutcome, ActionError> {
        (self.f)(inputs.clone()).await
    }
}
