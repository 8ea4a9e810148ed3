//! Lodestar SDK
//!
//! Shared library providing the action contract, data-plane types and the
//! error taxonomy. This crate is used by the engine and by action authors.

/// Action trait and closure adapter
pub mod action;

/// Error types and handling
pub mod errors;

/// Action declaration and data-plane types
pub mod types;

// Re-export commonly used types
pub use action::{fn_action, Action, FnAction};
pub use errors::{EngineError, LodestarErrorExt};
pub use types::{
    ActionError, ActionInputs, ActionOutcome, ActionSpec, ExternalValue, FormField, InputRequest,
    TypeKey, Typed, DEFAULT_ACTION_COST,
};
