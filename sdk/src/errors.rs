//! Error types and handling
//!
//! This module provides the error types used throughout the Lodestar engine.
//! All errors implement the `LodestarErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! # Error Categories
//!
//! - **Registration**: duplicate or malformed action declarations
//! - **Planning**: unreachable, non-viable or cyclic goals
//! - **Execution**: action failures after retries
//! - **Suspension**: resume bookkeeping (unknown, expired, already resumed)
//! - **Infrastructure**: configuration, database, serialization, IO

use thiserror::Error;

/// Trait for Lodestar error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information. All engine errors implement this trait.
pub trait LodestarErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried or worked around by the caller
    /// (e.g. by supplying more data or enabling a capability). Non-recoverable
    /// errors indicate a broken action set or a consumed session.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, LodestarErrorExt};
///
/// let error = EngineError::DuplicateAction("extract_person".to_string());
/// println!("Hint: {}", error.user_hint());
/// assert!(!error.is_recoverable());
///
/// let error = EngineError::UnreachableGoal("Writeup".to_string());
/// assert!(error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Registration errors
    #[error("Duplicate action: {0}")]
    DuplicateAction(String),

    #[error("Invalid action {name}: {reason}")]
    InvalidAction { name: String, reason: String },

    // Planning errors
    #[error("No viable action produces {goal}: missing capabilities [{missing}]")]
    NoViableAction { goal: String, missing: String },

    #[error("Unreachable goal: {0}")]
    UnreachableGoal(String),

    #[error("Cyclic dependency on {goal} via {path}")]
    CyclicDependency { goal: String, path: String },

    // Execution errors
    #[error("Action {action} failed at step {step} after {attempts} attempt(s): {reason}")]
    ActionExecution {
        action: String,
        step: usize,
        attempts: u32,
        reason: String,
    },

    #[error("Session exceeded {0} executed steps")]
    StepLimitExceeded(usize),

    #[error("Session task aborted: {0}")]
    SessionAborted(String),

    // Suspension errors
    #[error("Suspension already resumed: {0}")]
    AlreadyResumed(String),

    #[error("Unknown suspension: {0}")]
    UnknownSuspension(String),

    #[error("Suspension expired: {0}")]
    SuspensionExpired(String),

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LodestarErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            // Registration errors
            Self::DuplicateAction(_) => "Each action must be registered under a unique name",
            Self::InvalidAction { .. } => "Action costs must be finite and non-negative",

            // Planning errors
            Self::NoViableAction { .. } => {
                "Required tool groups are unavailable. Enable them in the capabilities config"
            }
            Self::UnreachableGoal(_) => "No registered action can produce the requested data",
            Self::CyclicDependency { .. } => "Registered actions depend on each other in a loop",

            // Execution errors
            Self::ActionExecution { .. } => "An action failed. Inspect the partial world state",
            Self::StepLimitExceeded(_) => "The session kept re-planning. Check action outputs",
            Self::SessionAborted(_) => "A session stopped unexpectedly. Check the logs",

            // Suspension errors
            Self::AlreadyResumed(_) => "This session was already resumed",
            Self::UnknownSuspension(_) => "No suspended session matches this token",
            Self::SuspensionExpired(_) => "The session waited too long for input. Start again",
            Self::TypeMismatch { .. } => "The submitted value has the wrong type",

            // Infrastructure errors
            Self::Config(_) => "Check your config.toml file for errors",
            Self::Database(_) => "Database operation failed. Check the data directory",
            Self::Serialization(_) => "Data could not be encoded or decoded",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Non-recoverable errors
            Self::DuplicateAction(_)
            | Self::InvalidAction { .. }
            | Self::CyclicDependency { .. }
            | Self::AlreadyResumed(_)
            | Self::SuspensionExpired(_) => false,

            // All other errors are potentially recoverable
            _ => true,
        }
    }
}
