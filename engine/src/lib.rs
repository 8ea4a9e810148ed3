//! Lodestar Engine Library
//!
//! Goal-directed action planning. Actions declare the typed inputs they
//! consume, the single type they produce, a cost and the tool groups they
//! need. Given a goal type, the planner chains actions backward from the
//! goal to what the session's world already holds, and the executor runs
//! the chain, re-planning when an action comes back empty and parking the
//! session when an action needs input from outside.

/// Agents built from actions, plus configuration wiring
pub mod agents;

/// Tool group availability
pub mod capability;

/// Configuration management module
pub mod config;

/// Database persistence module
pub mod db;

/// Session execution
pub mod executor;

/// LLM provider abstraction layer
pub mod llm;

/// Session lifecycle events
pub mod message_bus;

/// Backward-chaining planner
pub mod planner;

/// Bounded pool of concurrent sessions
pub mod pool;

/// Action registry
pub mod registry;

/// Parked sessions awaiting external input
pub mod suspension;

/// Telemetry and Observability
pub mod telemetry;

/// Per-session typed blackboard
pub mod world;
