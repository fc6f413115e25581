//! Error types for the warehouse router
//!
//! This module defines the typed failures surfaced by the routing core,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

use crate::classifier::Strategy;

/// Main error type for warehouse router operations
///
/// Covers the failures callers are expected to react to (unavailable
/// sessions, failed strategy execution, overlapping optimization runs)
/// together with the infrastructure errors of configuration and storage.
#[derive(Error, Debug)]
pub enum RouterError {
    /// The session was deleted, rotated out, or never existed
    #[error("Session unavailable: {session_id} ({reason})")]
    SessionUnavailable {
        /// The session that was addressed
        session_id: String,
        /// Why the session cannot accept messages
        reason: String,
    },

    /// The executor for the chosen strategy failed after any allowed retry
    #[error("Strategy execution failed: strategy={strategy}, {cause}")]
    StrategyExecutionFailed {
        /// The strategy that was attempted
        strategy: Strategy,
        /// Description of the final executor failure
        cause: String,
    },

    /// A second optimization was requested while one is still running
    #[error("Optimization already in progress")]
    OptimizationInProgress,

    /// Feedback references a message the router has no record of
    #[error("Feedback target unknown: {0}")]
    FeedbackTargetUnknown(String),

    /// Feedback references a message that is not an assistant reply
    #[error("Feedback target is not an assistant message: {0}")]
    InvalidFeedbackTarget(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Chat, feedback or pattern storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl RouterError {
    /// Builds a `SessionUnavailable` error for the given session
    pub fn session_unavailable(session_id: impl ToString, reason: impl Into<String>) -> Self {
        Self::SessionUnavailable {
            session_id: session_id.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for router operations
///
/// Uses `anyhow::Error` so context can be attached while propagating;
/// typed failures are recovered with `downcast_ref::<RouterError>()`.
pub type Result<T> = anyhow::Result<T>;
