//! Error types for tradegraph-core

use crate::stage::Stage;
use thiserror::Error;

/// Result type alias for tradegraph-core
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for state and stage operations
#[derive(Error, Debug)]
pub enum Error {
    /// Generic error message
    #[error("{0}")]
    Generic(String),

    /// An operation would break a `WorkflowState` invariant
    #[error("Invalid workflow state: {0}")]
    InvalidState(String),

    /// A stage handler could not produce its output
    #[error("Stage {stage} failed: {message}")]
    HandlerFailed { stage: Stage, message: String },

    /// JSON (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a handler failure
    pub fn handler(stage: Stage, message: impl Into<String>) -> Self {
        Self::HandlerFailed {
            stage,
            message: message.into(),
        }
    }
}
