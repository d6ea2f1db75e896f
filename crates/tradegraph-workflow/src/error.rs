//! Error types for workflow orchestration

use std::time::Duration;
use thiserror::Error;
use tradegraph_core::{Stage, WorkflowState};
use tradegraph_utils::EnvError;

/// Result type alias for workflow operations
pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Workflow orchestration errors
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Invalid routing parameters; fatal at startup
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The routing policy proposed a move inconsistent with the state
    #[error("Routing invariant violated: {0}")]
    RoutingInvariant(String),

    /// A reachable stage has no registered handler
    #[error("No handler registered for stage {0}")]
    MissingHandler(Stage),

    /// The cycle guard tripped
    #[error("Recursion limit of {limit} steps exceeded")]
    RecursionLimitExceeded {
        limit: u64,
        state: Box<WorkflowState>,
    },

    /// The caller's deadline passed before a terminal stage was reached
    #[error("Deadline of {deadline:?} exceeded after {steps} steps")]
    DeadlineExceeded {
        deadline: Duration,
        steps: u64,
        state: Box<WorkflowState>,
    },

    /// Snapshot could not be read, written or resumed
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// A batch worker panicked or was cancelled
    #[error("Batch worker for {subject} failed: {reason}")]
    Worker { subject: String, reason: String },

    /// Filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error from the core state layer
    #[error(transparent)]
    Core(#[from] tradegraph_core::Error),
}

impl From<EnvError> for WorkflowError {
    fn from(err: EnvError) -> Self {
        WorkflowError::Configuration(err.to_string())
    }
}
