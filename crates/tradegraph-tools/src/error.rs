//! Error types for tool execution

use thiserror::Error;

/// Result type alias for tool operations
pub type Result<T> = std::result::Result<T, ToolError>;

/// Errors raised by tools
#[derive(Debug, Error)]
pub enum ToolError {
    /// No tool registered under this name
    #[error("Tool not found: {0}")]
    NotFound(String),

    /// Input did not match the tool's schema
    #[error("Invalid input for {tool}: {reason}")]
    InvalidInput { tool: String, reason: String },

    /// The tool ran and failed
    #[error("Tool {tool} failed: {reason}")]
    ExecutionFailed { tool: String, reason: String },
}

impl From<ToolError> for tradegraph_core::Error {
    fn from(err: ToolError) -> Self {
        tradegraph_core::Error::Generic(err.to_string())
    }
}
