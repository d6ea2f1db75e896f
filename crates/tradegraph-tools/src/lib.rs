//! Tool management and execution framework for tradegraph
//!
//! Stage handlers may answer an invocation with a tool request instead of a
//! report. The orchestrator resolves those requests through a
//! [`ToolRegistry`] and hands the outputs back to the same handler.

pub mod error;
pub mod registry;
pub mod tool;

pub use error::{Result, ToolError};
pub use registry::ToolRegistry;
pub use tool::{Tool, ToolSpec};
