//! Core abstractions for tradegraph
//!
//! This crate defines the fundamental types shared by the workflow engine and
//! by stage handlers: the fixed-shape workflow state, the closed stage
//! catalogue, and the `StageHandler` trait through which external analysis
//! units plug into the pipeline.

pub mod error;
pub mod handler;
pub mod stage;
pub mod state;

pub use error::{Error, Result};
pub use handler::{StageHandler, StageInput, StageMessage, StageUpdate, ToolCall, ToolOutput};
pub use stage::{DebateKind, ReportKind, Stage};
pub use state::{DebateCounters, DebateEntry, Reports, SubjectState, WorkflowState};
