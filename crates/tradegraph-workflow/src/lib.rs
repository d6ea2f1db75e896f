//! Workflow orchestration for tradegraph
//!
//! This crate decides which stage runs next and guarantees that every run
//! terminates:
//!
//! - [`completion`]: the permissive "flag or text" completion predicate
//! - [`debate`]: the round-bounded rotation of debate speakers and judge
//! - [`subjects`]: the per-subject pipeline walker
//! - [`dispatch`]: routing decisions, the routing policy seam and the
//!   transition checks that guard it
//! - [`guard`]: the hard step ceiling
//! - [`orchestrator`]: the driver loop tying these together
//!
//! # Example
//!
//! ```no_run
//! use tradegraph_core::WorkflowState;
//! use tradegraph_workflow::{template_registry, Orchestrator, RoutingConfig};
//!
//! # async fn demo() -> tradegraph_workflow::Result<()> {
//! let orchestrator = Orchestrator::builder()
//!     .config(RoutingConfig::builder().max_investment_rounds(2).build()?)
//!     .handlers(template_registry())
//!     .build()?;
//!
//! let report = orchestrator
//!     .run(WorkflowState::new(["AAPL", "MSFT"])?)
//!     .await?
//!     .into_result()?;
//! for decision in report.decisions() {
//!     println!("{}: {}", decision.subject, decision.action);
//! }
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod batch;
pub mod checkpoint;
pub mod completion;
pub mod config;
pub mod debate;
pub mod dispatch;
pub mod error;
pub mod guard;
pub mod orchestrator;
pub mod outcome;
pub mod registry;
pub mod subjects;
pub mod template;

#[cfg(test)]
mod testing;

pub use audit::{AuditRecorder, MemoryRecorder, TracingRecorder, TransitionRecord};
pub use batch::{run_batch, BatchResult};
pub use checkpoint::{WorkflowSnapshot, SNAPSHOT_VERSION};
pub use completion::{is_complete, is_debate_complete};
pub use config::{RiskRotation, RoutingConfig, RoutingConfigBuilder};
pub use debate::{next_participant, DebateRound, Participant, Rotation, Turn};
pub use dispatch::{PipelinePolicy, RouteDecision, RoutingPolicy};
pub use error::{Result, WorkflowError};
pub use guard::{CycleGuard, GuardStatus};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use outcome::{Outcome, RunReport, SubjectDecision, TradeAction, TraceEntry};
pub use registry::StageRegistry;
pub use subjects::SubjectIterator;
pub use template::{template_registry, TemplateStage};
