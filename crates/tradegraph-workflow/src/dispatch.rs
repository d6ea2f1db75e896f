//! Stage dispatch table
//!
//! A routing policy proposes a [`RouteDecision`]; [`resolve`] maps the
//! current node and that decision onto the next node of the graph, rejecting
//! moves that are inconsistent with the state. The orchestrator treats a
//! rejection as a defect in the policy and finalizes.

use crate::config::RoutingConfig;
use crate::subjects::SubjectIterator;
use crate::{Result, WorkflowError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tradegraph_core::{Stage, WorkflowState};

/// Closed set of routing outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "stage", rename_all = "snake_case")]
pub enum RouteDecision {
    /// Run this stage for the current subject
    ContinueStage(Stage),
    /// Move the cursor to the next subject
    AdvanceSubject,
    /// Run the terminal stage
    Finalize,
}

/// Where the orchestrator goes next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    /// Invoke a per-subject stage
    Stage(Stage),
    /// Advance the subject cursor and route again
    AdvanceSubject,
    /// Invoke the terminal stage and stop
    Terminal(Stage),
}

/// Decides which stage runs next
///
/// Implementations must be pure: the orchestrator is the only writer of the
/// state and applies any subject advance itself.
pub trait RoutingPolicy: Send + Sync {
    /// Propose the next move given the state and the node just executed
    fn route(&self, state: &WorkflowState, current: Option<Stage>) -> RouteDecision;
}

/// Default policy: selected analysts, investment debate, risk debate,
/// portfolio optimizer, for each subject in order
#[derive(Debug, Clone)]
pub struct PipelinePolicy {
    config: Arc<RoutingConfig>,
}

impl PipelinePolicy {
    pub fn new(config: Arc<RoutingConfig>) -> Self {
        Self { config }
    }
}

impl RoutingPolicy for PipelinePolicy {
    fn route(&self, state: &WorkflowState, _current: Option<Stage>) -> RouteDecision {
        SubjectIterator::new(&self.config).next_step(state)
    }
}

/// The terminal stage for a run
pub fn terminal_stage(state: &WorkflowState) -> Stage {
    if state.is_portfolio() {
        Stage::PortfolioFinalization
    } else {
        Stage::SingleSubjectFinalization
    }
}

/// Position of a stage in the per-subject pipeline; debate members share
/// their debate's phase
fn phase(stage: Stage) -> u8 {
    match stage {
        Stage::Market => 0,
        Stage::Fundamentals => 1,
        Stage::News => 2,
        Stage::Sentiment => 3,
        Stage::Bull | Stage::Bear | Stage::ResearchManager => 4,
        Stage::Aggressive | Stage::Conservative | Stage::Neutral | Stage::RiskJudge => 5,
        Stage::PortfolioOptimizer => 6,
        Stage::SingleSubjectFinalization | Stage::PortfolioFinalization => 7,
    }
}

/// Map the current node and a routing decision onto the next node
///
/// `current` is `None` at the start of a run and right after a subject
/// advance.
///
/// # Errors
///
/// Returns [`WorkflowError::RoutingInvariant`] when the decision would
/// advance past the last subject, continue a finished run, dispatch a
/// terminal stage as a pipeline stage or move backwards within a subject.
pub fn resolve(
    state: &WorkflowState,
    current: Option<Stage>,
    decision: RouteDecision,
) -> Result<Next> {
    match decision {
        RouteDecision::ContinueStage(stage) => {
            if stage.is_terminal() {
                return Err(WorkflowError::RoutingInvariant(format!(
                    "{stage} is terminal and cannot be continued"
                )));
            }
            if state.all_subjects_done() {
                return Err(WorkflowError::RoutingInvariant(format!(
                    "continue {stage} after all {} subjects finished",
                    state.subjects().len()
                )));
            }
            if let Some(from) = current {
                if phase(stage) < phase(from) {
                    return Err(WorkflowError::RoutingInvariant(format!(
                        "{from} -> {stage} moves backwards for {}",
                        state.current_subject().unwrap_or_default()
                    )));
                }
            }
            Ok(Next::Stage(stage))
        }
        RouteDecision::AdvanceSubject => {
            if state.all_subjects_done() || state.is_last_subject() {
                return Err(WorkflowError::RoutingInvariant(format!(
                    "cannot advance past subject {} of {}",
                    state.current_subject_index(),
                    state.subjects().len()
                )));
            }
            Ok(Next::AdvanceSubject)
        }
        RouteDecision::Finalize => Ok(Next::Terminal(terminal_stage(state))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_stage_by_subject_count() {
        let single = WorkflowState::new(["AAPL"]).unwrap();
        let multi = WorkflowState::new(["AAPL", "MSFT"]).unwrap();
        assert_eq!(terminal_stage(&single), Stage::SingleSubjectFinalization);
        assert_eq!(terminal_stage(&multi), Stage::PortfolioFinalization);
    }

    #[test]
    fn test_resolve_forward_moves() {
        let state = WorkflowState::new(["A", "B"]).unwrap();
        assert_eq!(
            resolve(&state, None, RouteDecision::ContinueStage(Stage::Market)).unwrap(),
            Next::Stage(Stage::Market)
        );
        assert_eq!(
            resolve(&state, Some(Stage::Market), RouteDecision::ContinueStage(Stage::Market))
                .unwrap(),
            Next::Stage(Stage::Market)
        );
        assert_eq!(
            resolve(
                &state,
                Some(Stage::ResearchManager),
                RouteDecision::ContinueStage(Stage::Bull)
            )
            .unwrap(),
            Next::Stage(Stage::Bull)
        );
        assert_eq!(
            resolve(&state, Some(Stage::PortfolioOptimizer), RouteDecision::AdvanceSubject)
                .unwrap(),
            Next::AdvanceSubject
        );
        assert_eq!(
            resolve(&state, Some(Stage::Market), RouteDecision::Finalize).unwrap(),
            Next::Terminal(Stage::PortfolioFinalization)
        );
    }

    #[test]
    fn test_resolve_rejects_backwards_move() {
        let state = WorkflowState::new(["A"]).unwrap();
        let err = resolve(
            &state,
            Some(Stage::RiskJudge),
            RouteDecision::ContinueStage(Stage::Market),
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::RoutingInvariant(_)));
    }

    #[test]
    fn test_resolve_rejects_advance_past_end() {
        let mut state = WorkflowState::new(["A", "B"]).unwrap();
        state.advance_subject().unwrap();
        assert!(resolve(&state, None, RouteDecision::AdvanceSubject).is_err());

        state.advance_subject().unwrap();
        assert!(resolve(&state, None, RouteDecision::AdvanceSubject).is_err());
        assert!(resolve(&state, None, RouteDecision::ContinueStage(Stage::Market)).is_err());
        assert_eq!(
            resolve(&state, None, RouteDecision::Finalize).unwrap(),
            Next::Terminal(Stage::PortfolioFinalization)
        );
    }

    #[test]
    fn test_resolve_rejects_terminal_continue() {
        let state = WorkflowState::new(["A"]).unwrap();
        assert!(
            resolve(
                &state,
                None,
                RouteDecision::ContinueStage(Stage::SingleSubjectFinalization)
            )
            .is_err()
        );
    }

    #[test]
    fn test_decision_serialization() {
        let json = serde_json::to_value(RouteDecision::ContinueStage(Stage::Bull)).unwrap();
        assert_eq!(json, serde_json::json!({"decision": "continue_stage", "stage": "bull"}));
        let json = serde_json::to_value(RouteDecision::Finalize).unwrap();
        assert_eq!(json, serde_json::json!({"decision": "finalize"}));
    }
}
