//! Subject iterator
//!
//! Walks the per-subject pipeline for the subject under the cursor and
//! decides whether to keep working on it, move to the next subject or
//! finalize the run.

use crate::completion::{is_complete, is_debate_complete};
use crate::config::RoutingConfig;
use crate::dispatch::RouteDecision;
use tradegraph_core::{DebateKind, Stage, SubjectState, WorkflowState};

/// Pipeline walker bound to a routing configuration
#[derive(Debug, Clone, Copy)]
pub struct SubjectIterator<'a> {
    config: &'a RoutingConfig,
}

impl<'a> SubjectIterator<'a> {
    pub fn new(config: &'a RoutingConfig) -> Self {
        Self { config }
    }

    /// The first incomplete stage of a subject's pipeline
    ///
    /// Returns `None` once the portfolio optimizer is done. Inside a debate
    /// the round counter picks the participant.
    pub fn active_stage(&self, state: &WorkflowState, subject: &str) -> Option<Stage> {
        let fresh = SubjectState::default();
        let progress = state.subject(subject).unwrap_or(&fresh);

        for kind in &self.config.analysts {
            if !is_complete(progress, *kind) {
                return Stage::analyst(*kind);
            }
        }

        let counters = state.counters(subject);
        for debate in [DebateKind::Investment, DebateKind::Risk] {
            let rotation = self.config.rotation(debate);
            let max_rounds = self.config.max_rounds(debate);
            let round = counters.get(debate);
            if !is_debate_complete(progress, debate, round, &rotation, max_rounds) {
                return Some(rotation.next_participant(round, max_rounds).stage());
            }
        }

        let optimizer = Stage::PortfolioOptimizer;
        optimizer
            .report_kind()
            .filter(|kind| !is_complete(progress, *kind))
            .map(|_| optimizer)
    }

    /// Decide the next move for the run
    ///
    /// This never mutates the state: on [`RouteDecision::AdvanceSubject`]
    /// the caller moves the cursor and asks again.
    pub fn next_step(&self, state: &WorkflowState) -> RouteDecision {
        let Some(subject) = state.current_subject() else {
            return RouteDecision::Finalize;
        };

        if let Some(stage) = self.active_stage(state, subject) {
            return RouteDecision::ContinueStage(stage);
        }

        if state.is_last_subject() {
            RouteDecision::Finalize
        } else {
            RouteDecision::AdvanceSubject
        }
    }

    /// Whether every pipeline stage of a subject is done
    pub fn is_subject_done(&self, state: &WorkflowState, subject: &str) -> bool {
        self.active_stage(state, subject).is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradegraph_core::ReportKind;

    fn finish_subject(state: &mut WorkflowState, subject: &str) {
        let progress = state.subject_mut(subject).unwrap();
        for kind in ReportKind::ALL {
            progress.mark_complete(kind);
        }
    }

    #[test]
    fn test_fresh_subject_starts_at_first_analyst() {
        let config = RoutingConfig::default();
        let state = WorkflowState::new(["AAPL"]).unwrap();
        let iter = SubjectIterator::new(&config);
        assert_eq!(iter.active_stage(&state, "AAPL"), Some(Stage::Market));
        assert_eq!(
            iter.next_step(&state),
            RouteDecision::ContinueStage(Stage::Market)
        );
    }

    #[test]
    fn test_deselected_analysts_skipped() {
        let config = RoutingConfig::builder()
            .analysts([ReportKind::News])
            .build()
            .unwrap();
        let mut state = WorkflowState::new(["AAPL"]).unwrap();
        let iter = SubjectIterator::new(&config);
        assert_eq!(iter.active_stage(&state, "AAPL"), Some(Stage::News));

        state
            .subject_mut("AAPL")
            .unwrap()
            .reports
            .set(ReportKind::News, "earnings beat");
        assert_eq!(iter.active_stage(&state, "AAPL"), Some(Stage::Bull));
    }

    #[test]
    fn test_flag_with_empty_report_moves_past_market() {
        let config = RoutingConfig::default();
        let mut state = WorkflowState::new(["X"]).unwrap();
        state.subject_mut("X").unwrap().mark_complete(ReportKind::Market);

        let iter = SubjectIterator::new(&config);
        assert_eq!(iter.active_stage(&state, "X"), Some(Stage::Fundamentals));
    }

    #[test]
    fn test_debate_follows_counter() {
        let config = RoutingConfig::builder()
            .analysts([ReportKind::Market])
            .build()
            .unwrap();
        let mut state = WorkflowState::new(["A"]).unwrap();
        state.subject_mut("A").unwrap().mark_complete(ReportKind::Market);
        let iter = SubjectIterator::new(&config);

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(iter.active_stage(&state, "A").unwrap());
            state.counters_mut("A").unwrap().advance(DebateKind::Investment);
        }
        assert_eq!(seen, vec![Stage::Bull, Stage::Bear, Stage::ResearchManager]);
        assert_eq!(iter.active_stage(&state, "A"), Some(Stage::Aggressive));
    }

    #[test]
    fn test_subject_coverage_order() {
        let config = RoutingConfig::default();
        let mut state = WorkflowState::new(["A", "B", "C"]).unwrap();
        let iter = SubjectIterator::new(&config);
        let mut visited = Vec::new();

        loop {
            match iter.next_step(&state) {
                RouteDecision::ContinueStage(_) => {
                    let subject = state.current_subject().unwrap().to_string();
                    visited.push(subject.clone());
                    finish_subject(&mut state, &subject);
                }
                RouteDecision::AdvanceSubject => {
                    state.advance_subject().unwrap();
                }
                RouteDecision::Finalize => break,
            }
        }

        assert_eq!(visited, vec!["A", "B", "C"]);
        assert!(state.is_last_subject());
    }

    #[test]
    fn test_all_done_finalizes() {
        let config = RoutingConfig::default();
        let mut state = WorkflowState::new(["A"]).unwrap();
        state.advance_subject().unwrap();
        assert_eq!(
            SubjectIterator::new(&config).next_step(&state),
            RouteDecision::Finalize
        );
    }

    #[test]
    fn test_next_step_is_pure() {
        let config = RoutingConfig::default();
        let mut state = WorkflowState::new(["A", "B"]).unwrap();
        finish_subject(&mut state, "A");
        let before = state.clone();

        let iter = SubjectIterator::new(&config);
        assert_eq!(iter.next_step(&state), RouteDecision::AdvanceSubject);
        assert_eq!(iter.next_step(&state), RouteDecision::AdvanceSubject);
        assert_eq!(state, before);
        assert!(iter.is_subject_done(&state, "A"));
        assert!(!iter.is_subject_done(&state, "B"));
    }
}
