//! Workflow state
//!
//! `WorkflowState` is the single mutable aggregate of a run. It is written
//! only by the orchestrator; stage handlers receive a shared reference and
//! describe their changes as a `StageUpdate`.
//!
//! # Example
//!
//! ```
//! use tradegraph_core::{ReportKind, WorkflowState};
//!
//! let mut state = WorkflowState::new(["AAPL", "MSFT"]).unwrap();
//! assert_eq!(state.current_subject(), Some("AAPL"));
//!
//! state.subject_mut("AAPL").unwrap().reports.set(ReportKind::Market, "uptrend");
//! state.advance_subject().unwrap();
//! assert_eq!(state.current_subject(), Some("MSFT"));
//! ```

use crate::stage::{DebateKind, ReportKind, Stage};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Report text per fixed report key; an empty string means "not produced"
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Reports {
    pub market: String,
    pub fundamentals: String,
    pub news: String,
    pub sentiment: String,
    pub investment_decision: String,
    pub risk_decision: String,
    pub portfolio_contribution: String,
}

impl Reports {
    /// Get a report by key
    pub fn get(&self, kind: ReportKind) -> &str {
        match kind {
            ReportKind::Market => &self.market,
            ReportKind::Fundamentals => &self.fundamentals,
            ReportKind::News => &self.news,
            ReportKind::Sentiment => &self.sentiment,
            ReportKind::InvestmentDecision => &self.investment_decision,
            ReportKind::RiskDecision => &self.risk_decision,
            ReportKind::PortfolioContribution => &self.portfolio_contribution,
        }
    }

    /// Replace a report
    pub fn set(&mut self, kind: ReportKind, text: impl Into<String>) {
        let slot = match kind {
            ReportKind::Market => &mut self.market,
            ReportKind::Fundamentals => &mut self.fundamentals,
            ReportKind::News => &mut self.news,
            ReportKind::Sentiment => &mut self.sentiment,
            ReportKind::InvestmentDecision => &mut self.investment_decision,
            ReportKind::RiskDecision => &mut self.risk_decision,
            ReportKind::PortfolioContribution => &mut self.portfolio_contribution,
        };
        *slot = text.into();
    }

    /// Whether a report holds any non-whitespace text
    pub fn is_produced(&self, kind: ReportKind) -> bool {
        !self.get(kind).trim().is_empty()
    }
}

/// One argument in a debate transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebateEntry {
    /// Round counter value when the argument was made
    pub round: u32,
    pub stage: Stage,
    pub text: String,
}

/// Per-subject progress record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubjectState {
    pub reports: Reports,

    /// Stages whose handler (or the orchestrator on its behalf) asserted
    /// completion, regardless of report text
    pub stage_complete: BTreeSet<ReportKind>,

    /// Stages that completed without a full result: handler failure,
    /// forced completion with empty text, stall bound or exhausted debate
    pub degraded: BTreeSet<ReportKind>,

    pub investment_debate: Vec<DebateEntry>,
    pub risk_debate: Vec<DebateEntry>,
}

impl SubjectState {
    /// Whether completion was explicitly asserted for a stage
    pub fn is_flagged(&self, kind: ReportKind) -> bool {
        self.stage_complete.contains(&kind)
    }

    /// Assert completion for a stage
    pub fn mark_complete(&mut self, kind: ReportKind) {
        self.stage_complete.insert(kind);
    }

    /// Record that a stage completed with partial or no output
    pub fn mark_degraded(&mut self, kind: ReportKind) {
        self.degraded.insert(kind);
    }

    /// Whether any stage of this subject completed degraded
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }

    /// Transcript of one debate
    pub fn transcript(&self, debate: DebateKind) -> &[DebateEntry] {
        match debate {
            DebateKind::Investment => &self.investment_debate,
            DebateKind::Risk => &self.risk_debate,
        }
    }

    /// Append an argument to a debate transcript
    pub fn push_argument(&mut self, debate: DebateKind, entry: DebateEntry) {
        match debate {
            DebateKind::Investment => self.investment_debate.push(entry),
            DebateKind::Risk => self.risk_debate.push(entry),
        }
    }
}

/// Independent round counters for the two debates of one subject
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebateCounters {
    pub investment_round: u32,
    pub risk_round: u32,
}

impl DebateCounters {
    /// Current round of a debate
    pub fn get(&self, debate: DebateKind) -> u32 {
        match debate {
            DebateKind::Investment => self.investment_round,
            DebateKind::Risk => self.risk_round,
        }
    }

    /// Increment a debate's round and return the new value
    pub fn advance(&mut self, debate: DebateKind) -> u32 {
        let slot = match debate {
            DebateKind::Investment => &mut self.investment_round,
            DebateKind::Risk => &mut self.risk_round,
        };
        *slot = slot.saturating_add(1);
        *slot
    }
}

/// Root aggregate of one workflow run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
    subjects: Vec<String>,
    current_subject_index: usize,
    #[serde(default)]
    per_subject: BTreeMap<String, SubjectState>,
    #[serde(default)]
    debate_round_counters: BTreeMap<String, DebateCounters>,
    #[serde(default)]
    workflow_complete: bool,

    /// Synthesis written by the terminal stage
    #[serde(default)]
    pub final_report: String,

    /// Analysis date handed through to stage handlers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade_date: Option<String>,
}

impl WorkflowState {
    /// Create a fresh state for an ordered list of subjects
    ///
    /// # Errors
    ///
    /// Returns an error if the list is empty, contains a blank identifier or
    /// contains duplicates.
    pub fn new<I, S>(subjects: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let state = Self {
            subjects: subjects.into_iter().map(Into::into).collect(),
            current_subject_index: 0,
            per_subject: BTreeMap::new(),
            debate_round_counters: BTreeMap::new(),
            workflow_complete: false,
            final_report: String::new(),
            trade_date: None,
        };
        state.validate()?;
        Ok(state)
    }

    /// Check the invariants `new` establishes
    ///
    /// Deserialized states bypass `new`; call this before driving one.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty, blank or duplicated subject list, a
    /// cursor past the end of the list, or progress kept for a subject that
    /// is not in the list.
    pub fn validate(&self) -> Result<()> {
        if self.subjects.is_empty() {
            return Err(Error::InvalidState("at least one subject is required".to_string()));
        }

        let mut seen = BTreeSet::new();
        for subject in &self.subjects {
            if subject.trim().is_empty() {
                return Err(Error::InvalidState("subject identifiers must not be blank".to_string()));
            }
            if !seen.insert(subject.as_str()) {
                return Err(Error::InvalidState(format!("duplicate subject: {subject}")));
            }
        }

        if self.current_subject_index > self.subjects.len() {
            return Err(Error::InvalidState(format!(
                "cursor {} is past the {} subject(s)",
                self.current_subject_index,
                self.subjects.len()
            )));
        }

        if let Some(stray) = self
            .per_subject
            .keys()
            .chain(self.debate_round_counters.keys())
            .find(|s| !seen.contains(s.as_str()))
        {
            return Err(Error::InvalidState(format!("progress kept for unknown subject: {stray}")));
        }
        Ok(())
    }

    /// Attach the analysis date
    pub fn with_trade_date(mut self, date: impl Into<String>) -> Self {
        self.trade_date = Some(date.into());
        self
    }

    /// Subjects in processing order
    pub fn subjects(&self) -> &[String] {
        &self.subjects
    }

    /// Cursor into `subjects`; equal to `subjects().len()` once all are done
    pub fn current_subject_index(&self) -> usize {
        self.current_subject_index
    }

    /// The subject currently being processed
    pub fn current_subject(&self) -> Option<&str> {
        self.subjects
            .get(self.current_subject_index)
            .map(String::as_str)
    }

    /// Whether the cursor sits on the last subject
    pub fn is_last_subject(&self) -> bool {
        self.current_subject_index.checked_add(1) == Some(self.subjects.len())
    }

    /// Whether the cursor has moved past every subject
    pub fn all_subjects_done(&self) -> bool {
        self.current_subject_index >= self.subjects.len()
    }

    /// Multi-subject runs end in portfolio finalization
    pub fn is_portfolio(&self) -> bool {
        self.subjects.len() > 1
    }

    /// Whether a subject belongs to this run
    pub fn contains(&self, subject: &str) -> bool {
        self.subjects.iter().any(|s| s == subject)
    }

    /// Move the cursor to the next subject
    ///
    /// The cursor never moves backwards and never passes `subjects().len()`.
    pub fn advance_subject(&mut self) -> Result<usize> {
        if self.current_subject_index >= self.subjects.len() {
            return Err(Error::InvalidState(format!(
                "cannot advance past subject {} of {}",
                self.current_subject_index,
                self.subjects.len()
            )));
        }
        self.current_subject_index += 1;
        Ok(self.current_subject_index)
    }

    /// Move the cursor from the last subject to the "all done" position
    ///
    /// No-op unless the cursor is on the last subject.
    pub fn finish_subjects(&mut self) {
        if self.is_last_subject() {
            self.current_subject_index = self.subjects.len();
        }
    }

    /// Move the cursor straight to the "all done" position
    ///
    /// Used only when the run is being finalized early. Returns how many
    /// subjects were never finished.
    pub fn abandon_remaining_subjects(&mut self) -> usize {
        let skipped = self
            .subjects
            .len()
            .saturating_sub(self.current_subject_index.saturating_add(1));
        self.current_subject_index = self.subjects.len();
        skipped
    }

    /// Progress record of a subject, if it has been visited
    pub fn subject(&self, subject: &str) -> Option<&SubjectState> {
        self.per_subject.get(subject)
    }

    /// Progress record of a subject, created on first visit
    pub fn subject_mut(&mut self, subject: &str) -> Result<&mut SubjectState> {
        if !self.contains(subject) {
            return Err(Error::InvalidState(format!("unknown subject: {subject}")));
        }
        Ok(self.per_subject.entry(subject.to_string()).or_default())
    }

    /// Round counters of a subject (zero when never debated)
    pub fn counters(&self, subject: &str) -> DebateCounters {
        self.debate_round_counters
            .get(subject)
            .copied()
            .unwrap_or_default()
    }

    /// Mutable round counters of a subject, created on first use
    pub fn counters_mut(&mut self, subject: &str) -> Result<&mut DebateCounters> {
        if !self.contains(subject) {
            return Err(Error::InvalidState(format!("unknown subject: {subject}")));
        }
        Ok(self
            .debate_round_counters
            .entry(subject.to_string())
            .or_default())
    }

    /// Iterate visited subjects with their progress, in processing order
    pub fn visited(&self) -> impl Iterator<Item = (&str, &SubjectState)> {
        self.subjects
            .iter()
            .filter_map(|s| self.per_subject.get(s).map(|st| (s.as_str(), st)))
    }

    /// Whether the terminal stage has run
    pub fn workflow_complete(&self) -> bool {
        self.workflow_complete
    }

    /// Mark the run complete; allowed exactly once
    pub fn mark_workflow_complete(&mut self) -> Result<()> {
        if self.workflow_complete {
            return Err(Error::InvalidState("workflow already complete".to_string()));
        }
        self.workflow_complete = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_bad_subjects() {
        assert!(WorkflowState::new(Vec::<String>::new()).is_err());
        assert!(WorkflowState::new(["AAPL", " "]).is_err());
        assert!(WorkflowState::new(["AAPL", "MSFT", "AAPL"]).is_err());
    }

    #[test]
    fn test_cursor_moves_forward_only() {
        let mut state = WorkflowState::new(["A", "B"]).unwrap();
        assert!(!state.is_last_subject());
        assert_eq!(state.advance_subject().unwrap(), 1);
        assert!(state.is_last_subject());
        assert_eq!(state.advance_subject().unwrap(), 2);
        assert!(state.all_subjects_done());
        assert_eq!(state.current_subject(), None);
        assert!(state.advance_subject().is_err());
        assert_eq!(state.current_subject_index(), 2);
    }

    #[test]
    fn test_finish_subjects_only_from_last() {
        let mut state = WorkflowState::new(["A", "B"]).unwrap();
        state.finish_subjects();
        assert_eq!(state.current_subject_index(), 0);
        state.advance_subject().unwrap();
        state.finish_subjects();
        assert!(state.all_subjects_done());
    }

    #[test]
    fn test_abandon_remaining_subjects() {
        let mut state = WorkflowState::new(["A", "B", "C"]).unwrap();
        assert_eq!(state.abandon_remaining_subjects(), 2);
        assert!(state.all_subjects_done());
        assert_eq!(state.current_subject_index(), 3);
        assert_eq!(state.abandon_remaining_subjects(), 0);
        assert_eq!(state.current_subject_index(), 3);
    }

    #[test]
    fn test_deserialized_cursor_is_validated() {
        let mut json = serde_json::to_value(WorkflowState::new(["A", "B"]).unwrap()).unwrap();
        json["current_subject_index"] = serde_json::json!(usize::MAX);
        let state: WorkflowState = serde_json::from_value(json).unwrap();

        assert!(!state.is_last_subject());
        assert!(state.all_subjects_done());
        assert!(state.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_stray_progress() {
        let mut json = serde_json::to_value(WorkflowState::new(["A"]).unwrap()).unwrap();
        json["per_subject"]["Z"] = serde_json::json!({});
        let state: WorkflowState = serde_json::from_value(json).unwrap();
        assert!(state.validate().is_err());
        assert!(WorkflowState::new(["A"]).unwrap().validate().is_ok());
    }

    #[test]
    fn test_subject_created_lazily() {
        let mut state = WorkflowState::new(["A"]).unwrap();
        assert!(state.subject("A").is_none());
        state.subject_mut("A").unwrap().mark_complete(ReportKind::Market);
        assert!(state.subject("A").unwrap().is_flagged(ReportKind::Market));
        assert!(state.subject_mut("Z").is_err());
    }

    #[test]
    fn test_counters_independent() {
        let mut state = WorkflowState::new(["A"]).unwrap();
        assert_eq!(state.counters("A"), DebateCounters::default());
        let counters = state.counters_mut("A").unwrap();
        assert_eq!(counters.advance(DebateKind::Investment), 1);
        assert_eq!(counters.advance(DebateKind::Investment), 2);
        assert_eq!(state.counters("A").get(DebateKind::Investment), 2);
        assert_eq!(state.counters("A").get(DebateKind::Risk), 0);
    }

    #[test]
    fn test_workflow_complete_once() {
        let mut state = WorkflowState::new(["A"]).unwrap();
        state.mark_workflow_complete().unwrap();
        assert!(state.workflow_complete());
        assert!(state.mark_workflow_complete().is_err());
    }

    #[test]
    fn test_reports_whitespace_is_not_produced() {
        let mut reports = Reports::default();
        reports.set(ReportKind::News, "   \n");
        assert!(!reports.is_produced(ReportKind::News));
        reports.set(ReportKind::News, "headline");
        assert!(reports.is_produced(ReportKind::News));
        assert_eq!(reports.get(ReportKind::News), "headline");
    }

    #[test]
    fn test_snapshot_shape_roundtrip() {
        let mut state = WorkflowState::new(["AAPL", "MSFT"])
            .unwrap()
            .with_trade_date("2025-07-10");
        state
            .subject_mut("AAPL")
            .unwrap()
            .reports
            .set(ReportKind::Market, "trend up");
        state.counters_mut("AAPL").unwrap().advance(DebateKind::Risk);

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["subjects"], serde_json::json!(["AAPL", "MSFT"]));
        assert_eq!(json["current_subject_index"], 0);
        assert_eq!(json["per_subject"]["AAPL"]["reports"]["market"], "trend up");
        assert_eq!(json["debate_round_counters"]["AAPL"]["risk_round"], 1);

        let back: WorkflowState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }
}
