//! Run outcomes and per-subject decisions

use crate::{Result, WorkflowError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;
use tradegraph_core::{ReportKind, Stage, SubjectState, WorkflowState};

static PROPOSAL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)FINAL\s+TRANSACTION\s+PROPOSAL:\s*\**\s*(BUY|SELL|HOLD)\b").ok()
});

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// A terminal stage ran
    Completed,
    /// The cycle guard tripped
    RecursionLimitExceeded { limit: u64 },
    /// The run's deadline passed
    DeadlineExceeded { deadline: Duration },
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Trade action proposed for a subject
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
    #[default]
    Hold,
}

impl TradeAction {
    fn from_keyword(word: &str) -> Option<Self> {
        match word.trim().to_ascii_uppercase().as_str() {
            "BUY" => Some(Self::Buy),
            "SELL" => Some(Self::Sell),
            "HOLD" => Some(Self::Hold),
            _ => None,
        }
    }

    /// Extract the action from a decision report
    ///
    /// Accepts a bare `BUY`/`SELL`/`HOLD` or a
    /// `FINAL TRANSACTION PROPOSAL: **BUY**` marker anywhere in the text.
    /// Anything else is a hold.
    pub fn from_report(text: &str) -> Self {
        if let Some(action) = Self::from_keyword(text) {
            return action;
        }

        PROPOSAL
            .as_ref()
            .and_then(|re| re.captures(text))
            .and_then(|caps| caps.get(1))
            .and_then(|m| Self::from_keyword(m.as_str()))
            .unwrap_or_default()
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Hold => write!(f, "HOLD"),
        }
    }
}

/// Final decision for one subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectDecision {
    pub subject: String,
    pub action: TradeAction,
    /// Risk decision, or the investment decision when the risk debate
    /// produced nothing
    pub decision: String,
    /// Whether any stage finished on partial or no output
    pub degraded: bool,
    pub degraded_stages: Vec<ReportKind>,
}

impl SubjectDecision {
    fn from_progress(subject: &str, progress: &SubjectState) -> Self {
        let decision = [ReportKind::RiskDecision, ReportKind::InvestmentDecision]
            .into_iter()
            .find(|kind| progress.reports.is_produced(*kind))
            .map(|kind| progress.reports.get(kind).to_string())
            .unwrap_or_default();

        Self {
            subject: subject.to_string(),
            action: TradeAction::from_report(&decision),
            decision,
            degraded: progress.is_degraded(),
            degraded_stages: progress.degraded.iter().copied().collect(),
        }
    }
}

/// A stage the orchestrator invoked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub subject: Option<String>,
    pub stage: Stage,
}

/// Everything a run produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub state: WorkflowState,
    pub outcome: Outcome,
    /// Orchestrator iterations consumed, including any resumed from a snapshot
    pub steps: u64,
    /// Stages invoked by this call, in order
    pub trace: Vec<TraceEntry>,
    /// Stage to continue from when the run stopped early
    pub next_stage: Option<Stage>,
}

impl RunReport {
    /// One decision per subject, in processing order
    pub fn decisions(&self) -> Vec<SubjectDecision> {
        let fresh = SubjectState::default();
        self.state
            .subjects()
            .iter()
            .map(|s| SubjectDecision::from_progress(s, self.state.subject(s).unwrap_or(&fresh)))
            .collect()
    }

    /// Stages invoked for one subject
    pub fn stages_for(&self, subject: &str) -> Vec<Stage> {
        self.trace
            .iter()
            .filter(|e| e.subject.as_deref() == Some(subject))
            .map(|e| e.stage)
            .collect()
    }

    /// Turn an aborted run into its error, keeping the last state
    pub fn into_result(self) -> Result<RunReport> {
        match self.outcome {
            Outcome::Completed => Ok(self),
            Outcome::RecursionLimitExceeded { limit } => {
                Err(WorkflowError::RecursionLimitExceeded {
                    limit,
                    state: Box::new(self.state),
                })
            }
            Outcome::DeadlineExceeded { deadline } => Err(WorkflowError::DeadlineExceeded {
                deadline,
                steps: self.steps,
                state: Box::new(self.state),
            }),
        }
    }
}
