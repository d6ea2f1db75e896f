//! Deterministic template handlers
//!
//! Every stage produces fixed-format text derived only from the subject and
//! the state it is handed. Used for dry runs of the pipeline and as a
//! stand-in wherever real analysis handlers are not wired up.

use crate::outcome::TradeAction;
use crate::registry::StageRegistry;
use async_trait::async_trait;
use std::fmt::Write;
use std::sync::Arc;
use tradegraph_core::{
    ReportKind, Result, Stage, StageHandler, StageInput, StageMessage, StageUpdate,
};

/// Handler that fills any stage with template text
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateStage;

impl TemplateStage {
    /// Stable pseudo-decision per subject
    pub fn action_for(subject: &str) -> TradeAction {
        let sum: u32 = subject.bytes().map(u32::from).sum();
        match sum % 3 {
            0 => TradeAction::Buy,
            1 => TradeAction::Hold,
            _ => TradeAction::Sell,
        }
    }

    fn summary(input: &StageInput<'_>) -> String {
        let mut out = String::new();
        for (subject, progress) in input.state.visited() {
            let decision = progress.reports.get(ReportKind::RiskDecision);
            let action = TradeAction::from_report(decision);
            let flag = if progress.is_degraded() { " (partial)" } else { "" };
            let _ = writeln!(out, "{subject}: {action}{flag}");
        }
        out
    }
}

#[async_trait]
impl StageHandler for TemplateStage {
    async fn handle(&self, input: StageInput<'_>) -> Result<StageMessage> {
        let stage = input.stage;
        let date = input.state.trade_date.as_deref().unwrap_or("latest");

        let Some(subject) = input.subject else {
            let summary = Self::summary(&input);
            return Ok(StageUpdate::final_report(format!("Portfolio synthesis ({date})\n{summary}")).into());
        };

        let update = match stage {
            Stage::Market | Stage::Fundamentals | Stage::News | Stage::Sentiment => {
                StageUpdate::report(format!("{stage} for {subject} on {date}: template analysis."))
            }
            Stage::Bull | Stage::Bear | Stage::Aggressive | Stage::Conservative | Stage::Neutral => {
                let heard = input
                    .subject_state()
                    .zip(stage.debate())
                    .map_or(0, |(progress, debate)| progress.transcript(debate).len());
                StageUpdate::argument(format!(
                    "{stage} on {subject}: responding to {heard} earlier argument(s)."
                ))
            }
            Stage::ResearchManager | Stage::RiskJudge => StageUpdate::report(format!(
                "{stage} verdict for {subject}.\n\nFINAL TRANSACTION PROPOSAL: **{}**",
                Self::action_for(subject)
            )),
            Stage::PortfolioOptimizer => {
                StageUpdate::report(format!("{subject}: hold current allocation."))
            }
            Stage::SingleSubjectFinalization | Stage::PortfolioFinalization => {
                StageUpdate::final_report(format!("Decision ({date})\n{}", Self::summary(&input)))
            }
        };

        Ok(update.into())
    }

    fn name(&self) -> &str {
        "template"
    }
}

/// A registry with [`TemplateStage`] behind every stage
pub fn template_registry() -> StageRegistry {
    let handler: Arc<dyn StageHandler> = Arc::new(TemplateStage);
    Stage::ALL
        .into_iter()
        .fold(StageRegistry::new(), |registry, stage| {
            registry.with(stage, Arc::clone(&handler))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradegraph_core::WorkflowState;

    fn input<'a>(state: &'a WorkflowState, stage: Stage, subject: Option<&'a str>) -> StageInput<'a> {
        StageInput {
            state,
            stage,
            subject,
            tool_outputs: &[],
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn test_judge_proposes_stable_action() {
        let state = WorkflowState::new(["AAPL"]).unwrap();
        let message = TemplateStage
            .handle(input(&state, Stage::RiskJudge, Some("AAPL")))
            .await
            .unwrap();

        let StageMessage::PlainReport(update) = message else {
            panic!("expected a report");
        };
        let report = update.report.unwrap();
        assert_eq!(
            TradeAction::from_report(&report),
            TemplateStage::action_for("AAPL")
        );
    }

    #[tokio::test]
    async fn test_speakers_argue() {
        let state = WorkflowState::new(["AAPL"]).unwrap();
        let message = TemplateStage
            .handle(input(&state, Stage::Bear, Some("AAPL")))
            .await
            .unwrap();
        assert_eq!(
            message,
            StageMessage::PlainReport(StageUpdate::argument(
                "Bear Researcher on AAPL: responding to 0 earlier argument(s)."
            ))
        );
    }

    #[tokio::test]
    async fn test_portfolio_finalization_summarises() {
        let mut state = WorkflowState::new(["A", "B"]).unwrap();
        state
            .subject_mut("A")
            .unwrap()
            .reports
            .set(ReportKind::RiskDecision, "FINAL TRANSACTION PROPOSAL: **SELL**");

        let message = TemplateStage
            .handle(input(&state, Stage::PortfolioFinalization, None))
            .await
            .unwrap();
        let StageMessage::PlainReport(update) = message else {
            panic!("expected a report");
        };
        assert!(update.final_report.unwrap().contains("A: SELL"));
    }

    #[test]
    fn test_registry_covers_every_stage() {
        let registry = template_registry();
        assert_eq!(registry.len(), Stage::ALL.len());
    }
}
