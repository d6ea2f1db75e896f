//! Completion detector
//!
//! Pure predicates over a subject's progress record. A stage is done when its
//! flag was asserted **or** its report holds text. The OR is deliberately
//! permissive: partial output counts as done so that a failing data source
//! can never cause unbounded re-invocation.

use crate::debate::Rotation;
use std::num::NonZeroU32;
use tradegraph_core::{DebateKind, ReportKind, SubjectState};

/// Whether the stage owning `kind` is done for this subject
pub fn is_complete(subject: &SubjectState, kind: ReportKind) -> bool {
    subject.is_flagged(kind) || subject.reports.is_produced(kind)
}

/// Whether a debate is done for this subject
///
/// The judge rewrites the decision report every cycle, so a non-empty
/// decision does not end the debate. It ends when its flag is asserted or
/// its round counter has used the full budget.
pub fn is_debate_complete(
    subject: &SubjectState,
    debate: DebateKind,
    round_number: u32,
    rotation: &Rotation,
    max_rounds: NonZeroU32,
) -> bool {
    subject.is_flagged(debate.decision_report()) || rotation.is_exhausted(round_number, max_rounds)
}

/// Whether a stage completed through the permissive path: flagged without
/// any report text
pub fn is_hollow(subject: &SubjectState, kind: ReportKind) -> bool {
    subject.is_flagged(kind) && !subject.reports.is_produced(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_subject_is_incomplete() {
        let subject = SubjectState::default();
        for kind in ReportKind::ALL {
            assert!(!is_complete(&subject, kind));
        }
    }

    #[test]
    fn test_or_policy() {
        let mut subject = SubjectState::default();
        subject.reports.set(ReportKind::Market, "price above 50d SMA");
        assert!(is_complete(&subject, ReportKind::Market));
        assert!(!is_hollow(&subject, ReportKind::Market));

        subject.mark_complete(ReportKind::News);
        assert!(is_complete(&subject, ReportKind::News));
        assert!(is_hollow(&subject, ReportKind::News));

        subject.reports.set(ReportKind::Sentiment, "  ");
        assert!(!is_complete(&subject, ReportKind::Sentiment));
    }

    #[test]
    fn test_idempotent() {
        let mut subject = SubjectState::default();
        subject.mark_complete(ReportKind::Fundamentals);
        let snapshot = subject.clone();

        let first = is_complete(&subject, ReportKind::Fundamentals);
        let second = is_complete(&subject, ReportKind::Fundamentals);
        assert_eq!(first, second);
        assert_eq!(
            is_complete(&subject, ReportKind::Market),
            is_complete(&subject, ReportKind::Market)
        );
        assert_eq!(subject, snapshot);
    }

    #[test]
    fn test_debate_completion() {
        let rotation = Rotation::investment();
        let rounds = NonZeroU32::MIN;
        let mut subject = SubjectState::default();
        subject
            .reports
            .set(ReportKind::InvestmentDecision, "interim verdict");

        assert!(!is_debate_complete(&subject, DebateKind::Investment, 2, &rotation, rounds));
        assert!(is_debate_complete(&subject, DebateKind::Investment, 3, &rotation, rounds));

        subject.mark_complete(ReportKind::InvestmentDecision);
        assert!(is_debate_complete(&subject, DebateKind::Investment, 0, &rotation, rounds));
        assert!(!is_debate_complete(
            &subject,
            DebateKind::Risk,
            0,
            &Rotation::risk(),
            rounds
        ));
    }
}
