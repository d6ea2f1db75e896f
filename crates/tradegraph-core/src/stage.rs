//! Stage catalogue
//!
//! Every node of the dispatch graph is a variant of [`Stage`]. Routing code
//! matches on these exhaustively, so a stage that is not handled is a compile
//! error rather than a silently dropped string.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Report fields kept per subject
///
/// The set is fixed: every subject carries exactly these reports, empty until
/// the owning stage produces text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Market,
    Fundamentals,
    News,
    Sentiment,
    InvestmentDecision,
    RiskDecision,
    PortfolioContribution,
}

impl ReportKind {
    /// All report kinds in pipeline order
    pub const ALL: [ReportKind; 7] = [
        Self::Market,
        Self::Fundamentals,
        Self::News,
        Self::Sentiment,
        Self::InvestmentDecision,
        Self::RiskDecision,
        Self::PortfolioContribution,
    ];

    /// The analyst reports, in the order analysts run
    pub const ANALYSTS: [ReportKind; 4] =
        [Self::Market, Self::Fundamentals, Self::News, Self::Sentiment];

    /// Stable snake_case key, identical to the serialized form
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Market => "market",
            Self::Fundamentals => "fundamentals",
            Self::News => "news",
            Self::Sentiment => "sentiment",
            Self::InvestmentDecision => "investment_decision",
            Self::RiskDecision => "risk_decision",
            Self::PortfolioContribution => "portfolio_contribution",
        }
    }

    /// Whether this report is produced by one of the analyst stages
    pub fn is_analyst(self) -> bool {
        matches!(
            self,
            Self::Market | Self::Fundamentals | Self::News | Self::Sentiment
        )
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "market" => Ok(Self::Market),
            "fundamentals" => Ok(Self::Fundamentals),
            "news" => Ok(Self::News),
            "sentiment" | "social" => Ok(Self::Sentiment),
            "investment_decision" => Ok(Self::InvestmentDecision),
            "risk_decision" => Ok(Self::RiskDecision),
            "portfolio_contribution" => Ok(Self::PortfolioContribution),
            other => Err(crate::Error::Generic(format!("Unknown report kind: {other}"))),
        }
    }
}

/// The two bounded debates of the per-subject pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebateKind {
    /// Bull vs bear, judged by the research manager
    Investment,
    /// Aggressive vs conservative (optionally neutral), judged by the risk judge
    Risk,
}

impl DebateKind {
    /// The report the debate's judge writes
    pub fn decision_report(self) -> ReportKind {
        match self {
            Self::Investment => ReportKind::InvestmentDecision,
            Self::Risk => ReportKind::RiskDecision,
        }
    }
}

impl fmt::Display for DebateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Investment => write!(f, "investment"),
            Self::Risk => write!(f, "risk"),
        }
    }
}

/// A node of the dispatch graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Market,
    Fundamentals,
    News,
    Sentiment,
    Bull,
    Bear,
    ResearchManager,
    Aggressive,
    Conservative,
    Neutral,
    RiskJudge,
    PortfolioOptimizer,
    SingleSubjectFinalization,
    PortfolioFinalization,
}

impl Stage {
    /// Every stage, per-subject pipeline first, terminals last
    pub const ALL: [Stage; 14] = [
        Self::Market,
        Self::Fundamentals,
        Self::News,
        Self::Sentiment,
        Self::Bull,
        Self::Bear,
        Self::ResearchManager,
        Self::Aggressive,
        Self::Conservative,
        Self::Neutral,
        Self::RiskJudge,
        Self::PortfolioOptimizer,
        Self::SingleSubjectFinalization,
        Self::PortfolioFinalization,
    ];

    /// The analyst stage producing an analyst report
    pub fn analyst(kind: ReportKind) -> Option<Stage> {
        match kind {
            ReportKind::Market => Some(Self::Market),
            ReportKind::Fundamentals => Some(Self::Fundamentals),
            ReportKind::News => Some(Self::News),
            ReportKind::Sentiment => Some(Self::Sentiment),
            _ => None,
        }
    }

    /// The report namespace this stage belongs to
    ///
    /// Debate speakers belong to their debate's decision report even though
    /// they never write it; terminal stages belong to no subject report.
    pub fn report_kind(self) -> Option<ReportKind> {
        match self {
            Self::Market => Some(ReportKind::Market),
            Self::Fundamentals => Some(ReportKind::Fundamentals),
            Self::News => Some(ReportKind::News),
            Self::Sentiment => Some(ReportKind::Sentiment),
            Self::Bull | Self::Bear | Self::ResearchManager => {
                Some(ReportKind::InvestmentDecision)
            }
            Self::Aggressive | Self::Conservative | Self::Neutral | Self::RiskJudge => {
                Some(ReportKind::RiskDecision)
            }
            Self::PortfolioOptimizer => Some(ReportKind::PortfolioContribution),
            Self::SingleSubjectFinalization | Self::PortfolioFinalization => None,
        }
    }

    /// Whether the stage may write its namespace's report
    pub fn writes_report(self) -> bool {
        self.report_kind().is_some() && !self.is_debate_speaker()
    }

    /// The debate this stage takes part in, if any
    pub fn debate(self) -> Option<DebateKind> {
        match self {
            Self::Bull | Self::Bear | Self::ResearchManager => Some(DebateKind::Investment),
            Self::Aggressive | Self::Conservative | Self::Neutral | Self::RiskJudge => {
                Some(DebateKind::Risk)
            }
            _ => None,
        }
    }

    /// Debate participants other than the judge
    pub fn is_debate_speaker(self) -> bool {
        matches!(
            self,
            Self::Bull | Self::Bear | Self::Aggressive | Self::Conservative | Self::Neutral
        )
    }

    /// Debate judges
    pub fn is_judge(self) -> bool {
        matches!(self, Self::ResearchManager | Self::RiskJudge)
    }

    /// Stages whose completion ends the run
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::SingleSubjectFinalization | Self::PortfolioFinalization
        )
    }

    /// Human readable node name
    pub fn name(self) -> &'static str {
        match self {
            Self::Market => "Market Analyst",
            Self::Fundamentals => "Fundamentals Analyst",
            Self::News => "News Analyst",
            Self::Sentiment => "Sentiment Analyst",
            Self::Bull => "Bull Researcher",
            Self::Bear => "Bear Researcher",
            Self::ResearchManager => "Research Manager",
            Self::Aggressive => "Aggressive Analyst",
            Self::Conservative => "Conservative Analyst",
            Self::Neutral => "Neutral Analyst",
            Self::RiskJudge => "Risk Judge",
            Self::PortfolioOptimizer => "Portfolio Optimizer",
            Self::SingleSubjectFinalization => "Single Subject Finalization",
            Self::PortfolioFinalization => "Portfolio Finalization",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_kind_roundtrip_names() {
        for kind in ReportKind::ALL {
            assert_eq!(kind.as_str().parse::<ReportKind>().unwrap(), kind);
        }
        assert_eq!("Social".parse::<ReportKind>().unwrap(), ReportKind::Sentiment);
        assert!("macro".parse::<ReportKind>().is_err());
    }

    #[test]
    fn test_serialized_form_matches_key() {
        let json = serde_json::to_string(&ReportKind::InvestmentDecision).unwrap();
        assert_eq!(json, "\"investment_decision\"");
        let json = serde_json::to_string(&Stage::RiskJudge).unwrap();
        assert_eq!(json, "\"risk_judge\"");
    }

    #[test]
    fn test_namespaces() {
        assert_eq!(Stage::Bull.report_kind(), Some(ReportKind::InvestmentDecision));
        assert!(!Stage::Bull.writes_report());
        assert!(Stage::ResearchManager.writes_report());
        assert!(Stage::Market.writes_report());
        assert_eq!(Stage::PortfolioFinalization.report_kind(), None);
        assert!(!Stage::PortfolioFinalization.writes_report());
    }

    #[test]
    fn test_roles() {
        assert!(Stage::Neutral.is_debate_speaker());
        assert!(Stage::RiskJudge.is_judge());
        assert_eq!(Stage::Neutral.debate(), Some(DebateKind::Risk));
        assert_eq!(Stage::Market.debate(), None);
        assert!(Stage::SingleSubjectFinalization.is_terminal());
        assert!(!Stage::PortfolioOptimizer.is_terminal());
    }

    #[test]
    fn test_analyst_mapping() {
        for kind in ReportKind::ANALYSTS {
            let stage = Stage::analyst(kind).unwrap();
            assert_eq!(stage.report_kind(), Some(kind));
        }
        assert_eq!(Stage::analyst(ReportKind::RiskDecision), None);
    }
}
