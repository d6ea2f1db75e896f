//! Routing configuration

use crate::debate::Rotation;
use crate::{Result, WorkflowError};
use serde::{Deserialize, Serialize};
use std::num::{NonZeroU32, NonZeroU64};
use std::time::Duration;
use tracing::debug;
use tradegraph_core::{DebateKind, ReportKind, Stage};
use tradegraph_utils::{env_flag, env_positive};

/// Number of steps outside the per-subject pipeline (the terminal stage)
const TERMINAL_STEPS: u64 = 1;

/// Which rotation the risk debate uses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskRotation {
    /// Aggressive, conservative, judge
    #[default]
    Canonical,
    /// Aggressive, conservative, neutral, judge
    WithNeutral,
}

/// Parameters of the routing policy
///
/// Counts are non-zero by construction. Use [`RoutingConfig::builder`] to
/// build one from untrusted integers: non-positive values are rejected, never
/// clamped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Full bull/bear/manager cycles per subject
    pub max_investment_rounds: NonZeroU32,

    /// Full risk debate cycles per subject
    pub max_risk_rounds: NonZeroU32,

    /// Hard ceiling on orchestrator iterations
    pub cycle_guard_limit: NonZeroU64,

    /// Consecutive invocations of one non-debate stage before it is forced
    pub max_stage_attempts: NonZeroU32,

    /// Tool round trips allowed within a single stage invocation
    pub max_tool_rounds: u32,

    pub risk_rotation: RiskRotation,

    /// Analyst stages to run, in pipeline order
    pub analysts: Vec<ReportKind>,

    /// Optional wall-clock budget for a run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<Duration>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            max_investment_rounds: NonZeroU32::MIN,
            max_risk_rounds: NonZeroU32::MIN,
            cycle_guard_limit: NonZeroU64::new(500).unwrap_or(NonZeroU64::MIN),
            max_stage_attempts: NonZeroU32::new(3).unwrap_or(NonZeroU32::MIN),
            max_tool_rounds: 4,
            risk_rotation: RiskRotation::Canonical,
            analysts: ReportKind::ANALYSTS.to_vec(),
            deadline: None,
        }
    }
}

impl RoutingConfig {
    /// Create a new configuration builder
    pub fn builder() -> RoutingConfigBuilder {
        RoutingConfigBuilder::default()
    }

    /// Default configuration overridden by `TRADEGRAPH_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::builder().with_env()?.build()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.analysts.is_empty() {
            return Err(WorkflowError::Configuration(
                "at least one analyst must be selected".to_string(),
            ));
        }

        for (i, kind) in self.analysts.iter().enumerate() {
            if !kind.is_analyst() {
                return Err(WorkflowError::Configuration(format!(
                    "{kind} is not an analyst report"
                )));
            }
            if self.analysts[..i].contains(kind) {
                return Err(WorkflowError::Configuration(format!(
                    "analyst {kind} selected twice"
                )));
            }
        }

        Ok(())
    }

    /// The rotation a debate uses
    pub fn rotation(&self, debate: DebateKind) -> Rotation {
        match (debate, self.risk_rotation) {
            (DebateKind::Investment, _) => Rotation::investment(),
            (DebateKind::Risk, RiskRotation::Canonical) => Rotation::risk(),
            (DebateKind::Risk, RiskRotation::WithNeutral) => Rotation::risk_with_neutral(),
        }
    }

    /// Configured cycles for a debate
    pub fn max_rounds(&self, debate: DebateKind) -> NonZeroU32 {
        match debate {
            DebateKind::Investment => self.max_investment_rounds,
            DebateKind::Risk => self.max_risk_rounds,
        }
    }

    /// Stages a subject passes through, in pipeline order
    pub fn pipeline(&self) -> Vec<Stage> {
        let mut stages: Vec<Stage> = self
            .analysts
            .iter()
            .filter_map(|kind| Stage::analyst(*kind))
            .collect();
        stages.extend(self.rotation(DebateKind::Investment).stages());
        stages.extend(self.rotation(DebateKind::Risk).stages());
        stages.push(Stage::PortfolioOptimizer);
        stages
    }

    /// Every stage that needs a handler for a run over `subject_count` subjects
    pub fn required_stages(&self, subject_count: usize) -> Vec<Stage> {
        let mut stages = self.pipeline();
        stages.push(if subject_count > 1 {
            Stage::PortfolioFinalization
        } else {
            Stage::SingleSubjectFinalization
        });
        stages
    }

    /// Replace the step ceiling, keeping every routing parameter
    ///
    /// # Errors
    ///
    /// Rejects a non-positive limit, like the builder does.
    pub fn with_cycle_guard_limit(mut self, limit: i64) -> Result<Self> {
        self.cycle_guard_limit =
            positive_u64("cycle_guard_limit", Some(limit), self.cycle_guard_limit)?;
        Ok(self)
    }

    /// Upper bound on orchestrator iterations for a run over `subject_count`
    /// subjects, counting every non-debate stage at its stall bound
    pub fn worst_case_steps(&self, subject_count: usize) -> u64 {
        let attempts = u64::from(self.max_stage_attempts.get());
        let single_stages = self.analysts.len() as u64 + 1;
        let debates: u64 = [DebateKind::Investment, DebateKind::Risk]
            .into_iter()
            .map(|d| self.rotation(d).budget(self.max_rounds(d)))
            .sum();

        let per_subject = single_stages * attempts + debates;
        (subject_count as u64)
            .saturating_mul(per_subject)
            .saturating_add(TERMINAL_STEPS)
    }
}

/// Builder for RoutingConfig
#[derive(Debug, Default)]
pub struct RoutingConfigBuilder {
    max_investment_rounds: Option<i64>,
    max_risk_rounds: Option<i64>,
    cycle_guard_limit: Option<i64>,
    max_stage_attempts: Option<i64>,
    max_tool_rounds: Option<u32>,
    risk_rotation: Option<RiskRotation>,
    analysts: Option<Vec<ReportKind>>,
    deadline: Option<Duration>,
}

impl RoutingConfigBuilder {
    /// Set the investment debate cycles
    pub fn max_investment_rounds(mut self, rounds: i64) -> Self {
        self.max_investment_rounds = Some(rounds);
        self
    }

    /// Set the risk debate cycles
    pub fn max_risk_rounds(mut self, rounds: i64) -> Self {
        self.max_risk_rounds = Some(rounds);
        self
    }

    /// Set the hard step ceiling
    pub fn cycle_guard_limit(mut self, limit: i64) -> Self {
        self.cycle_guard_limit = Some(limit);
        self
    }

    /// Set the per-stage stall bound
    pub fn max_stage_attempts(mut self, attempts: i64) -> Self {
        self.max_stage_attempts = Some(attempts);
        self
    }

    /// Set the tool round trips allowed per invocation
    pub fn max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = Some(rounds);
        self
    }

    /// Select the risk debate rotation
    pub fn risk_rotation(mut self, rotation: RiskRotation) -> Self {
        self.risk_rotation = Some(rotation);
        self
    }

    /// Select the analysts to run; order is normalised to pipeline order
    pub fn analysts(mut self, analysts: impl IntoIterator<Item = ReportKind>) -> Self {
        self.analysts = Some(analysts.into_iter().collect());
        self
    }

    /// Set a wall-clock budget
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Override values from `TRADEGRAPH_*` environment variables
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a count is not a positive integer or
    /// `TRADEGRAPH_RISK_NEUTRAL` is not a boolean.
    pub fn with_env(mut self) -> Result<Self> {
        if let Some(v) = env_positive("TRADEGRAPH_MAX_DEBATE_ROUNDS")? {
            self.max_investment_rounds = Some(v);
        }
        if let Some(v) = env_positive("TRADEGRAPH_MAX_RISK_ROUNDS")? {
            self.max_risk_rounds = Some(v);
        }
        if let Some(v) = env_positive("TRADEGRAPH_RECURSION_LIMIT")? {
            self.cycle_guard_limit = Some(v);
        }
        if let Some(v) = env_positive("TRADEGRAPH_MAX_STAGE_ATTEMPTS")? {
            self.max_stage_attempts = Some(v);
        }
        if let Some(neutral) = env_flag("TRADEGRAPH_RISK_NEUTRAL")? {
            self.risk_rotation = Some(if neutral {
                RiskRotation::WithNeutral
            } else {
                RiskRotation::Canonical
            });
        }
        Ok(self)
    }

    /// Build the configuration
    pub fn build(self) -> Result<RoutingConfig> {
        let defaults = RoutingConfig::default();

        let analysts = self.analysts.map_or(defaults.analysts, |selected| {
            let ordered: Vec<ReportKind> = ReportKind::ANALYSTS
                .into_iter()
                .filter(|kind| selected.contains(kind))
                .collect();
            // Reorder only when nothing is lost; validate() reports the rest
            if ordered.len() == selected.len() {
                ordered
            } else {
                selected
            }
        });

        let config = RoutingConfig {
            max_investment_rounds: positive_u32(
                "max_investment_rounds",
                self.max_investment_rounds,
                defaults.max_investment_rounds,
            )?,
            max_risk_rounds: positive_u32(
                "max_risk_rounds",
                self.max_risk_rounds,
                defaults.max_risk_rounds,
            )?,
            cycle_guard_limit: positive_u64(
                "cycle_guard_limit",
                self.cycle_guard_limit,
                defaults.cycle_guard_limit,
            )?,
            max_stage_attempts: positive_u32(
                "max_stage_attempts",
                self.max_stage_attempts,
                defaults.max_stage_attempts,
            )?,
            max_tool_rounds: self.max_tool_rounds.unwrap_or(defaults.max_tool_rounds),
            risk_rotation: self.risk_rotation.unwrap_or(defaults.risk_rotation),
            analysts,
            deadline: self.deadline,
        };

        config.validate()?;
        debug!("Routing config: {:?}", config);
        Ok(config)
    }
}

fn positive_u32(name: &str, value: Option<i64>, default: NonZeroU32) -> Result<NonZeroU32> {
    let Some(value) = value else {
        return Ok(default);
    };
    u32::try_from(value)
        .ok()
        .and_then(NonZeroU32::new)
        .ok_or_else(|| WorkflowError::Configuration(format!("{name} must be >= 1, got {value}")))
}

fn positive_u64(name: &str, value: Option<i64>, default: NonZeroU64) -> Result<NonZeroU64> {
    let Some(value) = value else {
        return Ok(default);
    };
    u64::try_from(value)
        .ok()
        .and_then(NonZeroU64::new)
        .ok_or_else(|| WorkflowError::Configuration(format!("{name} must be >= 1, got {value}")))
}
