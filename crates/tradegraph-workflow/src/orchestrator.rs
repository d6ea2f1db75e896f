//! Orchestrator
//!
//! The driver loop of a run:
//! 1. Invoke the handler of the current node with the current state
//! 2. Merge the returned update into the state
//! 3. Ask the routing policy for the next node (applying subject advances)
//! 4. Stop at a terminal stage, at the cycle guard or at the deadline
//!
//! The orchestrator is the only writer of the [`WorkflowState`]. Audit
//! records leave through a background channel and never hold up a step.

use crate::audit::{AuditChannel, AuditRecorder, TracingRecorder, TransitionRecord};
use crate::checkpoint::WorkflowSnapshot;
use crate::completion::is_complete;
use crate::config::RoutingConfig;
use crate::debate::DebateRound;
use crate::dispatch::{self, Next, PipelinePolicy, RouteDecision, RoutingPolicy};
use crate::guard::{CycleGuard, GuardStatus};
use crate::outcome::{Outcome, RunReport, TraceEntry};
use crate::registry::StageRegistry;
use crate::{Result, WorkflowError};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tradegraph_core::{
    DebateEntry, Stage, StageHandler, StageInput, StageMessage, StageUpdate, ToolOutput,
    WorkflowState,
};
use tradegraph_tools::ToolRegistry;

/// A node the orchestrator can stand on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    Stage(Stage),
    Terminal(Stage),
}

impl Node {
    fn stage(self) -> Stage {
        match self {
            Self::Stage(stage) | Self::Terminal(stage) => stage,
        }
    }
}

/// Result of asking the policy where to go
#[derive(Debug, Clone, Copy)]
struct Routed {
    node: Node,
    decision: RouteDecision,
    advanced_subject: bool,
}

/// Consecutive invocations of one (subject, stage) pair
#[derive(Debug, Default)]
struct Streak {
    key: Option<(String, Stage)>,
    count: u32,
}

impl Streak {
    fn bump(&mut self, subject: &str, stage: Stage) -> u32 {
        let same = self
            .key
            .as_ref()
            .is_some_and(|(s, st)| s == subject && *st == stage);
        if same {
            self.count = self.count.saturating_add(1);
        } else {
            self.key = Some((subject.to_string(), stage));
            self.count = 1;
        }
        self.count
    }
}

/// How long a finished run waits for its audit records to drain
const DEFAULT_AUDIT_GRACE: Duration = Duration::from_secs(1);

/// What one invocation did to the state
#[derive(Debug, Clone, Copy, Default)]
struct StepEffect {
    degraded: bool,
    debate_round: Option<DebateRound>,
}

/// Drives runs over a fixed configuration, handler set and policy
#[derive(Clone)]
pub struct Orchestrator {
    config: Arc<RoutingConfig>,
    handlers: StageRegistry,
    tools: Arc<ToolRegistry>,
    policy: Arc<dyn RoutingPolicy>,
    /// Whether `policy` is the pipeline policy over `config`
    default_policy: bool,
    recorder: Arc<dyn AuditRecorder>,
    audit_grace: Duration,
    checkpoint_path: Option<PathBuf>,
}

impl Orchestrator {
    /// Create a new orchestrator builder
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    pub fn handlers(&self) -> &StageRegistry {
        &self.handlers
    }

    /// Run a fresh state to completion
    ///
    /// # Arguments
    ///
    /// * `state` - State with the subject list populated
    ///
    /// # Returns
    ///
    /// A report whose `outcome` tells a completed run from one stopped by
    /// the cycle guard or the deadline. `Err` is reserved for configuration
    /// problems such as a missing handler.
    pub async fn run(&self, state: WorkflowState) -> Result<RunReport> {
        let run_id = uuid::Uuid::new_v4().to_string();
        self.drive(run_id, state, None, 0).await
    }

    /// Continue a run from a snapshot
    ///
    /// Routing follows the configuration stored in the snapshot so the run
    /// keeps its round limits, rotation and analyst selection. The step
    /// ceiling and deadline are this orchestrator's.
    pub async fn resume(&self, snapshot: WorkflowSnapshot) -> Result<RunReport> {
        let WorkflowSnapshot {
            run_id,
            state,
            config,
            current_stage,
            steps,
            ..
        } = snapshot;
        info!(
            "Resuming run {} at step {} ({})",
            run_id,
            steps,
            current_stage.map_or("routing", Stage::name)
        );

        let config = RoutingConfig {
            cycle_guard_limit: self.config.cycle_guard_limit,
            deadline: self.config.deadline,
            ..config
        };
        config.validate()?;
        if config != *self.config {
            debug!("Run {} resumes with its stored routing configuration", run_id);
        }

        self.reconfigured(config)
            .drive(run_id, state, current_stage, steps)
            .await
    }

    /// The same orchestrator over another configuration
    fn reconfigured(&self, config: RoutingConfig) -> Self {
        let config = Arc::new(config);
        let policy: Arc<dyn RoutingPolicy> = if self.default_policy {
            Arc::new(PipelinePolicy::new(Arc::clone(&config)))
        } else {
            Arc::clone(&self.policy)
        };
        Self {
            config,
            policy,
            ..self.clone()
        }
    }

    /// A copy for one batch worker, checkpointing to its own file
    pub(crate) fn for_batch_worker(&self, index: usize, subject: &str) -> Self {
        let mut worker = self.clone();
        worker.checkpoint_path = self
            .checkpoint_path
            .as_deref()
            .map(|path| worker_checkpoint_path(path, index, subject));
        worker
    }

    async fn drive(
        &self,
        run_id: String,
        state: WorkflowState,
        start: Option<Stage>,
        steps: u64,
    ) -> Result<RunReport> {
        let audit = AuditChannel::spawn(Arc::clone(&self.recorder));
        let report = self.drive_steps(run_id, state, start, steps, &audit).await;
        audit.close(self.audit_grace).await;
        report
    }

    async fn drive_steps(
        &self,
        run_id: String,
        mut state: WorkflowState,
        start: Option<Stage>,
        steps: u64,
        audit: &AuditChannel,
    ) -> Result<RunReport> {
        if state.workflow_complete() {
            return Err(WorkflowError::Checkpoint(format!(
                "run {run_id} already completed"
            )));
        }

        let subject_count = state.subjects().len();
        self.handlers.validate(&self.config, subject_count)?;

        let limit = self.config.cycle_guard_limit;
        let worst_case = self.config.worst_case_steps(subject_count);
        if worst_case >= limit.get() {
            warn!(
                "Cycle guard limit {} leaves no headroom over the worst case of {} steps for {} subject(s)",
                limit, worst_case, subject_count
            );
        }

        info!(
            "Starting run {} for {} subject(s): {}",
            run_id,
            subject_count,
            state.subjects().join(", ")
        );

        let mut guard = CycleGuard::resume(limit, steps);
        let mut trace = Vec::new();
        let mut streak = Streak::default();
        let started = Instant::now();

        let mut node = match start {
            Some(stage) if stage.is_terminal() => Node::Terminal(stage),
            Some(stage) if !state.all_subjects_done() => Node::Stage(stage),
            _ => self.route(&mut state, None)?.node,
        };

        loop {
            if let Some(deadline) = self.config.deadline {
                if started.elapsed() >= deadline {
                    warn!(
                        "Run {} passed its deadline of {:?} after {} steps",
                        run_id,
                        deadline,
                        guard.steps()
                    );
                    return Ok(RunReport {
                        run_id,
                        state,
                        outcome: Outcome::DeadlineExceeded { deadline },
                        steps: guard.steps(),
                        trace,
                        next_stage: Some(node.stage()),
                    });
                }
            }

            if guard.tick() == GuardStatus::AbortedRecursionLimit {
                error!(
                    "Recursion limit of {} steps reached at {} for {}",
                    limit,
                    node.stage(),
                    state.current_subject().unwrap_or("portfolio")
                );
                return Ok(RunReport {
                    run_id,
                    state,
                    outcome: Outcome::RecursionLimitExceeded { limit: limit.get() },
                    steps: guard.steps(),
                    trace,
                    next_stage: Some(node.stage()),
                });
            }
            let step = guard.steps();

            match node {
                Node::Terminal(stage) => {
                    let subject = match stage {
                        Stage::SingleSubjectFinalization => state.subjects().first().cloned(),
                        _ => None,
                    };
                    info!("Step {}: {}", step, stage);

                    let effect = self.execute(&mut state, stage, subject.as_deref(), 1).await?;
                    state.mark_workflow_complete()?;
                    self.checkpoint(&run_id, &state, None, step).await;
                    trace.push(TraceEntry {
                        subject: subject.clone(),
                        stage,
                    });

                    let record = TransitionRecord {
                        run_id: run_id.clone(),
                        step,
                        subject,
                        from: stage,
                        decision: None,
                        to: None,
                        advanced_subject: false,
                        degraded: effect.degraded,
                        debate_round: None,
                        timestamp: Utc::now(),
                    };
                    audit.send(record, &state);

                    info!("Run {} completed in {} steps", run_id, step);
                    return Ok(RunReport {
                        run_id,
                        state,
                        outcome: Outcome::Completed,
                        steps: step,
                        trace,
                        next_stage: None,
                    });
                }
                Node::Stage(stage) => {
                    let subject = state.current_subject().map(str::to_string).ok_or_else(|| {
                        WorkflowError::RoutingInvariant(format!(
                            "{stage} scheduled with no subject under the cursor"
                        ))
                    })?;
                    let attempt = streak.bump(&subject, stage);
                    info!(subject = %subject, step, "Step {}: {} (attempt {})", step, stage, attempt);

                    let effect = self
                        .execute(&mut state, stage, Some(&subject), attempt)
                        .await?;
                    trace.push(TraceEntry {
                        subject: Some(subject.clone()),
                        stage,
                    });

                    let routed = self.route(&mut state, Some(stage))?;
                    let record = TransitionRecord {
                        run_id: run_id.clone(),
                        step,
                        subject: Some(subject),
                        from: stage,
                        decision: Some(routed.decision),
                        to: Some(routed.node.stage()),
                        advanced_subject: routed.advanced_subject,
                        degraded: effect.degraded,
                        debate_round: effect.debate_round,
                        timestamp: Utc::now(),
                    };
                    audit.send(record, &state);

                    node = routed.node;
                    self.checkpoint(&run_id, &state, Some(node.stage()), guard.steps())
                        .await;
                }
            }
        }
    }

    /// Ask the policy for the next node, applying subject advances
    ///
    /// Each advance moves the cursor forward and [`dispatch::resolve`]
    /// refuses to advance from the last subject, so this loops at most once
    /// per subject.
    fn route(&self, state: &mut WorkflowState, current: Option<Stage>) -> Result<Routed> {
        let mut current = current;
        let mut advanced_subject = false;

        loop {
            let decision = self.policy.route(state, current);
            debug!("Routing decision after {:?}: {:?}", current, decision);

            match dispatch::resolve(state, current, decision) {
                Ok(Next::Stage(stage)) => {
                    return Ok(Routed {
                        node: Node::Stage(stage),
                        decision,
                        advanced_subject,
                    });
                }
                Ok(Next::AdvanceSubject) => {
                    state.advance_subject()?;
                    info!(
                        "Advancing to subject {} ({}/{})",
                        state.current_subject().unwrap_or_default(),
                        state.current_subject_index() + 1,
                        state.subjects().len()
                    );
                    advanced_subject = true;
                    current = None;
                }
                Ok(Next::Terminal(stage)) => {
                    state.finish_subjects();
                    return Ok(Routed {
                        node: Node::Terminal(stage),
                        decision,
                        advanced_subject,
                    });
                }
                Err(e) => {
                    error!("{}; finalizing", e);
                    let skipped = state.abandon_remaining_subjects();
                    if skipped > 0 {
                        warn!("Finalizing with {} subject(s) never analysed", skipped);
                    }
                    return Ok(Routed {
                        node: Node::Terminal(dispatch::terminal_stage(state)),
                        decision: RouteDecision::Finalize,
                        advanced_subject,
                    });
                }
            }
        }
    }

    /// Invoke one stage, merge its update and apply debate and stall
    /// accounting
    async fn execute(
        &self,
        state: &mut WorkflowState,
        stage: Stage,
        subject: Option<&str>,
        attempt: u32,
    ) -> Result<StepEffect> {
        let handler = self.handlers.get(stage)?;

        let update = match self
            .invoke(handler.as_ref(), state, stage, subject, attempt)
            .await
        {
            Ok(update) => update,
            Err(e) => {
                warn!(
                    "Handler '{}' for {} failed on {}: {}",
                    handler.name(),
                    stage,
                    subject.unwrap_or("portfolio"),
                    e
                );
                StageUpdate::failed(e.to_string())
            }
        };

        let mut effect = StepEffect {
            degraded: self.merge(state, stage, subject, update)?,
            debate_round: None,
        };

        let (Some(subject), Some(kind)) = (subject, stage.report_kind()) else {
            return Ok(effect);
        };

        if let Some(debate) = stage.debate() {
            let rotation = self.config.rotation(debate);
            let max_rounds = self.config.max_rounds(debate);
            let counters = state.counters_mut(subject)?;
            effect.debate_round = Some(rotation.round(counters.get(debate), max_rounds));
            let round = counters.advance(debate);

            let progress = state.subject_mut(subject)?;
            if rotation.is_exhausted(round, max_rounds) && !progress.reports.is_produced(kind) {
                warn!(
                    "{} debate for {} ended without a decision",
                    debate, subject
                );
                progress.mark_degraded(kind);
                effect.degraded = true;
            }
        } else if attempt >= self.config.max_stage_attempts.get() {
            let progress = state.subject_mut(subject)?;
            if !is_complete(progress, kind) {
                warn!(
                    "{} made no progress on {} after {} attempts; forcing completion",
                    stage, subject, attempt
                );
                progress.mark_complete(kind);
                progress.mark_degraded(kind);
                effect.degraded = true;
            }
        }

        Ok(effect)
    }

    /// Call a handler, serving its tool requests until it returns a report
    async fn invoke(
        &self,
        handler: &dyn StageHandler,
        state: &WorkflowState,
        stage: Stage,
        subject: Option<&str>,
        attempt: u32,
    ) -> tradegraph_core::Result<StageUpdate> {
        let mut outputs: Vec<ToolOutput> = Vec::new();
        let mut tool_rounds = 0;

        loop {
            let input = StageInput {
                state,
                stage,
                subject,
                tool_outputs: &outputs,
                attempt,
            };

            match handler.handle(input).await? {
                StageMessage::PlainReport(update) => return Ok(update),
                StageMessage::ToolRequest { calls } => {
                    if tool_rounds >= self.config.max_tool_rounds {
                        return Err(tradegraph_core::Error::handler(
                            stage,
                            format!(
                                "still requesting tools after {} rounds",
                                self.config.max_tool_rounds
                            ),
                        ));
                    }
                    tool_rounds += 1;
                    debug!(
                        "{} requested {} tool call(s), round {}",
                        stage,
                        calls.len(),
                        tool_rounds
                    );
                    let results = self.tools.execute_all(&calls).await;
                    outputs.extend(results);
                }
            }
        }
    }

    /// Apply an update inside the invoking stage's namespace
    ///
    /// Returns whether the handler reported a failure.
    fn merge(
        &self,
        state: &mut WorkflowState,
        stage: Stage,
        subject: Option<&str>,
        update: StageUpdate,
    ) -> Result<bool> {
        let StageUpdate {
            report,
            argument,
            stage_complete,
            error,
            final_report,
        } = update;
        let failed = error.is_some();
        if let Some(message) = &error {
            warn!("{} reported failure: {}", stage, message);
        }

        if stage.is_terminal() {
            if let Some(text) = final_report {
                state.final_report = text;
            }
            if report.is_some() || argument.is_some() {
                warn!("{} may only write the final report; dropping other fields", stage);
            }
            return Ok(failed);
        }

        let (Some(subject), Some(kind)) = (subject, stage.report_kind()) else {
            return Err(WorkflowError::RoutingInvariant(format!(
                "{stage} ran without a subject"
            )));
        };

        let round = stage
            .debate()
            .map(|debate| state.counters(subject).get(debate));
        let progress = state.subject_mut(subject)?;

        if let Some(text) = report {
            if stage.writes_report() {
                progress.reports.set(kind, text);
            } else {
                warn!("{} cannot write the {} report; dropping it", stage, kind);
            }
        }

        if let Some(text) = argument {
            match (stage.debate(), round) {
                (Some(debate), Some(round)) => {
                    progress.push_argument(debate, DebateEntry { round, stage, text });
                }
                _ => warn!("{} is not a debate stage; dropping its argument", stage),
            }
        }

        if final_report.is_some() {
            warn!("{} cannot write the final report; dropping it", stage);
        }

        if failed {
            progress.mark_degraded(kind);
            if !stage.is_debate_speaker() {
                progress.mark_complete(kind);
            }
        } else if stage_complete == Some(true) {
            progress.mark_complete(kind);
            if !progress.reports.is_produced(kind) {
                debug!("{} asserted completion of {} without text", stage, kind);
                progress.mark_degraded(kind);
            }
        }

        Ok(failed)
    }

    /// Save a snapshot; `next` is `None` once the run has completed
    async fn checkpoint(
        &self,
        run_id: &str,
        state: &WorkflowState,
        next: Option<Stage>,
        steps: u64,
    ) {
        let Some(path) = &self.checkpoint_path else {
            return;
        };
        let snapshot =
            WorkflowSnapshot::new(run_id, state.clone(), (*self.config).clone(), next, steps);
        if let Err(e) = snapshot.save(path).await {
            warn!("Failed to write checkpoint {}: {}", path.display(), e);
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("handlers", &self.handlers)
            .field("tools", &self.tools.len())
            .field("checkpoint_path", &self.checkpoint_path)
            .finish_non_exhaustive()
    }
}

/// `run.json` becomes `run-<index>-<subject>.json`
fn worker_checkpoint_path(path: &Path, index: usize, subject: &str) -> PathBuf {
    let subject: String = subject
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = path
        .file_stem()
        .map_or_else(|| "checkpoint".to_string(), |s| s.to_string_lossy().into_owned());
    let name = match path.extension() {
        Some(ext) => format!("{stem}-{index}-{subject}.{}", ext.to_string_lossy()),
        None => format!("{stem}-{index}-{subject}"),
    };
    path.with_file_name(name)
}

/// Builder for Orchestrator
#[derive(Default)]
pub struct OrchestratorBuilder {
    config: Option<RoutingConfig>,
    handlers: StageRegistry,
    tools: Option<Arc<ToolRegistry>>,
    policy: Option<Arc<dyn RoutingPolicy>>,
    recorder: Option<Arc<dyn AuditRecorder>>,
    audit_grace: Option<Duration>,
    checkpoint_path: Option<PathBuf>,
}

impl OrchestratorBuilder {
    /// Set the routing configuration
    pub fn config(mut self, config: RoutingConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the stage handlers
    pub fn handlers(mut self, handlers: StageRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    /// Register one stage handler
    pub fn handler(mut self, stage: Stage, handler: Arc<dyn StageHandler>) -> Self {
        self.handlers.register(stage, handler);
        self
    }

    /// Set the tools stage handlers may request
    pub fn tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Replace the default pipeline policy
    pub fn policy(mut self, policy: Arc<dyn RoutingPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Set the audit recorder
    pub fn recorder(mut self, recorder: Arc<dyn AuditRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// How long a finished run waits for pending audit records
    pub fn audit_grace(mut self, grace: Duration) -> Self {
        self.audit_grace = Some(grace);
        self
    }

    /// Save a snapshot to `path` after every step
    pub fn checkpoint_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint_path = Some(path.into());
        self
    }

    /// Build the orchestrator
    pub fn build(self) -> Result<Orchestrator> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let config = Arc::new(config);

        let default_policy = self.policy.is_none();
        let policy = self
            .policy
            .unwrap_or_else(|| Arc::new(PipelinePolicy::new(Arc::clone(&config))));

        Ok(Orchestrator {
            config,
            handlers: self.handlers,
            tools: self.tools.unwrap_or_default(),
            policy,
            default_policy,
            recorder: self.recorder.unwrap_or_else(|| Arc::new(TracingRecorder)),
            audit_grace: self.audit_grace.unwrap_or(DEFAULT_AUDIT_GRACE),
            checkpoint_path: self.checkpoint_path,
        })
    }
}
