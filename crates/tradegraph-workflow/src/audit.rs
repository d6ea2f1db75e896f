//! Audit channel
//!
//! After every transition the orchestrator offers a [`TransitionRecord`] and
//! the merged state to an [`AuditRecorder`]. Recording is fire-and-forget:
//! records are handed to a background task, so a failing or stalled recorder
//! is logged and never affects routing.

use crate::debate::DebateRound;
use crate::dispatch::RouteDecision;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tradegraph_core::{Stage, WorkflowState};

/// One executed step and the routing decision that followed it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub run_id: String,
    /// 1-based orchestrator iteration
    pub step: u64,
    /// Subject the stage ran for; `None` for portfolio finalization
    pub subject: Option<String>,
    pub from: Stage,
    /// Last decision taken after the step; `None` once the run has ended
    pub decision: Option<RouteDecision>,
    /// Stage that runs next; `None` once the run has ended
    pub to: Option<Stage>,
    /// Whether the cursor moved to a new subject during routing
    pub advanced_subject: bool,
    /// Whether the handler failed or was forced complete
    pub degraded: bool,
    /// Debate position of `from`, if it is a debate stage
    pub debate_round: Option<DebateRound>,
    pub timestamp: DateTime<Utc>,
}

/// Receives every stage transition
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuditRecorder: Send + Sync {
    /// Record one transition
    async fn record(
        &self,
        record: &TransitionRecord,
        state: &WorkflowState,
    ) -> tradegraph_core::Result<()>;
}

/// Emits every transition as a structured tracing event
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingRecorder;

#[async_trait]
impl AuditRecorder for TracingRecorder {
    async fn record(
        &self,
        record: &TransitionRecord,
        state: &WorkflowState,
    ) -> tradegraph_core::Result<()> {
        info!(
            run_id = %record.run_id,
            step = record.step,
            subject = record.subject.as_deref().unwrap_or("-"),
            from = %record.from,
            to = record.to.map(Stage::name).unwrap_or("end"),
            advanced = record.advanced_subject,
            degraded = record.degraded,
            cursor = state.current_subject_index(),
            "Stage transition"
        );
        Ok(())
    }
}

/// Keeps every record in memory
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    records: Mutex<Vec<TransitionRecord>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far
    pub fn records(&self) -> Vec<TransitionRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditRecorder for MemoryRecorder {
    async fn record(
        &self,
        record: &TransitionRecord,
        _state: &WorkflowState,
    ) -> tradegraph_core::Result<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}

/// Feeds one run's records to a recorder on a background task
///
/// Records reach the recorder in the order they were sent.
pub(crate) struct AuditChannel {
    tx: mpsc::UnboundedSender<(TransitionRecord, WorkflowState)>,
    worker: JoinHandle<()>,
}

impl AuditChannel {
    pub(crate) fn spawn(recorder: Arc<dyn AuditRecorder>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<(TransitionRecord, WorkflowState)>();
        let worker = tokio::spawn(async move {
            while let Some((record, state)) = rx.recv().await {
                if let Err(e) = recorder.record(&record, &state).await {
                    warn!("Audit recorder failed at step {}: {}", record.step, e);
                }
            }
        });
        Self { tx, worker }
    }

    /// Queue a record without waiting for the recorder
    pub(crate) fn send(&self, record: TransitionRecord, state: &WorkflowState) {
        let step = record.step;
        if self.tx.send((record, state.clone())).is_err() {
            warn!("Audit worker has stopped; dropping record for step {}", step);
        }
    }

    /// Stop accepting records and give the recorder up to `grace` to drain
    ///
    /// Records still pending after `grace` are dropped.
    pub(crate) async fn close(self, grace: Duration) {
        let Self { tx, mut worker } = self;
        drop(tx);
        match tokio::time::timeout(grace, &mut worker).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Audit worker stopped abnormally: {}", e),
            Err(_) => {
                warn!("Audit recorder still busy after {:?}; dropping pending records", grace);
                worker.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(step: u64) -> TransitionRecord {
        TransitionRecord {
            run_id: "run-1".to_string(),
            step,
            subject: Some("AAPL".to_string()),
            from: Stage::Market,
            decision: Some(RouteDecision::ContinueStage(Stage::Fundamentals)),
            to: Some(Stage::Fundamentals),
            advanced_subject: false,
            degraded: false,
            debate_round: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_memory_recorder_keeps_order() {
        let recorder = MemoryRecorder::new();
        let state = WorkflowState::new(["AAPL"]).unwrap();
        assert!(recorder.is_empty());

        recorder.record(&sample(1), &state).await.unwrap();
        recorder.record(&sample(2), &state).await.unwrap();

        let steps: Vec<u64> = recorder.records().iter().map(|r| r.step).collect();
        assert_eq!(steps, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_tracing_recorder_never_fails() {
        let state = WorkflowState::new(["AAPL"]).unwrap();
        let mut record = sample(3);
        record.to = None;
        record.decision = None;
        assert!(TracingRecorder.record(&record, &state).await.is_ok());
    }

    struct Stalled;

    #[async_trait]
    impl AuditRecorder for Stalled {
        async fn record(
            &self,
            _record: &TransitionRecord,
            _state: &WorkflowState,
        ) -> tradegraph_core::Result<()> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_channel_drains_in_order() {
        let recorder = Arc::new(MemoryRecorder::new());
        let state = WorkflowState::new(["AAPL"]).unwrap();

        let channel = AuditChannel::spawn(recorder.clone());
        for step in 1..=3 {
            channel.send(sample(step), &state);
        }
        channel.close(Duration::from_secs(1)).await;

        let steps: Vec<u64> = recorder.records().iter().map(|r| r.step).collect();
        assert_eq!(steps, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_channel_close_is_bounded_by_grace() {
        let state = WorkflowState::new(["AAPL"]).unwrap();
        let channel = AuditChannel::spawn(Arc::new(Stalled));
        channel.send(sample(1), &state);
        channel.send(sample(2), &state);

        let closed = tokio::time::timeout(
            Duration::from_secs(2),
            channel.close(Duration::from_millis(20)),
        )
        .await;
        assert!(closed.is_ok());
    }

    #[test]
    fn test_record_serializes() {
        let json = serde_json::to_value(sample(1)).unwrap();
        assert_eq!(json["from"], "market");
        assert_eq!(json["to"], "fundamentals");
        assert_eq!(json["decision"]["decision"], "continue_stage");
    }
}
