//! Batch runner
//!
//! Runs each subject as an independent single-subject workflow on its own
//! tokio task. Runs share no mutable state; results are collected once every
//! worker has finished and are returned in input order.
//!
//! With checkpointing on, worker `i` on subject `S` writes `<stem>-<i>-<S>`
//! next to the configured path.

use crate::orchestrator::Orchestrator;
use crate::outcome::RunReport;
use crate::{Result, WorkflowError};
use futures::future::join_all;
use tracing::{info, warn};
use tradegraph_core::WorkflowState;

/// Result of one worker
#[derive(Debug)]
pub struct BatchResult {
    pub subject: String,
    pub result: Result<RunReport>,
}

/// Run every subject independently
///
/// A failing worker only affects its own entry.
pub async fn run_batch<I, S>(
    orchestrator: &Orchestrator,
    subjects: I,
    trade_date: Option<&str>,
) -> Vec<BatchResult>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let subjects: Vec<String> = subjects.into_iter().map(Into::into).collect();
    info!("Starting batch of {} independent run(s)", subjects.len());

    let handles = subjects.iter().enumerate().map(|(index, subject)| {
        let orchestrator = orchestrator.for_batch_worker(index, subject);
        let subject = subject.clone();
        let trade_date = trade_date.map(str::to_string);
        tokio::spawn(async move {
            let mut state = WorkflowState::new([subject])?;
            if let Some(date) = trade_date {
                state = state.with_trade_date(date);
            }
            orchestrator.run(state).await
        })
    });

    let joined = join_all(handles).await;

    subjects
        .into_iter()
        .zip(joined)
        .map(|(subject, joined)| {
            let result = joined.unwrap_or_else(|e| {
                warn!("Batch worker for {} did not finish: {}", subject, e);
                Err(WorkflowError::Worker {
                    subject: subject.clone(),
                    reason: e.to_string(),
                })
            });
            BatchResult { subject, result }
        })
        .collect()
}
