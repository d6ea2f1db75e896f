//! Scripted stage handlers for tests

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tradegraph_core::{Result, StageHandler, StageInput, StageMessage, StageUpdate};

/// Returns the same update on every call and counts calls
#[derive(Debug)]
pub struct FixedHandler {
    update: StageUpdate,
    calls: AtomicUsize,
}

impl FixedHandler {
    pub fn new(update: StageUpdate) -> Self {
        Self {
            update,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StageHandler for FixedHandler {
    async fn handle(&self, _input: StageInput<'_>) -> Result<StageMessage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.update.clone().into())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// Delegates to a closure and counts calls
pub struct FnHandler<F> {
    f: F,
    calls: AtomicUsize,
}

impl<F> FnHandler<F>
where
    F: Fn(StageInput<'_>) -> Result<StageMessage> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<F> StageHandler for FnHandler<F>
where
    F: Fn(StageInput<'_>) -> Result<StageMessage> + Send + Sync,
{
    async fn handle(&self, input: StageInput<'_>) -> Result<StageMessage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.f)(input)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
