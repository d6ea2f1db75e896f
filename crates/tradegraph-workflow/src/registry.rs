//! Stage handler registry

use crate::config::RoutingConfig;
use crate::{Result, WorkflowError};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use tradegraph_core::{Stage, StageHandler};

/// Maps each stage to the handler that runs it
#[derive(Clone, Default)]
pub struct StageRegistry {
    handlers: HashMap<Stage, Arc<dyn StageHandler>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous handler for the stage
    pub fn register(&mut self, stage: Stage, handler: Arc<dyn StageHandler>) {
        debug!("Registering handler '{}' for {}", handler.name(), stage);
        self.handlers.insert(stage, handler);
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(mut self, stage: Stage, handler: Arc<dyn StageHandler>) -> Self {
        self.register(stage, handler);
        self
    }

    /// Get the handler for a stage
    pub fn get(&self, stage: Stage) -> Result<Arc<dyn StageHandler>> {
        self.handlers
            .get(&stage)
            .cloned()
            .ok_or(WorkflowError::MissingHandler(stage))
    }

    pub fn contains(&self, stage: Stage) -> bool {
        self.handlers.contains_key(&stage)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Check that every stage a run over `subject_count` subjects can reach
    /// has a handler
    pub fn validate(&self, config: &RoutingConfig, subject_count: usize) -> Result<()> {
        config
            .required_stages(subject_count)
            .into_iter()
            .find(|stage| !self.contains(*stage))
            .map_or(Ok(()), |stage| Err(WorkflowError::MissingHandler(stage)))
    }
}

impl std::fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut stages: Vec<&Stage> = self.handlers.keys().collect();
        stages.sort();
        f.debug_struct("StageRegistry")
            .field("stages", &stages)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::template_registry;
    use crate::testing::FixedHandler;
    use tradegraph_core::StageUpdate;

    #[test]
    fn test_register_and_get() {
        let mut registry = StageRegistry::new();
        assert!(registry.is_empty());

        registry.register(
            Stage::Market,
            Arc::new(FixedHandler::new(StageUpdate::report("ok"))),
        );
        assert_eq!(registry.len(), 1);
        assert!(registry.get(Stage::Market).is_ok());
        assert!(matches!(
            registry.get(Stage::Bull),
            Err(WorkflowError::MissingHandler(Stage::Bull))
        ));
    }

    #[test]
    fn test_validate_reports_first_missing_stage() {
        let config = RoutingConfig::default();
        let registry = StageRegistry::new().with(
            Stage::Market,
            Arc::new(FixedHandler::new(StageUpdate::report("ok"))),
        );
        assert!(matches!(
            registry.validate(&config, 1),
            Err(WorkflowError::MissingHandler(Stage::Fundamentals))
        ));
    }

    #[test]
    fn test_validate_terminal_depends_on_subject_count() {
        let config = RoutingConfig::default();
        let mut registry = template_registry();
        assert!(registry.validate(&config, 1).is_ok());
        assert!(registry.validate(&config, 2).is_ok());

        registry.handlers.remove(&Stage::PortfolioFinalization);
        assert!(registry.validate(&config, 1).is_ok());
        assert!(matches!(
            registry.validate(&config, 2),
            Err(WorkflowError::MissingHandler(Stage::PortfolioFinalization))
        ));
    }
}
