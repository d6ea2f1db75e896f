//! Named tools and call resolution

use crate::tool::ToolSpec;
use crate::{Tool, ToolError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};
use tradegraph_core::{ToolCall, ToolOutput};

/// Tools available to stage handlers, keyed by name
///
/// Shared between concurrent runs, so registration goes through `&self`.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<BTreeMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name
    pub fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        let mut tools = self.tools.write().unwrap_or_else(PoisonError::into_inner);
        if tools.insert(name.clone(), tool).is_some() {
            warn!("Tool {} replaced", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Descriptors of every registered tool, ordered by name
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|tool| tool.spec())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_input(spec: &ToolSpec, input: &Value) -> Result<(), ToolError> {
        let Some(fields) = input.as_object() else {
            return Err(ToolError::InvalidInput {
                tool: spec.name.clone(),
                reason: "input must be a JSON object".to_string(),
            });
        };
        match spec.required().into_iter().find(|f| !fields.contains_key(*f)) {
            Some(missing) => Err(ToolError::InvalidInput {
                tool: spec.name.clone(),
                reason: format!("missing required field '{missing}'"),
            }),
            None => Ok(()),
        }
    }

    /// Resolve one call
    ///
    /// Never fails: an unknown tool, bad input or a failing tool all become
    /// an error output the requesting handler can read.
    pub async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(tool) = self.get(&call.name) else {
            warn!("Tool not found: {}", call.name);
            return ToolOutput::error(call, ToolError::NotFound(call.name.clone()).to_string());
        };

        if let Err(e) = Self::check_input(&tool.spec(), &call.input) {
            warn!("Rejected call {} to {}: {}", call.id, call.name, e);
            return ToolOutput::error(call, e.to_string());
        }

        info!("Calling tool {} ({})", call.name, call.id);
        match tool.execute(call.input.clone()).await {
            Ok(content) => {
                debug!("Tool {} returned", call.name);
                ToolOutput::success(call, content)
            }
            Err(e) => {
                warn!("Tool {} failed: {}", call.name, e);
                ToolOutput::error(call, e.to_string())
            }
        }
    }

    /// Resolve calls in request order
    pub async fn execute_all(&self, calls: &[ToolCall]) -> Vec<ToolOutput> {
        debug!("Resolving {} tool call(s)", calls.len());
        let mut outputs = Vec::with_capacity(calls.len());
        for call in calls {
            outputs.push(self.execute(call).await);
        }
        outputs
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tools = self.tools.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("ToolRegistry")
            .field("tools", &tools.keys().collect::<Vec<_>>())
            .finish()
    }
}
