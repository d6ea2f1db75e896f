//! Tool trait and descriptor

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a handler needs to know to request a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema of the call input; always an object schema
    pub input_schema: Value,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Property names the schema marks as required
    pub fn required(&self) -> Vec<&str> {
        self.input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|fields| fields.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// A data lookup a stage handler can request mid-stage
///
/// Tools are side-effect free from the workflow's point of view: their output
/// only reaches the requesting handler, never the state.
///
/// ```
/// use serde_json::json;
/// use tradegraph_tools::ToolSpec;
///
/// let spec = ToolSpec::new(
///     "quote",
///     "Last traded price for a ticker",
///     json!({
///         "type": "object",
///         "properties": { "symbol": { "type": "string" } },
///         "required": ["symbol"]
///     }),
/// );
/// assert_eq!(spec.required(), vec!["symbol"]);
/// ```
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name handlers put in a `ToolCall`; unique within a registry
    fn name(&self) -> &str;

    fn spec(&self) -> ToolSpec;

    /// Run one call
    ///
    /// The registry has already checked that `input` is an object carrying
    /// every required property.
    async fn execute(&self, input: Value) -> Result<Value>;
}
