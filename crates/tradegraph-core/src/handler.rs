//! Stage handler trait and the messages handlers exchange with the orchestrator

use crate::stage::Stage;
use crate::state::{SubjectState, WorkflowState};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool invocation requested by a stage handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlates the call with its output
    pub id: String,
    /// Registered tool name
    pub name: String,
    /// Tool input (should match the tool's input schema)
    pub input: Value,
}

impl ToolCall {
    /// Create a new tool call
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

/// Result of one tool call, handed back to the requesting handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub id: String,
    pub name: String,
    pub content: Value,
    /// Set when the tool failed; `content` then holds the error text
    pub is_error: bool,
}

impl ToolOutput {
    /// Successful tool output
    pub fn success(call: &ToolCall, content: Value) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            content,
            is_error: false,
        }
    }

    /// Failed tool output
    pub fn error(call: &ToolCall, message: impl Into<String>) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            content: Value::String(message.into()),
            is_error: true,
        }
    }
}

/// Sparse state change returned by a stage handler
///
/// Omitted fields leave the state unchanged. `report` always targets the
/// invoking stage's own report, so a handler cannot write outside its
/// namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageUpdate {
    /// Replacement text for the stage's report
    pub report: Option<String>,
    /// Debate argument appended to the transcript (debate stages only)
    pub argument: Option<String>,
    /// Explicit completion assertion
    pub stage_complete: Option<bool>,
    /// Soft failure signal; treated like a raised error
    pub error: Option<String>,
    /// Run-level synthesis (terminal stages only)
    pub final_report: Option<String>,
}

impl StageUpdate {
    /// An update that changes nothing
    pub fn empty() -> Self {
        Self::default()
    }

    /// An update carrying a report
    pub fn report(text: impl Into<String>) -> Self {
        Self {
            report: Some(text.into()),
            ..Self::default()
        }
    }

    /// An update carrying a debate argument
    pub fn argument(text: impl Into<String>) -> Self {
        Self {
            argument: Some(text.into()),
            ..Self::default()
        }
    }

    /// An update signalling failure
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// An update carrying the run-level synthesis
    pub fn final_report(text: impl Into<String>) -> Self {
        Self {
            final_report: Some(text.into()),
            ..Self::default()
        }
    }

    /// Assert completion of the stage
    pub fn complete(mut self) -> Self {
        self.stage_complete = Some(true);
        self
    }
}

/// What a handler hands back after one invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StageMessage {
    /// The stage is done for this invocation
    PlainReport(StageUpdate),
    /// Run these tools and invoke the stage again with their outputs
    ToolRequest { calls: Vec<ToolCall> },
}

impl From<StageUpdate> for StageMessage {
    fn from(update: StageUpdate) -> Self {
        Self::PlainReport(update)
    }
}

/// Everything a handler may read during one invocation
#[derive(Debug, Clone, Copy)]
pub struct StageInput<'a> {
    pub state: &'a WorkflowState,
    pub stage: Stage,
    /// Active subject; `None` for portfolio finalization
    pub subject: Option<&'a str>,
    /// Outputs of tools requested earlier in this invocation
    pub tool_outputs: &'a [ToolOutput],
    /// 1-based count of consecutive invocations of this stage for the subject
    pub attempt: u32,
}

impl<'a> StageInput<'a> {
    /// Progress record of the active subject
    pub fn subject_state(&self) -> Option<&'a SubjectState> {
        self.subject.and_then(|s| self.state.subject(s))
    }
}

/// Trait implemented by every pluggable analysis unit
///
/// Handlers run one at a time and may block on external I/O. They must not
/// rely on being invoked exactly once: the orchestrator re-invokes a stage
/// whose output did not yet satisfy completion.
#[async_trait]
pub trait StageHandler: Send + Sync {
    /// Run the stage against the current state
    async fn handle(&self, input: StageInput<'_>) -> Result<StageMessage>;

    /// Get the handler's name
    fn name(&self) -> &str;
}
