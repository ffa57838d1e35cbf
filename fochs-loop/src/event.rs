//! Events emitted by an agent run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One observable step of an agent run.
///
/// Serializes flat: `{"timestamp": "...", "type": "tool_call", "tool": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEvent {
    /// When the event was produced.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    #[serde(flatten)]
    pub payload: EventPayload,
}

/// Variant-specific content of an [`AgentEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Text the model produced alongside tool calls.
    Thinking {
        /// The model's interim text.
        content: String,
    },
    /// The model requested a tool.
    ToolCall {
        /// Tool name.
        tool: String,
        /// Tool input as requested.
        input: serde_json::Value,
    },
    /// A tool finished.
    ToolResult {
        /// Tool name.
        tool: String,
        /// Output as returned by the registry.
        output: String,
    },
    /// Final answer. Terminal.
    Response {
        /// The answer text.
        content: String,
    },
    /// The run stopped early. Terminal.
    Error {
        /// What went wrong.
        message: String,
        /// Whether retrying later can help.
        recoverable: bool,
    },
}

impl AgentEvent {
    fn now(payload: EventPayload) -> Self {
        Self {
            timestamp: Utc::now(),
            payload,
        }
    }

    /// A [`EventPayload::Thinking`] event.
    pub fn thinking(content: impl Into<String>) -> Self {
        Self::now(EventPayload::Thinking {
            content: content.into(),
        })
    }

    /// A [`EventPayload::ToolCall`] event.
    pub fn tool_call(tool: impl Into<String>, input: serde_json::Value) -> Self {
        Self::now(EventPayload::ToolCall {
            tool: tool.into(),
            input,
        })
    }

    /// A [`EventPayload::ToolResult`] event.
    pub fn tool_result(tool: impl Into<String>, output: impl Into<String>) -> Self {
        Self::now(EventPayload::ToolResult {
            tool: tool.into(),
            output: output.into(),
        })
    }

    /// A [`EventPayload::Response`] event.
    pub fn response(content: impl Into<String>) -> Self {
        Self::now(EventPayload::Response {
            content: content.into(),
        })
    }

    /// An [`EventPayload::Error`] event.
    pub fn error(message: impl Into<String>, recoverable: bool) -> Self {
        Self::now(EventPayload::Error {
            message: message.into(),
            recoverable,
        })
    }

    /// Whether this event ends a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.payload,
            EventPayload::Response { .. } | EventPayload::Error { .. }
        )
    }

    /// The serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self.payload {
            EventPayload::Thinking { .. } => "thinking",
            EventPayload::ToolCall { .. } => "tool_call",
            EventPayload::ToolResult { .. } => "tool_result",
            EventPayload::Response { .. } => "response",
            EventPayload::Error { .. } => "error",
        }
    }
}
