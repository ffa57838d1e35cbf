//! Internal types for the fochs agent loop.
//!
//! These are the lingua franca between the loop, the router and the
//! providers. Provider clients convert to/from their wire formats.

use serde::{Deserialize, Serialize};

use crate::provider::ProviderId;

/// Role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User message. Tool results travel in user messages as well.
    User,
    /// Assistant (model) message.
    Assistant,
}

/// A single content part within a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text.
    Text {
        /// The text content.
        text: String,
    },
    /// A tool use request from the model.
    ToolUse {
        /// Unique identifier for this tool use.
        id: String,
        /// Name of the tool to invoke.
        name: String,
        /// Tool input parameters.
        input: serde_json::Value,
    },
    /// Result from a tool execution.
    ToolResult {
        /// The tool_use id this result corresponds to.
        tool_use_id: String,
        /// The result content.
        content: String,
    },
}

impl ContentPart {
    /// Shorthand for a text part.
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }
}

/// A message in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message author.
    pub role: Role,
    /// Content parts of the message.
    pub content: Vec<ContentPart>,
}

impl Message {
    /// A user message holding a single text part.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentPart::text(text)],
        }
    }

    /// An assistant message holding a single text part.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentPart::text(text)],
        }
    }

    /// Concatenated text parts of this message.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Provider-facing description of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the tool's input.
    pub input_schema: serde_json::Value,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier, unique within one completion.
    pub id: String,
    /// Name of the tool being called.
    pub name: String,
    /// JSON input arguments.
    pub input: serde_json::Value,
}

/// Why the provider stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Model produced a final response.
    EndTurn,
    /// Model wants to use a tool.
    ToolUse,
    /// Hit the max_tokens limit.
    MaxTokens,
    /// Content was filtered by safety.
    ContentFilter,
}

/// Token usage from a single provider call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input tokens consumed.
    pub input_tokens: u64,
    /// Output tokens generated.
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Input plus output tokens.
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Request handed to a single provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// Conversation messages.
    pub messages: Vec<Message>,
    /// Available tools. Empty for providers without tool support.
    pub tools: Vec<ToolDefinition>,
    /// System prompt.
    pub system: Option<String>,
    /// Maximum output tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
}

/// Unified response from any provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Text content (may be empty when only tools are requested).
    pub content: String,
    /// Tool calls, in the order the model produced them.
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    /// Token usage as reported by the provider.
    pub usage: TokenUsage,
    /// Why the provider stopped.
    pub stop_reason: StopReason,
    /// Actual model used.
    pub model: String,
    /// Provider that produced this response.
    pub provider: ProviderId,
}

impl LlmResponse {
    /// A plain text response with no tool calls.
    pub fn text(provider: ProviderId, content: impl Into<String>, usage: TokenUsage) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
            usage,
            stop_reason: StopReason::EndTurn,
            model: String::new(),
            provider,
        }
    }

    /// Whether the model asked for at least one tool.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_part_tool_use_is_tagged() {
        let part = ContentPart::ToolUse {
            id: "tu_1".into(),
            name: "web_search".into(),
            input: json!({"query": "rust"}),
        };
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["type"], "tool_use");
        let back: ContentPart = serde_json::from_value(json).unwrap();
        assert_eq!(part, back);
    }

    #[test]
    fn tool_result_is_tagged() {
        let part = ContentPart::ToolResult {
            tool_use_id: "tu_1".into(),
            content: "ok".into(),
        };
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["type"], "tool_result");
        assert_eq!(json["tool_use_id"], "tu_1");
    }

    #[test]
    fn message_text_joins_text_parts_only() {
        let msg = Message {
            role: Role::Assistant,
            content: vec![
                ContentPart::text("let me "),
                ContentPart::ToolUse {
                    id: "1".into(),
                    name: "x".into(),
                    input: json!({}),
                },
                ContentPart::text("check"),
            ],
        };
        assert_eq!(msg.text(), "let me check");
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            "\"assistant\""
        );
    }

    #[test]
    fn token_usage_total() {
        let usage = TokenUsage {
            input_tokens: 100,
            output_tokens: 50,
        };
        assert_eq!(usage.total(), 150);
        assert_eq!(TokenUsage::default().total(), 0);
    }

    #[test]
    fn text_response_has_no_tool_calls() {
        let response = LlmResponse::text(ProviderId::Claude, "hi", TokenUsage::default());
        assert!(!response.has_tool_calls());
        assert_eq!(response.stop_reason, StopReason::EndTurn);
    }
}
