//! Typed events emitted by an agent process in JSON streaming mode.
//!
//! Each stdout line is one JSON object discriminated by its `type` field.
//! Recognized types map to strongly typed variants; every other type lands in
//! [`AgentEvent::Unknown`] so newer agents never break an older supervisor.

use serde::{Deserialize, Deserializer, Serialize};

/// One decoded line of the agent's event stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A tool call began executing.
    ToolExecutionStart {
        #[serde(rename = "toolName", default)]
        tool_name: Option<String>,
        #[serde(default)]
        args: serde_json::Value,
    },

    /// The running tool call finished.
    ToolExecutionEnd {
        #[serde(rename = "toolName", default)]
        tool_name: Option<String>,
        #[serde(rename = "isError", default)]
        is_error: bool,
    },

    /// A complete message was appended to the conversation.
    MessageEnd {
        #[serde(default)]
        message: Option<AgentMessage>,
    },

    /// A tool result message was appended to the conversation.
    ToolResultEnd {
        #[serde(default)]
        message: Option<AgentMessage>,
    },

    /// The agent finished its run.
    AgentEnd,

    /// Any event type this supervisor does not act on.
    #[serde(other)]
    Unknown,
}

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    User,
    Assistant,
    ToolResult,
    #[serde(other)]
    Other,
}

/// Why the model stopped producing output for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    Stop,
    Length,
    ToolUse,
    Error,
    Aborted,
    #[serde(other)]
    Other,
}

impl StopReason {
    /// `true` for stop reasons that make a task count as failed.
    pub fn is_failure(self) -> bool {
        matches!(self, StopReason::Error | StopReason::Aborted)
    }
}

/// One block of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "toolCall")]
    ToolCall {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        name: String,
        #[serde(default)]
        arguments: serde_json::Value,
    },

    /// Thinking blocks, images, and anything newer.
    #[serde(other)]
    Other,
}

/// Token and cost figures attached to an assistant message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageUsage {
    pub input: u64,
    pub output: u64,
    pub cache_read: u64,
    pub cache_write: u64,
    pub cost: MessageCost,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageCost {
    pub total: f64,
}

/// A conversation message as reported by the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMessage {
    pub role: Role,
    /// A bare string is read as a single text block.
    #[serde(default, deserialize_with = "content_blocks")]
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<MessageUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AgentMessage {
    /// Build a plain assistant text message.
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentBlock::Text { text: text.into() }],
            usage: None,
            model: None,
            stop_reason: None,
            error_message: None,
        }
    }

    /// First text block of this message, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
    }
}

fn content_blocks<'de, D>(deserializer: D) -> Result<Vec<ContentBlock>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Content {
        Text(String),
        Blocks(Vec<ContentBlock>),
    }

    Ok(match Option::<Content>::deserialize(deserializer)? {
        Some(Content::Text(text)) => vec![ContentBlock::Text { text }],
        Some(Content::Blocks(blocks)) => blocks,
        None => Vec::new(),
    })
}

/// Text of the last assistant message that carries a text block.
///
/// This is a task's "final output": what a chain step hands to the next step
/// and what gets written to an output artifact.
pub fn final_assistant_text(messages: &[AgentMessage]) -> Option<&str> {
    messages
        .iter()
        .rev()
        .filter(|m| m.role == Role::Assistant)
        .find_map(AgentMessage::first_text)
}
