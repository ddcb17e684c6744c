//! Message and Conversation domain types.
//!
//! These are the value objects that flow through the whole system:
//! the client sends a conversation → the orchestrator appends assistant turns
//! and tool-result turns → the conversation is handed back to the client.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Error;
use crate::tool::ToolCall;

/// A single piece of message content.
///
/// Wire shape: `{"type":"text","text":..}`,
/// `{"type":"tool_use","id":..,"toolId":..,"operationId":..,"input":..}`,
/// `{"type":"tool_result","toolUseId":..,"output":..,"isError":..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ContentBlock {
    /// Plain text.
    Text { text: String },

    /// A model request to invoke one operation of one tool.
    ToolUse {
        id: String,
        tool_id: String,
        operation_id: String,
        input: serde_json::Value,
    },

    /// The outcome of a previously requested ToolUse, referenced by id.
    ToolResult {
        tool_use_id: String,
        output: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn is_tool_use(&self) -> bool {
        matches!(self, Self::ToolUse { .. })
    }

    pub fn is_tool_result(&self) -> bool {
        matches!(self, Self::ToolResult { .. })
    }
}

/// A single message in a conversation. The role is the enum variant and
/// never changes after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    /// The end user, or the synthetic turn that carries tool results.
    User {
        #[serde(deserialize_with = "deserialize_content")]
        content: Vec<ContentBlock>,
    },

    /// The model.
    Assistant {
        model: String,
        #[serde(deserialize_with = "deserialize_content")]
        content: Vec<ContentBlock>,
    },
}

impl Message {
    /// Create a user message with a single text block.
    pub fn user(text: impl Into<String>) -> Self {
        Self::User {
            content: vec![ContentBlock::text(text)],
        }
    }

    /// Create an assistant message.
    pub fn assistant(model: impl Into<String>, content: Vec<ContentBlock>) -> Self {
        Self::Assistant {
            model: model.into(),
            content,
        }
    }

    /// Create the synthetic user turn that feeds tool results back to the model.
    pub fn tool_results(results: Vec<ContentBlock>) -> Self {
        Self::User { content: results }
    }

    pub fn content(&self) -> &[ContentBlock] {
        match self {
            Self::User { content } | Self::Assistant { content, .. } => content,
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Self::User { .. })
    }

    /// Concatenated text of all Text blocks.
    pub fn text(&self) -> String {
        self.content()
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// ToolUse blocks in the order the model emitted them.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.content()
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse {
                    id,
                    tool_id,
                    operation_id,
                    input,
                } => Some(ToolCall {
                    id: id.clone(),
                    tool_id: tool_id.clone(),
                    operation_id: operation_id.clone(),
                    input: input.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    pub fn has_tool_uses(&self) -> bool {
        self.content().iter().any(ContentBlock::is_tool_use)
    }

    pub fn has_tool_results(&self) -> bool {
        self.content().iter().any(ContentBlock::is_tool_result)
    }
}

/// Accept either a plain string or a list of blocks for `content`.
fn deserialize_content<'de, D>(deserializer: D) -> Result<Vec<ContentBlock>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawContent {
        Text(String),
        Blocks(Vec<ContentBlock>),
    }

    Ok(match RawContent::deserialize(deserializer)? {
        RawContent::Text(text) => vec![ContentBlock::Text { text }],
        RawContent::Blocks(blocks) => blocks,
    })
}

/// An ordered, append-only sequence of messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Check that the conversation can be sent for a new round.
    ///
    /// It must be non-empty and end with a user turn, or with an assistant
    /// message that already carries its tool results.
    pub fn validate_for_round(&self) -> Result<(), Error> {
        match self.messages.last() {
            None => Err(Error::InvalidConversation("conversation is empty".into())),
            Some(Message::User { content }) if content.is_empty() => Err(
                Error::InvalidConversation("last user message has no content".into()),
            ),
            Some(Message::User { .. }) => Ok(()),
            Some(msg @ Message::Assistant { .. }) if msg.has_tool_results() => Ok(()),
            Some(Message::Assistant { .. }) => Err(Error::InvalidConversation(
                "conversation must end with a user message or tool results".into(),
            )),
        }
    }
}

impl From<Vec<Message>> for Conversation {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}
