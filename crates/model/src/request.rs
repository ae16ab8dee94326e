use std::fmt::{self, Display, Formatter};

use serde_json::Value;

use crate::OpaqueMessage;

/// A request to be sent to the model provider.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ModelRequest {
    /// The conversation, oldest message first.
    pub messages: Vec<ModelMessage>,
    /// Tools the model may call. Empty means plain completion.
    pub tools: Vec<ModelTool>,
}

/// The role tag of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// Instructions for the model.
    System,
    /// Text typed by the user.
    User,
    /// Text produced by the model.
    Assistant,
    /// The output of a tool.
    Tool,
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        f.write_str(s)
    }
}

/// A complete message.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ModelMessage {
    /// The system instructions.
    System(String),
    /// A user input text.
    User(String),
    /// An assistant text.
    Assistant(String),
    /// A tool call result.
    Tool(ToolCallResult),
    /// A provider-specific assistant message (see [`OpaqueMessage`]).
    Opaque(OpaqueMessage),
}

impl ModelMessage {
    /// Returns the role of this message. Opaque messages always come from
    /// the assistant.
    #[inline]
    pub fn role(&self) -> Role {
        match self {
            ModelMessage::System(_) => Role::System,
            ModelMessage::User(_) => Role::User,
            ModelMessage::Assistant(_) | ModelMessage::Opaque(_) => {
                Role::Assistant
            }
            ModelMessage::Tool(_) => Role::Tool,
        }
    }

    /// Returns the text content, or `None` for opaque messages.
    #[inline]
    pub fn text(&self) -> Option<&str> {
        match self {
            ModelMessage::System(s)
            | ModelMessage::User(s)
            | ModelMessage::Assistant(s) => Some(s),
            ModelMessage::Tool(result) => Some(&result.content),
            ModelMessage::Opaque(_) => None,
        }
    }
}

/// The result of calling a tool.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ToolCallResult {
    /// Id of the tool call this result answers.
    pub id: String,
    /// The result of the tool call, as text.
    pub content: String,
}

/// Describes a tool that can be used by the model.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ModelTool {
    /// Name of the tool.
    pub name: String,
    /// Description of the tool.
    pub description: String,
    /// JSON schema of the tool arguments.
    pub parameters: Value,
}
