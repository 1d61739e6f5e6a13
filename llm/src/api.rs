use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Copy, Clone, Debug, Deserialize, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            _ => Err(format!("{s} is not a valid Role")),
        }
    }
}

/// One `{role, content}` entry of a request.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ChatRequest {
    pub(crate) messages: Vec<ChatMessage>,
    pub(crate) max_tokens: u32,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>, max_tokens: u32) -> Self {
        ChatRequest {
            messages,
            max_tokens,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

/// Provider-neutral streaming event.
///
/// Only `TextDelta` carries response text; the other kinds describe the
/// lifecycle of the response and may be ignored by consumers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatEvent {
    MessageStart { model: String },
    TextDelta { text: String },
    MessageDelta { stop_reason: Option<String> },
    MessageStop,
    Ping,
    /// Anything else the provider sent (thinking, tool input, block boundaries)
    Other,
}

impl ChatEvent {
    pub fn text(text: impl Into<String>) -> Self {
        ChatEvent::TextDelta { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ChatEvent::TextDelta { text } => Some(text),
            _ => None,
        }
    }
}
