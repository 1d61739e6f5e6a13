use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl From<crate::api::Role> for Role {
    fn from(value: crate::api::Role) -> Self {
        match value {
            crate::api::Role::User => Role::User,
            crate::api::Role::Assistant => Role::Assistant,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct InputMessage {
    pub(crate) role: Role,

    pub(crate) content: String,
}

impl From<&crate::ChatMessage> for InputMessage {
    fn from(msg: &crate::ChatMessage) -> InputMessage {
        InputMessage {
            role: msg.role.into(),
            content: msg.content.clone(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct MessagesRequest {
    pub(crate) model: String,

    pub(crate) messages: Vec<InputMessage>,

    pub(crate) max_tokens: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) stream: Option<bool>,
}

impl MessagesRequest {
    pub(crate) fn from_chat_request(
        model_name: &str,
        request: &crate::ChatRequest,
        stream: bool,
    ) -> Self {
        MessagesRequest {
            model: model_name.to_string(),
            messages: request.messages().iter().map(InputMessage::from).collect(),
            max_tokens: request.max_tokens(),
            stream: Some(stream),
        }
    }
}

// Streaming event types
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum StreamEvent {
    MessageStart {
        message: MessageStartPayload,
    },
    ContentBlockStart {
        index: usize,
        content_block: serde_json::Value,
    },
    ContentBlockDelta {
        index: usize,
        delta: Delta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        delta: MessageDeltaPayload,
        usage: Option<Usage>,
    },
    MessageStop,
    Ping,
    Error {
        error: ErrorPayload,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct MessageStartPayload {
    pub id: String,
    pub model: String,
    pub usage: Option<Usage>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct Usage {
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum Delta {
    TextDelta {
        text: String,
    },
    InputJsonDelta {
        partial_json: String,
    },
    ThinkingDelta {
        thinking: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct MessageDeltaPayload {
    pub stop_reason: Option<String>,
    pub stop_sequence: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct ErrorPayload {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}
