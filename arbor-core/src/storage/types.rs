//! Stored entity snapshots
//!
//! These are the shapes handed across the presentation boundary, so they are
//! serde-serializable and carry no storage handles.

use llm::Role;
use serde::{Deserialize, Serialize};

use crate::ids::{ConversationId, MessageId};

/// Title given to conversations created without an explicit one
pub const DEFAULT_TITLE: &str = "New Conversation";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    /// Conversation this one was branched from
    pub parent_id: Option<ConversationId>,
    /// Unix timestamp in milliseconds
    pub created_at: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    /// Message this one answers or continues
    pub parent_id: Option<MessageId>,
    pub role: Role,
    pub content: String,
    /// Unix timestamp in milliseconds
    pub created_at: i64,
}

impl Message {
    pub fn to_chat_message(&self) -> llm::ChatMessage {
        llm::ChatMessage::new(self.role, self.content.clone())
    }
}
