//! ConversationStore trait
//!
//! Conversations and their messages live behind one trait so that branching
//! and cascade deletion stay atomic relative to each other.

use async_trait::async_trait;
use llm::Role;

use super::types::{Conversation, Message};
use crate::error::Result;
use crate::ids::{ConversationId, MessageId};

/// Durable owner of the conversation forest and its messages
///
/// Every call is atomic with respect to every other call on the same store.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create a conversation. Fails with `Storage` if `parent_id` names a
    /// conversation that does not exist.
    async fn create_conversation(
        &self,
        title: &str,
        parent_id: Option<&ConversationId>,
    ) -> Result<ConversationId>;

    /// Append a message. Fails with `Storage` if the conversation does not
    /// exist or `content` is empty.
    async fn save_message(
        &self,
        conversation_id: &ConversationId,
        parent_id: Option<&MessageId>,
        role: Role,
        content: &str,
    ) -> Result<MessageId>;

    /// All conversations, newest first
    async fn list_conversations(&self) -> Result<Vec<Conversation>>;

    /// Messages of one conversation, oldest first. Empty for unknown ids.
    async fn list_messages(&self, conversation_id: &ConversationId) -> Result<Vec<Message>>;

    async fn get_conversation(&self, conversation_id: &ConversationId) -> Result<Conversation>;

    async fn update_conversation_title(
        &self,
        conversation_id: &ConversationId,
        title: &str,
    ) -> Result<()>;

    /// Delete a conversation and its messages. Child conversations are kept
    /// and keep pointing at the deleted parent.
    async fn delete_conversation(&self, conversation_id: &ConversationId) -> Result<()>;

    /// Delete every message and conversation; returns the number of
    /// conversations removed.
    async fn delete_all_conversations(&self) -> Result<usize>;
}
