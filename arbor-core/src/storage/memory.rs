//! In-memory ConversationStore implementation
//!
//! Same contract as the SQLite store; used by tests and by callers that do
//! not want anything written to disk.

use async_trait::async_trait;
use llm::Role;
use std::sync::{Mutex, MutexGuard};

use super::helper::{check_content, unix_timestamp};
use super::traits::ConversationStore;
use super::types::{Conversation, Message};
use crate::error::{Error, Result};
use crate::ids::{ConversationId, MessageId};

#[derive(Debug, Default)]
struct State {
    /// Insertion order
    conversations: Vec<Conversation>,
    /// Insertion order
    messages: Vec<Message>,
}

impl State {
    fn contains(&self, id: &ConversationId) -> bool {
        self.conversations.iter().any(|c| &c.id == id)
    }
}

#[derive(Debug, Default)]
pub struct MemoryConversationStore {
    state: Mutex<State>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| Error::Storage("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn create_conversation(
        &self,
        title: &str,
        parent_id: Option<&ConversationId>,
    ) -> Result<ConversationId> {
        let mut state = self.state()?;
        if let Some(parent) = parent_id {
            if !state.contains(parent) {
                return Err(Error::Storage(format!(
                    "parent conversation {} does not exist",
                    parent
                )));
            }
        }

        let id = ConversationId::new();
        state.conversations.push(Conversation {
            id: id.clone(),
            title: title.to_string(),
            parent_id: parent_id.cloned(),
            created_at: unix_timestamp(),
        });
        Ok(id)
    }

    async fn save_message(
        &self,
        conversation_id: &ConversationId,
        parent_id: Option<&MessageId>,
        role: Role,
        content: &str,
    ) -> Result<MessageId> {
        check_content(content)?;
        let mut state = self.state()?;
        if !state.contains(conversation_id) {
            return Err(Error::Storage(format!(
                "conversation {} does not exist",
                conversation_id
            )));
        }

        let id = MessageId::new();
        state.messages.push(Message {
            id: id.clone(),
            conversation_id: conversation_id.clone(),
            parent_id: parent_id.cloned(),
            role,
            content: content.to_string(),
            created_at: unix_timestamp(),
        });
        Ok(id)
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let state = self.state()?;
        // Reverse first so the stable sort keeps later inserts ahead on ties
        let mut conversations: Vec<_> = state.conversations.iter().rev().cloned().collect();
        conversations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(conversations)
    }

    async fn list_messages(&self, conversation_id: &ConversationId) -> Result<Vec<Message>> {
        let state = self.state()?;
        let mut messages: Vec<_> = state
            .messages
            .iter()
            .filter(|m| &m.conversation_id == conversation_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn get_conversation(&self, conversation_id: &ConversationId) -> Result<Conversation> {
        self.state()?
            .conversations
            .iter()
            .find(|c| &c.id == conversation_id)
            .cloned()
            .ok_or_else(|| Error::conversation_not_found(conversation_id))
    }

    async fn update_conversation_title(
        &self,
        conversation_id: &ConversationId,
        title: &str,
    ) -> Result<()> {
        let mut state = self.state()?;
        let conversation = state
            .conversations
            .iter_mut()
            .find(|c| &c.id == conversation_id)
            .ok_or_else(|| Error::conversation_not_found(conversation_id))?;
        conversation.title = title.to_string();
        Ok(())
    }

    async fn delete_conversation(&self, conversation_id: &ConversationId) -> Result<()> {
        let mut state = self.state()?;
        if !state.contains(conversation_id) {
            return Err(Error::conversation_not_found(conversation_id));
        }
        state.messages.retain(|m| &m.conversation_id != conversation_id);
        state.conversations.retain(|c| &c.id != conversation_id);
        Ok(())
    }

    async fn delete_all_conversations(&self) -> Result<usize> {
        let mut state = self.state()?;
        state.messages.clear();
        let deleted = state.conversations.len();
        state.conversations.clear();
        Ok(deleted)
    }
}
