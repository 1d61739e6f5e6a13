//! ChatService - the facade the front end talks to
//!
//! Owns the store, the endpoint handle and one manager per conversation
//! that has been written to since startup.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::info;

use crate::branch;
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::ids::{ConversationId, MessageId};
use crate::manager::{ConversationManager, ManagerEvent, SharedEventSender};
use crate::storage::helper::check_content;
use crate::storage::{
    build_forest, lineage, Conversation, ConversationNode, ConversationStore, Message,
    DEFAULT_TITLE,
};

pub type EventReceiver = mpsc::UnboundedReceiver<(ConversationId, ManagerEvent)>;

pub struct ChatService {
    store: Arc<dyn ConversationStore>,
    endpoint: Arc<Endpoint>,
    max_tokens: u32,
    managers: Mutex<HashMap<ConversationId, ConversationManager>>,
    event_tx: SharedEventSender,
}

impl ChatService {
    /// Create the service and the receiving end of its event channel
    pub fn new(
        store: Arc<dyn ConversationStore>,
        endpoint: Arc<Endpoint>,
        max_tokens: u32,
    ) -> (Self, EventReceiver) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let service = Self {
            store,
            endpoint,
            max_tokens,
            managers: Mutex::new(HashMap::new()),
            event_tx,
        };
        (service, event_rx)
    }

    pub async fn create_conversation(&self, title: Option<&str>) -> Result<ConversationId> {
        let id = self
            .store
            .create_conversation(title.unwrap_or(DEFAULT_TITLE), None)
            .await?;
        info!(conversation = %id, "Created conversation");
        Ok(id)
    }

    /// Queue a user message. Creates a conversation when none is given.
    /// Empty content is refused before anything is created.
    ///
    /// Returns as soon as the command is queued; progress arrives as events.
    pub async fn send_message(
        &self,
        conversation_id: Option<&ConversationId>,
        content: &str,
    ) -> Result<ConversationId> {
        check_content(content)?;
        let conversation_id = match conversation_id {
            Some(id) => self.store.get_conversation(id).await?.id,
            None => self.create_conversation(None).await?,
        };
        self.with_manager(&conversation_id, |m| m.send_message(content))
            .await?;
        Ok(conversation_id)
    }

    /// Queue a fresh reply to the last user message
    pub async fn regenerate(&self, conversation_id: &ConversationId) -> Result<()> {
        self.store.get_conversation(conversation_id).await?;
        self.with_manager(conversation_id, |m| m.regenerate()).await
    }

    pub async fn branch(
        &self,
        conversation_id: &ConversationId,
        cut_message_id: &MessageId,
        title: Option<&str>,
    ) -> Result<ConversationId> {
        branch::branch(self.store.as_ref(), conversation_id, cut_message_id, title).await
    }

    pub async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        self.store.list_conversations().await
    }

    pub async fn conversation_tree(&self) -> Result<Vec<ConversationNode>> {
        Ok(build_forest(&self.store.list_conversations().await?))
    }

    pub async fn lineage(&self, conversation_id: &ConversationId) -> Result<Vec<Conversation>> {
        Ok(lineage(
            &self.store.list_conversations().await?,
            conversation_id,
        ))
    }

    pub async fn list_messages(&self, conversation_id: &ConversationId) -> Result<Vec<Message>> {
        self.store.list_messages(conversation_id).await
    }

    pub async fn get_conversation(&self, conversation_id: &ConversationId) -> Result<Conversation> {
        self.store.get_conversation(conversation_id).await
    }

    pub async fn rename_conversation(&self, conversation_id: &ConversationId, title: &str) -> Result<()> {
        self.store
            .update_conversation_title(conversation_id, title)
            .await
    }

    pub async fn delete_conversation(&self, conversation_id: &ConversationId) -> Result<()> {
        self.managers.lock().await.remove(conversation_id);
        self.store.delete_conversation(conversation_id).await
    }

    pub async fn delete_all_conversations(&self) -> Result<usize> {
        self.managers.lock().await.clear();
        self.store.delete_all_conversations().await
    }

    pub fn set_credential(&self, token: &str) -> Result<()> {
        self.endpoint.set_credential(token)
    }

    pub fn has_credential(&self) -> bool {
        self.endpoint.has_credential()
    }

    async fn with_manager<F>(&self, conversation_id: &ConversationId, f: F) -> Result<()>
    where
        F: FnOnce(&ConversationManager) -> Result<()>,
    {
        let mut managers = self.managers.lock().await;
        let manager = managers
            .entry(conversation_id.clone())
            .or_insert_with(|| {
                ConversationManager::new(
                    conversation_id.clone(),
                    Arc::clone(&self.store),
                    Arc::clone(&self.endpoint),
                    self.max_tokens,
                    self.event_tx.clone(),
                )
            });
        f(manager)
    }
}
