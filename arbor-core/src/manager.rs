//! ConversationManager - serializes the work done on one conversation
//!
//! Each manager owns a background task that processes commands one at a
//! time, so a conversation never has more than one streaming session or
//! store mutation in flight. Results are reported on a shared event channel
//! for centralized dispatch to the UI.

use llm::{ChatRequest, Role};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument};

use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::history::{normalize, TrailingPolicy};
use crate::ids::{ConversationId, MessageId};
use crate::session::{PartialUpdate, SessionOutcome, StreamingSession};
use crate::storage::{ConversationStore, Message};

/// Shared event sender - events are `(ConversationId, ManagerEvent)` tuples
pub type SharedEventSender = mpsc::UnboundedSender<(ConversationId, ManagerEvent)>;

/// Commands sent to the background task
#[derive(Debug)]
pub enum ManagerCommand {
    /// Persist a user message, then stream and persist the reply
    SendMessage { content: String },
    /// Stream a fresh reply to the last user message
    Regenerate,
}

/// Events emitted from the background task
#[derive(Debug, Clone)]
pub enum ManagerEvent {
    /// The user message is durable; the request is about to be issued
    UserMessageSaved(Message),
    Fragment(PartialUpdate),
    /// The assistant reply was persisted
    Complete(Message),
    /// Nothing was persisted for this reply. `partial` holds whatever text
    /// streamed before the failure, the whole reply if only saving failed.
    Failed { error: Error, partial: String },
}

/// Everything the background task needs, shared by reference
struct Worker {
    conversation_id: ConversationId,
    store: Arc<dyn ConversationStore>,
    endpoint: Arc<Endpoint>,
    max_tokens: u32,
    event_tx: SharedEventSender,
}

pub struct ConversationManager {
    conversation_id: ConversationId,
    cmd_tx: mpsc::UnboundedSender<ManagerCommand>,
}

impl ConversationManager {
    /// Spawn the background task for `conversation_id`.
    ///
    /// The task exits once the manager is dropped and queued commands have
    /// been processed.
    pub fn new(
        conversation_id: ConversationId,
        store: Arc<dyn ConversationStore>,
        endpoint: Arc<Endpoint>,
        max_tokens: u32,
        event_tx: SharedEventSender,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let worker = Worker {
            conversation_id: conversation_id.clone(),
            store,
            endpoint,
            max_tokens,
            event_tx,
        };
        tokio::spawn(worker.background_loop(cmd_rx));

        Self {
            conversation_id,
            cmd_tx,
        }
    }

    pub fn send_message(&self, content: impl Into<String>) -> Result<()> {
        self.command(ManagerCommand::SendMessage {
            content: content.into(),
        })
    }

    pub fn regenerate(&self) -> Result<()> {
        self.command(ManagerCommand::Regenerate)
    }

    fn command(&self, cmd: ManagerCommand) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| Error::Storage(format!("manager for {} has stopped", self.conversation_id)))
    }
}

impl Worker {
    async fn background_loop(self, mut cmd_rx: mpsc::UnboundedReceiver<ManagerCommand>) {
        while let Some(cmd) = cmd_rx.recv().await {
            let result = match cmd {
                ManagerCommand::SendMessage { content } => self.send(&content).await,
                ManagerCommand::Regenerate => self.regenerate().await,
            };
            if let Err(error) = result {
                error!(conversation = %self.conversation_id, "{}", error);
                self.emit(ManagerEvent::Failed {
                    error,
                    partial: String::new(),
                });
            }
        }
        debug!(conversation = %self.conversation_id, "Manager stopped");
    }

    fn emit(&self, event: ManagerEvent) {
        let _ = self
            .event_tx
            .send((self.conversation_id.clone(), event));
    }

    /// Save a message and read it back as stored
    async fn persist(&self, parent_id: Option<&MessageId>, role: Role, content: &str) -> Result<Message> {
        let id = self
            .store
            .save_message(&self.conversation_id, parent_id, role, content)
            .await?;
        self.store
            .list_messages(&self.conversation_id)
            .await?
            .into_iter()
            .find(|m| m.id == id)
            .ok_or_else(|| Error::message_not_found(&id))
    }

    #[instrument(skip(self, content), fields(conversation = %self.conversation_id))]
    async fn send(&self, content: &str) -> Result<()> {
        let history = self.store.list_messages(&self.conversation_id).await?;
        let user_message = self
            .persist(history.last().map(|m| &m.id), Role::User, content)
            .await?;
        let user_id = user_message.id.clone();
        self.emit(ManagerEvent::UserMessageSaved(user_message));

        let history = self.store.list_messages(&self.conversation_id).await?;
        let messages = normalize(&history, TrailingPolicy::Strict)?;
        self.respond(messages, &user_id).await
    }

    #[instrument(skip(self), fields(conversation = %self.conversation_id))]
    async fn regenerate(&self) -> Result<()> {
        let history = self.store.list_messages(&self.conversation_id).await?;
        let messages = normalize(&history, TrailingPolicy::DropTrailing)?;
        let user_id = history
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.id.clone())
            .ok_or_else(|| Error::InvalidHistory("no user message to respond to".into()))?;
        self.respond(messages, &user_id).await
    }

    /// Run one session and persist the reply under `parent_id`
    async fn respond(&self, messages: Vec<llm::ChatMessage>, parent_id: &MessageId) -> Result<()> {
        let model = self.endpoint.current()?;
        let request = ChatRequest::new(messages, self.max_tokens);

        let outcome = StreamingSession::new()
            .run(model.as_ref(), &request, |update| {
                self.emit(ManagerEvent::Fragment(update))
            })
            .await;

        match outcome {
            SessionOutcome::Completed { text } => {
                match self.persist(Some(parent_id), Role::Assistant, &text).await {
                    Ok(reply) => {
                        info!(conversation = %self.conversation_id, chars = text.len(), "Reply saved");
                        self.emit(ManagerEvent::Complete(reply));
                    }
                    Err(error) => {
                        error!(conversation = %self.conversation_id, "Failed to save reply: {}", error);
                        self.emit(ManagerEvent::Failed {
                            error,
                            partial: text,
                        });
                    }
                }
            }
            SessionOutcome::Failed { error, partial } => {
                error!(conversation = %self.conversation_id, "Session failed: {}", error);
                self.emit(ManagerEvent::Failed { error, partial });
            }
        }
        Ok(())
    }
}
