//! Core of the arbor chat client
//!
//! This crate provides:
//! - **Storage**: `ConversationStore` with `SqliteStore` and `MemoryConversationStore` backends
//! - **Normalization**: `history::normalize` turns stored messages into a valid request
//! - **Streaming**: `StreamingSession` folds model output into a transcript entry
//! - **Branching**: `branch::branch` forks a conversation at any message
//! - **Managers**: `ConversationManager` serializes work per conversation
//! - **Service**: `ChatService`, the facade used by front ends
//!
//! # Example
//!
//! ```ignore
//! use arbor_core::{ChatService, Endpoint, MemoryConversationStore, MemoryCredentials};
//!
//! let endpoint = Endpoint::claude(Arc::new(MemoryCredentials::new(Some(key))), model, None);
//! let (service, mut events) = ChatService::new(Arc::new(MemoryConversationStore::new()), Arc::new(endpoint), 1000);
//! let id = service.send_message(None, "2+2?").await?;
//! while let Some((conversation, event)) = events.recv().await { /* ... */ }
//! ```
pub mod branch;
pub mod credentials;
pub mod endpoint;
pub mod error;
pub mod history;
pub mod ids;
pub mod manager;
pub mod service;
pub mod session;
pub mod storage;

pub use credentials::{CredentialStore, MemoryCredentials, SettingsCredentials};
pub use endpoint::{Endpoint, ModelFactory, SharedModel};
pub use error::{Error, Result};
pub use history::{normalize, TrailingPolicy};
pub use ids::{ConversationId, MessageId, SessionId};
pub use manager::{ConversationManager, ManagerCommand, ManagerEvent, SharedEventSender};
pub use service::{ChatService, EventReceiver};
pub use session::{PartialUpdate, SessionOutcome, StreamingSession};
pub use storage::{
    Conversation, ConversationNode, ConversationStore, MemoryConversationStore, Message,
    DEFAULT_TITLE,
};
#[cfg(feature = "sqlite")]
pub use storage::SqliteStore;
