//! Conversation persistence
//!
//! `ConversationStore` is the contract; `SqliteStore` is the durable backend
//! and `MemoryConversationStore` the throwaway one. `tree` derives branch
//! views from a flat listing.

pub mod helper;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;
pub mod tree;
pub mod types;

pub use memory::MemoryConversationStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
pub use traits::ConversationStore;
pub use tree::{build_forest, lineage, ConversationNode};
pub use types::{Conversation, Message, DEFAULT_TITLE};
