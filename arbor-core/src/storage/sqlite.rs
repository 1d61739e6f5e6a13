//! SQLite implementation of ConversationStore
//!
//! One connection is opened per store and guarded by a mutex; each call
//! holds the lock for its whole duration.

use async_trait::async_trait;
use llm::Role;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, instrument};

use super::helper::{check_content, unix_timestamp};
use super::traits::ConversationStore;
use super::types::{Conversation, Message};
use crate::error::{Error, Result};
use crate::ids::{ConversationId, MessageId};

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS conversations (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            parent_id TEXT REFERENCES conversations(id),
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            parent_id TEXT,
            role TEXT CHECK(role IN ('user', 'assistant')) NOT NULL,
            content TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, created_at);
        "#,
    )?;
    Ok(())
}

/// Conversation store backed by a single SQLite connection
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database file and ensure the schema exists
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Storage(format!("Failed to create {}: {}", parent.display(), e)))?;
        }
        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        info!("Opened conversation database at {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Storage("database lock poisoned".into()))
    }
}

fn conversation_exists(conn: &Connection, id: &ConversationId) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM conversations WHERE id = ?1)",
        params![id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        title: row.get(1)?,
        parent_id: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let role: String = row.get(3)?;
    let role = role
        .parse::<Role>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into()))?;
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        parent_id: row.get(2)?,
        role,
        content: row.get(4)?,
        created_at: row.get(5)?,
    })
}

#[async_trait]
impl ConversationStore for SqliteStore {
    #[instrument(skip(self))]
    async fn create_conversation(
        &self,
        title: &str,
        parent_id: Option<&ConversationId>,
    ) -> Result<ConversationId> {
        let conn = self.conn()?;
        if let Some(parent) = parent_id {
            if !conversation_exists(&conn, parent)? {
                return Err(Error::Storage(format!(
                    "parent conversation {} does not exist",
                    parent
                )));
            }
        }

        let id = ConversationId::new();
        conn.execute(
            "INSERT INTO conversations (id, title, parent_id, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![&id, title, parent_id, unix_timestamp()],
        )?;
        debug!(conversation_id = %id, "Created conversation");
        Ok(id)
    }

    #[instrument(skip(self, content), fields(len = content.len()))]
    async fn save_message(
        &self,
        conversation_id: &ConversationId,
        parent_id: Option<&MessageId>,
        role: Role,
        content: &str,
    ) -> Result<MessageId> {
        check_content(content)?;
        let conn = self.conn()?;
        if !conversation_exists(&conn, conversation_id)? {
            return Err(Error::Storage(format!(
                "conversation {} does not exist",
                conversation_id
            )));
        }

        let id = MessageId::new();
        conn.execute(
            "INSERT INTO messages (id, conversation_id, parent_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![&id, conversation_id, parent_id, role.as_str(), content, unix_timestamp()],
        )?;
        Ok(id)
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, parent_id, created_at FROM conversations
             ORDER BY created_at DESC, rowid DESC",
        )?;
        let conversations = stmt
            .query_map([], conversation_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(conversations)
    }

    async fn list_messages(&self, conversation_id: &ConversationId) -> Result<Vec<Message>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, conversation_id, parent_id, role, content, created_at FROM messages
             WHERE conversation_id = ?1
             ORDER BY created_at, rowid",
        )?;
        let messages = stmt
            .query_map(params![conversation_id], message_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(messages)
    }

    async fn get_conversation(&self, conversation_id: &ConversationId) -> Result<Conversation> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, title, parent_id, created_at FROM conversations WHERE id = ?1",
            params![conversation_id],
            conversation_from_row,
        )
        .optional()?
        .ok_or_else(|| Error::conversation_not_found(conversation_id))
    }

    #[instrument(skip(self))]
    async fn update_conversation_title(
        &self,
        conversation_id: &ConversationId,
        title: &str,
    ) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE conversations SET title = ?1 WHERE id = ?2",
            params![title, conversation_id],
        )?;
        if updated == 0 {
            return Err(Error::conversation_not_found(conversation_id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_conversation(&self, conversation_id: &ConversationId) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let messages = tx.execute(
            "DELETE FROM messages WHERE conversation_id = ?1",
            params![conversation_id],
        )?;
        let deleted = tx.execute(
            "DELETE FROM conversations WHERE id = ?1",
            params![conversation_id],
        )?;
        if deleted == 0 {
            // Dropping the transaction rolls back
            return Err(Error::conversation_not_found(conversation_id));
        }
        tx.commit()?;
        debug!(messages, "Deleted conversation");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_all_conversations(&self) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM messages", [])?;
        let deleted = tx.execute("DELETE FROM conversations", [])?;
        tx.commit()?;
        info!(deleted, "Deleted all conversations");
        Ok(deleted)
    }
}
