//! Pre-submission normalization of stored messages
//!
//! The endpoint wants strictly alternating turns ending on a user turn.
//! Storage may hold runs of same-role messages (a failed request leaves two
//! user messages back to back), so runs are merged here and never in the
//! store.
//!
//! Regenerating leaves the earlier reply in storage next to the new one.
//! Both answer the same user message, so only the latest is submitted.

use llm::{ChatMessage, Role};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::ids::MessageId;
use crate::storage::Message;

/// Separator placed between merged same-role contents
pub const COALESCE_SEPARATOR: &str = "\n\n";

/// What to do when the history does not end on a user turn
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrailingPolicy {
    /// Reject the history
    Strict,
    /// Drop trailing assistant entries (regenerating a reply)
    DropTrailing,
}

/// Merge consecutive same-role entries, joining contents with a blank line
pub fn coalesce(messages: impl IntoIterator<Item = ChatMessage>) -> Vec<ChatMessage> {
    let mut merged: Vec<ChatMessage> = Vec::new();
    for message in messages {
        match merged.last_mut() {
            Some(last) if last.role == message.role => {
                last.content.push_str(COALESCE_SEPARATOR);
                last.content.push_str(&message.content);
            }
            _ => merged.push(message),
        }
    }
    merged
}

/// Project, coalesce and check the trailing role of a history.
pub fn normalize_chat(
    messages: impl IntoIterator<Item = ChatMessage>,
    policy: TrailingPolicy,
) -> Result<Vec<ChatMessage>> {
    let mut merged = coalesce(messages);

    if policy == TrailingPolicy::DropTrailing {
        while merged.last().is_some_and(|m| m.role != Role::User) {
            merged.pop();
        }
    }

    match merged.last() {
        None => Err(Error::InvalidHistory("no user message to respond to".into())),
        Some(last) if last.role != Role::User => Err(Error::InvalidHistory(format!(
            "history ends with a {} message",
            last.role
        ))),
        Some(_) => Ok(merged),
    }
}

/// Normalize stored messages for submission, leaving out replies that a
/// later reply to the same user message replaced
pub fn normalize(messages: &[Message], policy: TrailingPolicy) -> Result<Vec<ChatMessage>> {
    let mut latest_reply: HashMap<&MessageId, &MessageId> = HashMap::new();
    for message in messages.iter().filter(|m| m.role == Role::Assistant) {
        if let Some(parent) = &message.parent_id {
            latest_reply.insert(parent, &message.id);
        }
    }

    let current = messages.iter().filter(|m| {
        m.role != Role::Assistant
            || m
                .parent_id
                .as_ref()
                .and_then(|parent| latest_reply.get(parent))
                .is_none_or(|latest| *latest == &m.id)
    });
    normalize_chat(current.map(Message::to_chat_message), policy)
}
