//! Branch construction
//!
//! A branch is a new child conversation holding copies of a prefix of its
//! parent's messages. Copies get new ids; the parent is never modified.

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::ids::{ConversationId, MessageId};
use crate::storage::ConversationStore;

pub fn default_branch_title(source_title: &str) -> String {
    format!("{} (branch)", source_title)
}

/// Fork `conversation_id` at `cut_message_id` (inclusive).
pub async fn branch(
    store: &dyn ConversationStore,
    conversation_id: &ConversationId,
    cut_message_id: &MessageId,
    title: Option<&str>,
) -> Result<ConversationId> {
    let source = store.get_conversation(conversation_id).await?;
    let messages = store.list_messages(conversation_id).await?;

    let cut = messages
        .iter()
        .position(|m| &m.id == cut_message_id)
        .ok_or_else(|| Error::message_not_found(cut_message_id))?;
    let prefix = &messages[..=cut];

    let title = title
        .map(str::to_string)
        .unwrap_or_else(|| default_branch_title(&source.title));
    let branch_id = store.create_conversation(&title, Some(conversation_id)).await?;

    for message in prefix {
        let copied = store
            .save_message(&branch_id, message.parent_id.as_ref(), message.role, &message.content)
            .await;
        if let Err(e) = copied {
            warn!(branch = %branch_id, "Copy failed, removing partial branch: {}", e);
            if let Err(cleanup) = store.delete_conversation(&branch_id).await {
                warn!(branch = %branch_id, "Failed to remove partial branch: {}", cleanup);
            }
            return Err(e);
        }
    }

    info!(
        source = %conversation_id,
        branch = %branch_id,
        copied = prefix.len(),
        "Created branch"
    );
    Ok(branch_id)
}
