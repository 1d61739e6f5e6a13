//! Branch tree views derived from a flat conversation listing
//!
//! Nothing here touches the store; both functions are pure over whatever
//! `list_conversations` returned.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use super::types::Conversation;
use crate::ids::ConversationId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConversationNode {
    pub conversation: Conversation,
    /// Oldest first
    pub children: Vec<ConversationNode>,
}

/// Arrange conversations into branch trees.
///
/// Roots keep the order of the input listing. A conversation whose parent
/// is missing (deleted) is surfaced as a root.
pub fn build_forest(conversations: &[Conversation]) -> Vec<ConversationNode> {
    let ids: HashSet<&ConversationId> = conversations.iter().map(|c| &c.id).collect();

    let mut children: HashMap<&ConversationId, Vec<&Conversation>> = HashMap::new();
    for conversation in conversations {
        if let Some(parent) = &conversation.parent_id {
            if ids.contains(parent) {
                children.entry(parent).or_default().push(conversation);
            }
        }
    }
    for siblings in children.values_mut() {
        siblings.sort_by_key(|c| c.created_at);
    }

    let is_root = |c: &Conversation| match &c.parent_id {
        None => true,
        Some(parent) => !ids.contains(parent),
    };

    let mut visited = HashSet::new();
    let mut forest: Vec<ConversationNode> = conversations
        .iter()
        .filter(|c| is_root(*c))
        .filter_map(|c| build_node(c, &children, &mut visited))
        .collect();

    // Anything still unvisited sits on a parent cycle; break it where we find it
    for conversation in conversations {
        if let Some(node) = build_node(conversation, &children, &mut visited) {
            forest.push(node);
        }
    }

    forest
}

fn build_node<'a>(
    conversation: &'a Conversation,
    children: &HashMap<&ConversationId, Vec<&'a Conversation>>,
    visited: &mut HashSet<&'a ConversationId>,
) -> Option<ConversationNode> {
    if !visited.insert(&conversation.id) {
        return None;
    }
    let kids = children
        .get(&conversation.id)
        .map(|kids| {
            kids.iter()
                .filter_map(|child| build_node(child, children, visited))
                .collect()
        })
        .unwrap_or_default();
    Some(ConversationNode {
        conversation: conversation.clone(),
        children: kids,
    })
}

/// Root-first chain of ancestors ending at `id`.
///
/// Stops at the first missing parent. Empty if `id` itself is not listed.
pub fn lineage(conversations: &[Conversation], id: &ConversationId) -> Vec<Conversation> {
    let by_id: HashMap<&ConversationId, &Conversation> =
        conversations.iter().map(|c| (&c.id, c)).collect();

    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut current = by_id.get(id).copied();
    while let Some(conversation) = current {
        if !seen.insert(&conversation.id) {
            break;
        }
        chain.push(conversation.clone());
        current = conversation
            .parent_id
            .as_ref()
            .and_then(|parent| by_id.get(parent).copied());
    }
    chain.reverse();
    chain
}
