use std::sync::Arc;
use std::time::Duration;

use arbor_core::{
    ChatService, Conversation, ConversationId, ConversationStore, Endpoint, Error,
    EventReceiver, ManagerEvent, MemoryConversationStore, MemoryCredentials, Message, MessageId,
    ModelFactory, SharedModel, SqliteStore, DEFAULT_TITLE,
};
use async_trait::async_trait;
use llm::mock::{ScriptedModel, ScriptedReply};
use llm::{ChatMessage, Role};

fn scripted_endpoint(model: Arc<ScriptedModel>) -> Arc<Endpoint> {
    let factory: ModelFactory = Arc::new(move |_token: &str| Ok(model.clone() as SharedModel));
    Arc::new(Endpoint::new(
        Arc::new(MemoryCredentials::new(Some("sk-test"))),
        factory,
    ))
}

/// Memory store that refuses to save assistant messages
#[derive(Default)]
struct RejectingReplies(MemoryConversationStore);

#[async_trait]
impl ConversationStore for RejectingReplies {
    async fn create_conversation(
        &self,
        title: &str,
        parent_id: Option<&ConversationId>,
    ) -> arbor_core::Result<ConversationId> {
        self.0.create_conversation(title, parent_id).await
    }

    async fn save_message(
        &self,
        conversation_id: &ConversationId,
        parent_id: Option<&MessageId>,
        role: Role,
        content: &str,
    ) -> arbor_core::Result<MessageId> {
        if role == Role::Assistant {
            return Err(Error::Storage("disk full".into()));
        }
        self.0.save_message(conversation_id, parent_id, role, content).await
    }

    async fn list_conversations(&self) -> arbor_core::Result<Vec<Conversation>> {
        self.0.list_conversations().await
    }

    async fn list_messages(&self, conversation_id: &ConversationId) -> arbor_core::Result<Vec<Message>> {
        self.0.list_messages(conversation_id).await
    }

    async fn get_conversation(&self, conversation_id: &ConversationId) -> arbor_core::Result<Conversation> {
        self.0.get_conversation(conversation_id).await
    }

    async fn update_conversation_title(
        &self,
        conversation_id: &ConversationId,
        title: &str,
    ) -> arbor_core::Result<()> {
        self.0.update_conversation_title(conversation_id, title).await
    }

    async fn delete_conversation(&self, conversation_id: &ConversationId) -> arbor_core::Result<()> {
        self.0.delete_conversation(conversation_id).await
    }

    async fn delete_all_conversations(&self) -> arbor_core::Result<usize> {
        self.0.delete_all_conversations().await
    }
}

/// Collect events for `conversation` up to and including the terminal one
async fn until_done(events: &mut EventReceiver, conversation: &ConversationId) -> Vec<ManagerEvent> {
    let mut seen = Vec::new();
    loop {
        let (id, event) = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for manager")
            .expect("event channel closed");
        assert_eq!(&id, conversation);
        let done = matches!(event, ManagerEvent::Complete(_) | ManagerEvent::Failed { .. });
        seen.push(event);
        if done {
            return seen;
        }
    }
}

#[tokio::test]
async fn test_send_persists_streamed_reply() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(dir.path().join("chat.db")).unwrap());
    let model = Arc::new(ScriptedModel::new([ScriptedReply::fragments(["4", "."])]));
    let (service, mut events) = ChatService::new(store, scripted_endpoint(model.clone()), 1000);

    let conversation = service.create_conversation(None).await.unwrap();
    service.send_message(Some(&conversation), "2+2?").await.unwrap();
    let seen = until_done(&mut events, &conversation).await;

    let ManagerEvent::UserMessageSaved(user) = &seen[0] else {
        panic!("expected user message first, got {:?}", seen[0]);
    };
    let fragments: Vec<_> = seen
        .iter()
        .filter_map(|e| match e {
            ManagerEvent::Fragment(update) => Some(update.fragment.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(fragments, ["4", "."]);

    let messages = service.list_messages(&conversation).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].id, user.id);
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].content, "4.");
    assert_eq!(messages[1].parent_id.as_ref(), Some(&user.id));

    let listed = service.list_conversations().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].title, DEFAULT_TITLE);

    let requests = model.requests();
    assert_eq!(requests[0].messages(), [ChatMessage::user("2+2?")]);
    assert_eq!(requests[0].max_tokens(), 1000);
}

#[tokio::test]
async fn test_send_without_conversation_creates_one() {
    let model = Arc::new(ScriptedModel::new([ScriptedReply::fragments(["Hi"])]));
    let (service, mut events) = ChatService::new(
        Arc::new(MemoryConversationStore::new()),
        scripted_endpoint(model),
        1000,
    );

    let conversation = service.send_message(None, "hello").await.unwrap();
    until_done(&mut events, &conversation).await;

    let info = service.get_conversation(&conversation).await.unwrap();
    assert_eq!(info.title, DEFAULT_TITLE);
    assert_eq!(service.list_messages(&conversation).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_failed_stream_keeps_user_message_only() {
    let model = Arc::new(ScriptedModel::new([
        ScriptedReply::FailAfter(vec!["Par".into()], "overloaded".into()),
        ScriptedReply::fragments(["Recovered"]),
    ]));
    let (service, mut events) = ChatService::new(
        Arc::new(MemoryConversationStore::new()),
        scripted_endpoint(model.clone()),
        1000,
    );

    let conversation = service.send_message(None, "first try").await.unwrap();
    let seen = until_done(&mut events, &conversation).await;
    match seen.last() {
        Some(ManagerEvent::Failed { error: Error::Endpoint(_), partial }) => {
            assert_eq!(partial, "Par")
        }
        other => panic!("expected endpoint failure, got {other:?}"),
    }
    let messages = service.list_messages(&conversation).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::User);

    // The next send submits both user turns merged into one
    service.send_message(Some(&conversation), "second try").await.unwrap();
    until_done(&mut events, &conversation).await;
    let requests = model.requests();
    assert_eq!(
        requests[1].messages(),
        [ChatMessage::user("first try\n\nsecond try")]
    );
    let messages = service.list_messages(&conversation).await.unwrap();
    assert_eq!(messages.last().unwrap().content, "Recovered");
    assert_eq!(messages.last().unwrap().parent_id.as_ref(), Some(&messages[1].id));
}

#[tokio::test]
async fn test_regenerate_answers_last_user_message() {
    let model = Arc::new(ScriptedModel::new([
        ScriptedReply::fragments(["Paris"]),
        ScriptedReply::fragments(["Paris, France"]),
    ]));
    let (service, mut events) = ChatService::new(
        Arc::new(MemoryConversationStore::new()),
        scripted_endpoint(model.clone()),
        1000,
    );

    let conversation = service.send_message(None, "Capital of France?").await.unwrap();
    until_done(&mut events, &conversation).await;
    service.regenerate(&conversation).await.unwrap();
    let seen = until_done(&mut events, &conversation).await;
    assert!(matches!(seen.last(), Some(ManagerEvent::Complete(m)) if m.content == "Paris, France"));

    let requests = model.requests();
    assert_eq!(requests[1].messages(), [ChatMessage::user("Capital of France?")]);

    let messages = service.list_messages(&conversation).await.unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[2].parent_id.as_ref(), Some(&messages[0].id));
}

#[tokio::test]
async fn test_follow_up_after_regenerate_sends_only_latest_reply() {
    let model = Arc::new(ScriptedModel::new([
        ScriptedReply::fragments(["Paris"]),
        ScriptedReply::fragments(["Paris, France"]),
        ScriptedReply::fragments(["It is the seat of government."]),
    ]));
    let (service, mut events) = ChatService::new(
        Arc::new(MemoryConversationStore::new()),
        scripted_endpoint(model.clone()),
        1000,
    );

    let conversation = service.send_message(None, "Capital of France?").await.unwrap();
    until_done(&mut events, &conversation).await;
    service.regenerate(&conversation).await.unwrap();
    until_done(&mut events, &conversation).await;
    service.send_message(Some(&conversation), "Why?").await.unwrap();
    until_done(&mut events, &conversation).await;

    let requests = model.requests();
    assert_eq!(
        requests[2].messages(),
        [
            ChatMessage::user("Capital of France?"),
            ChatMessage::assistant("Paris, France"),
            ChatMessage::user("Why?"),
        ]
    );
    assert_eq!(service.list_messages(&conversation).await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_unsaved_reply_is_reported_with_full_text() {
    let model = Arc::new(ScriptedModel::new([ScriptedReply::fragments(["All ", "done"])]));
    let (service, mut events) = ChatService::new(
        Arc::new(RejectingReplies::default()),
        scripted_endpoint(model),
        1000,
    );

    let conversation = service.send_message(None, "finish it").await.unwrap();
    let seen = until_done(&mut events, &conversation).await;

    match seen.last() {
        Some(ManagerEvent::Failed { error: Error::Storage(_), partial }) => {
            assert_eq!(partial, "All done")
        }
        other => panic!("expected storage failure, got {other:?}"),
    }
    assert_eq!(service.list_messages(&conversation).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_empty_message_creates_no_conversation() {
    let model = Arc::new(ScriptedModel::default());
    let (service, _events) = ChatService::new(
        Arc::new(MemoryConversationStore::new()),
        scripted_endpoint(model.clone()),
        1000,
    );

    let err = service.send_message(None, "").await.unwrap_err();

    assert!(matches!(err, Error::Storage(_)));
    assert!(service.list_conversations().await.unwrap().is_empty());
    assert!(model.requests().is_empty());
}

#[tokio::test]
async fn test_missing_credential_fails_after_saving_user_message() {
    let factory: ModelFactory =
        Arc::new(|_token: &str| Ok(Arc::new(ScriptedModel::default()) as SharedModel));
    let endpoint = Arc::new(Endpoint::new(Arc::new(MemoryCredentials::default()), factory));
    let (service, mut events) =
        ChatService::new(Arc::new(MemoryConversationStore::new()), endpoint, 1000);
    assert!(!service.has_credential());

    let conversation = service.send_message(None, "anyone?").await.unwrap();
    let seen = until_done(&mut events, &conversation).await;

    assert!(matches!(seen[0], ManagerEvent::UserMessageSaved(_)));
    assert!(matches!(
        seen.last(),
        Some(ManagerEvent::Failed { error: Error::Endpoint(_), .. })
    ));
    assert_eq!(service.list_messages(&conversation).await.unwrap().len(), 1);

    service.set_credential("sk-new").unwrap();
    assert!(service.has_credential());
}

#[tokio::test]
async fn test_tree_and_lineage_follow_branches() {
    let model = Arc::new(ScriptedModel::new([ScriptedReply::fragments(["A"])]));
    let (service, mut events) = ChatService::new(
        Arc::new(MemoryConversationStore::new()),
        scripted_endpoint(model),
        1000,
    );

    let root = service.send_message(None, "Q").await.unwrap();
    until_done(&mut events, &root).await;
    let messages = service.list_messages(&root).await.unwrap();
    let child = service.branch(&root, &messages[1].id, None).await.unwrap();
    let grandchild = service
        .branch(&child, &messages[0].id, Some("Deeper"))
        .await
        .unwrap_err();
    // Copies carry new ids, so the source's message id is not in the branch
    assert!(matches!(grandchild, Error::NotFound { .. }));

    let child_messages = service.list_messages(&child).await.unwrap();
    let grandchild = service
        .branch(&child, &child_messages[0].id, Some("Deeper"))
        .await
        .unwrap();

    let tree = service.conversation_tree().await.unwrap();
    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0].conversation.id, root);
    assert_eq!(tree[0].children[0].conversation.id, child);
    assert_eq!(tree[0].children[0].children[0].conversation.title, "Deeper");

    let chain: Vec<_> = service
        .lineage(&grandchild)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(chain, [root.clone(), child.clone(), grandchild.clone()]);

    service.delete_conversation(&child).await.unwrap();
    let tree = service.conversation_tree().await.unwrap();
    assert_eq!(tree.len(), 2, "orphaned branch surfaces as a root");

    assert_eq!(service.delete_all_conversations().await.unwrap(), 2);
}
