use arbor_core::branch::branch;
use arbor_core::{ConversationId, ConversationStore, Error, MemoryConversationStore, MessageId, SqliteStore};
use llm::Role;

async fn seeded(store: &dyn ConversationStore) -> (ConversationId, Vec<MessageId>) {
    let id = store.create_conversation("Physics", None).await.unwrap();
    let mut ids = Vec::new();
    let mut parent = None;
    for (role, content) in [
        (Role::User, "What is light?"),
        (Role::Assistant, "Electromagnetic radiation."),
        (Role::User, "Is it a wave?"),
        (Role::Assistant, "And a particle."),
    ] {
        let saved = store
            .save_message(&id, parent.as_ref(), role, content)
            .await
            .unwrap();
        parent = Some(saved.clone());
        ids.push(saved);
    }
    (id, ids)
}

fn stores() -> (tempfile::TempDir, Vec<Box<dyn ConversationStore>>) {
    let dir = tempfile::tempdir().unwrap();
    let sqlite = SqliteStore::open(dir.path().join("branch.db")).unwrap();
    let stores: Vec<Box<dyn ConversationStore>> =
        vec![Box::new(sqlite), Box::new(MemoryConversationStore::new())];
    (dir, stores)
}

#[tokio::test]
async fn test_branch_copies_prefix_through_cut() {
    let (_dir, stores) = stores();
    for store in stores {
        let store = store.as_ref();
        let (source, ids) = seeded(store).await;

        let forked = branch(store, &source, &ids[1], None).await.unwrap();

        let info = store.get_conversation(&forked).await.unwrap();
        assert_eq!(info.title, "Physics (branch)");
        assert_eq!(info.parent_id, Some(source.clone()));

        let source_messages = store.list_messages(&source).await.unwrap();
        let copied = store.list_messages(&forked).await.unwrap();
        assert_eq!(copied.len(), 2);
        for (copy, original) in copied.iter().zip(&source_messages) {
            assert_ne!(copy.id, original.id);
            assert_eq!(copy.role, original.role);
            assert_eq!(copy.content, original.content);
            assert_eq!(copy.parent_id, original.parent_id);
        }
    }
}

#[tokio::test]
async fn test_branches_are_isolated_both_ways() {
    let (_dir, stores) = stores();
    for store in stores {
        let store = store.as_ref();
        let (source, ids) = seeded(store).await;
        let forked = branch(store, &source, &ids[2], Some("Waves")).await.unwrap();
        assert_eq!(store.get_conversation(&forked).await.unwrap().title, "Waves");

        store
            .save_message(&source, Some(&ids[3]), Role::User, "Source only")
            .await
            .unwrap();
        store
            .save_message(&forked, None, Role::Assistant, "Branch only")
            .await
            .unwrap();

        let source_contents: Vec<_> = store
            .list_messages(&source)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        let branch_contents: Vec<_> = store
            .list_messages(&forked)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();

        assert_eq!(source_contents.len(), 5);
        assert!(!source_contents.iter().any(|c| c == "Branch only"));
        assert_eq!(
            branch_contents,
            [
                "What is light?",
                "Electromagnetic radiation.",
                "Is it a wave?",
                "Branch only"
            ]
        );
    }
}

#[tokio::test]
async fn test_deleting_branch_leaves_source_intact() {
    let (_dir, stores) = stores();
    for store in stores {
        let store = store.as_ref();
        let (source, ids) = seeded(store).await;
        let forked = branch(store, &source, &ids[1], None).await.unwrap();

        store.delete_conversation(&forked).await.unwrap();

        let remaining: Vec<_> = store
            .list_messages(&source)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(remaining, ids);
        assert!(store.list_messages(&forked).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_deleting_source_leaves_branch_copies() {
    let (_dir, stores) = stores();
    for store in stores {
        let store = store.as_ref();
        let (source, ids) = seeded(store).await;
        let forked = branch(store, &source, &ids[2], None).await.unwrap();
        let before = store.list_messages(&forked).await.unwrap();

        store.delete_conversation(&source).await.unwrap();

        let after = store.list_messages(&forked).await.unwrap();
        assert_eq!(after, before);
        assert_eq!(after.len(), 3);
        assert_eq!(after[0].content, "What is light?");
        let info = store.get_conversation(&forked).await.unwrap();
        assert_eq!(info.parent_id, Some(source.clone()));
    }
}

#[tokio::test]
async fn test_cut_must_belong_to_conversation() {
    let (_dir, stores) = stores();
    for store in stores {
        let store = store.as_ref();
        let (source, _) = seeded(store).await;
        let (other, other_ids) = seeded(store).await;
        let before = store.list_conversations().await.unwrap().len();

        let err = branch(store, &source, &other_ids[0], None).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { entity: "message", .. }));

        let err = branch(store, &ConversationId::new(), &other_ids[0], None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { entity: "conversation", .. }));

        assert_eq!(store.list_conversations().await.unwrap().len(), before);
        assert_eq!(store.list_messages(&other).await.unwrap().len(), 4);
    }
}
