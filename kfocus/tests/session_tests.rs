mod common;

use kfocus::models::{MessageRole, SaveMessageRequest};
use pretty_assertions::assert_eq;

fn message(message_id: &str, role: MessageRole, content: &str) -> SaveMessageRequest {
    SaveMessageRequest {
        message_id: message_id.to_string(),
        role,
        content: content.to_string(),
        parts: Some(serde_json::json!([{ "type": "text", "text": content }])),
        metadata: None,
        sources: Some(serde_json::json!([{ "file_path": "/docs/a.pdf" }])),
    }
}

#[tokio::test]
async fn messages_round_trip_through_the_store() {
    let store = common::memory_store().await;
    let session = store.create_session("roundtrip", None).await.unwrap();

    store
        .save_message(session.id, &message("m1", MessageRole::User, "hello"))
        .await
        .unwrap();
    store
        .save_message(session.id, &message("m2", MessageRole::Assistant, "hi there"))
        .await
        .unwrap();

    let messages = store.get_messages(session.id, 100, 0).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].message_id, "m1");
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[0].content, "hello");
    assert_eq!(
        messages[0].sources,
        Some(serde_json::json!([{ "file_path": "/docs/a.pdf" }]))
    );
    assert_eq!(messages[1].role, MessageRole::Assistant);
}

#[tokio::test]
async fn pin_then_unpin_restores_the_initial_set() {
    let store = common::memory_store().await;
    let session = store.create_session("pins", None).await.unwrap();

    assert!(store.get_pinned_files(session.id).await.unwrap().is_empty());

    store
        .pin_file(session.id, "/docs/a.pdf", "a.pdf", None)
        .await
        .unwrap();
    let pinned = store.get_pinned_files(session.id).await.unwrap();
    assert_eq!(pinned.len(), 1);
    assert_eq!(pinned[0].file_path, "/docs/a.pdf");

    let removed = store.unpin_file(session.id, "/docs/a.pdf").await.unwrap();
    assert!(removed);
    assert!(store.get_pinned_files(session.id).await.unwrap().is_empty());

    // Unpinning again is a no-op, not an error.
    assert!(!store.unpin_file(session.id, "/docs/a.pdf").await.unwrap());
}

#[tokio::test]
async fn repinning_refreshes_pinned_at() {
    let store = common::memory_store().await;
    let session = store.create_session("repin", None).await.unwrap();

    let first = store
        .pin_file(session.id, "/docs/a.pdf", "a.pdf", None)
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let second = store
        .pin_file(session.id, "/docs/a.pdf", "a.pdf", None)
        .await
        .unwrap();

    assert_eq!(first.id, second.id, "unique per (session, path)");
    assert!(second.pinned_at >= first.pinned_at);

    let latest = store
        .latest_pin_for_path("/docs/a.pdf")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.pinned_at, second.pinned_at);
}

#[tokio::test]
async fn soft_deleted_sessions_disappear_from_reads() {
    let store = common::memory_store().await;
    let session = store.create_session("ephemeral", None).await.unwrap();

    assert!(store.delete_session(session.id).await.unwrap());
    assert!(store.get_session(session.id).await.unwrap().is_none());
    assert!(store
        .list_sessions()
        .await
        .unwrap()
        .iter()
        .all(|s| s.id != session.id));

    // Second delete finds nothing active.
    assert!(!store.delete_session(session.id).await.unwrap());
}

#[tokio::test]
async fn session_stats_count_messages_and_pins() {
    let store = common::memory_store().await;
    let session = store.create_session("stats", None).await.unwrap();

    store
        .save_message(session.id, &message("m1", MessageRole::User, "one"))
        .await
        .unwrap();
    store
        .save_message(session.id, &message("m2", MessageRole::Assistant, "two"))
        .await
        .unwrap();
    store
        .pin_file(session.id, "/docs/a.pdf", "a.pdf", None)
        .await
        .unwrap();

    let stats = store.session_stats(session.id).await.unwrap();
    assert_eq!(stats.message_count, 2);
    assert_eq!(stats.pinned_file_count, 1);
    assert!(stats.last_activity.is_some());
}

#[tokio::test]
async fn update_session_renames_without_touching_metadata() {
    let store = common::memory_store().await;
    let mut metadata = kfocus::models::Metadata::new();
    metadata.insert("origin".into(), serde_json::json!("test"));

    let session = store
        .create_session("old name", Some(metadata))
        .await
        .unwrap();
    let updated = store
        .update_session(session.id, Some("new name"), None)
        .await
        .unwrap();

    assert_eq!(updated.name, "new name");
    assert_eq!(
        updated.metadata.unwrap().get("origin"),
        Some(&serde_json::json!("test"))
    );
}
