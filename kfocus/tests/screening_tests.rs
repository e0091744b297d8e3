mod common;

use kfocus::models::ScreeningStatus;

#[tokio::test]
async fn resubmitting_same_pair_resets_to_pending() {
    let store = common::memory_store().await;
    let submission = common::submission("/docs/report.pdf", "abc123");

    let first = store.upsert_screening(&submission).await.unwrap();
    assert_eq!(first.status, ScreeningStatus::Pending);

    store
        .update_screening_status(first.id, ScreeningStatus::Processed, None)
        .await
        .unwrap();

    // Same (path, hash): one row, forced back to pending.
    let second = store.upsert_screening(&submission).await.unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(second.status, ScreeningStatus::Pending);

    let rows = store.get_screenings_by_ids(&[first.id]).await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn different_hash_creates_a_new_row() {
    let store = common::memory_store().await;

    let v1 = store
        .upsert_screening(&common::submission("/docs/report.pdf", "hash-v1"))
        .await
        .unwrap();
    let v2 = store
        .upsert_screening(&common::submission("/docs/report.pdf", "hash-v2"))
        .await
        .unwrap();
    assert_ne!(v1.id, v2.id);
}

#[tokio::test]
async fn batch_upsert_accepts_all_rows() {
    let store = common::memory_store().await;

    let batch: Vec<_> = (0..5)
        .map(|i| common::submission(&format!("/docs/file{i}.txt"), &format!("hash{i}")))
        .collect();
    let accepted = store.upsert_screening_batch(&batch).await.unwrap();
    assert_eq!(accepted, 5);
}

#[tokio::test]
async fn pending_rows_are_scoped_to_their_task() {
    let store = common::memory_store().await;

    let mut tagged = common::submission("/docs/in-task.txt", "h1");
    tagged.task_id = Some(42);
    store.upsert_screening(&tagged).await.unwrap();
    store
        .upsert_screening(&common::submission("/docs/no-task.txt", "h2"))
        .await
        .unwrap();

    let pending = store.get_pending_screenings_for_task(42).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].file_path, "/docs/in-task.txt");
}

#[tokio::test]
async fn failure_records_the_error_message() {
    let store = common::memory_store().await;
    let row = store
        .upsert_screening(&common::submission("/docs/broken.pdf", "h"))
        .await
        .unwrap();

    store
        .update_screening_status(row.id, ScreeningStatus::Failed, Some("extraction failed"))
        .await
        .unwrap();

    let reloaded = store.get_screening_by_id(row.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, ScreeningStatus::Failed);
    assert_eq!(reloaded.error_message.as_deref(), Some("extraction failed"));
}

#[tokio::test]
async fn prefix_purge_removes_rows_and_spares_others() {
    let store = common::memory_store().await;

    store
        .upsert_screening(&common::submission("/blacklisted/a.txt", "h1"))
        .await
        .unwrap();
    store
        .upsert_screening(&common::submission("/blacklisted/sub/b.txt", "h2"))
        .await
        .unwrap();
    let kept = store
        .upsert_screening(&common::submission("/kept/c.txt", "h3"))
        .await
        .unwrap();

    let purged = store
        .delete_screenings_under_prefix("/blacklisted/")
        .await
        .unwrap();
    assert_eq!(purged, 2);

    assert!(store.get_screening_by_id(kept.id).await.unwrap().is_some());
}
