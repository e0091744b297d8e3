mod common;

use kfocus::models::{TaskKind, TaskPriority, TaskResult, TaskStatus};
use serde_json::json;

#[tokio::test]
async fn claim_respects_priority_then_fifo() {
    let store = common::memory_store().await;

    let low = store
        .add_task("low", TaskKind::Tagging, TaskPriority::Low, None, None)
        .await
        .unwrap();
    let medium_first = store
        .add_task("m1", TaskKind::Tagging, TaskPriority::Medium, None, None)
        .await
        .unwrap();
    let medium_second = store
        .add_task("m2", TaskKind::Tagging, TaskPriority::Medium, None, None)
        .await
        .unwrap();
    let high = store
        .add_task("high", TaskKind::Multivector, TaskPriority::High, None, None)
        .await
        .unwrap();

    let order: Vec<i64> = {
        let mut ids = Vec::new();
        while let Some(task) = store.claim_next_task(false).await.unwrap() {
            ids.push(task.id);
        }
        ids
    };

    assert_eq!(order, vec![high.id, medium_first.id, medium_second.id, low.id]);
}

#[tokio::test]
async fn high_only_claims_skip_lower_priorities() {
    let store = common::memory_store().await;

    store
        .add_task("medium", TaskKind::Tagging, TaskPriority::Medium, None, None)
        .await
        .unwrap();

    assert!(store.claim_next_task(true).await.unwrap().is_none());

    let high = store
        .add_task("high", TaskKind::Tagging, TaskPriority::High, None, None)
        .await
        .unwrap();
    let claimed = store.claim_next_task(true).await.unwrap().unwrap();
    assert_eq!(claimed.id, high.id);
    assert_eq!(claimed.status, TaskStatus::Running);
    assert!(claimed.start_time.is_some());
}

#[tokio::test]
async fn concurrent_claimers_see_disjoint_tasks() {
    let store = common::memory_store().await;

    for i in 0..20 {
        store
            .add_task(
                &format!("task {i}"),
                TaskKind::Tagging,
                TaskPriority::Medium,
                None,
                None,
            )
            .await
            .unwrap();
    }

    let mut claimed = Vec::new();
    loop {
        let a = store.claim_next_task(false).await.unwrap();
        let b = store.claim_next_task(false).await.unwrap();
        let before = claimed.len();
        claimed.extend(a.into_iter().map(|t| t.id));
        claimed.extend(b.into_iter().map(|t| t.id));
        if claimed.len() == before {
            break;
        }
    }

    claimed.sort_unstable();
    let mut deduped = claimed.clone();
    deduped.dedup();
    assert_eq!(claimed.len(), 20, "every task claimed exactly once");
    assert_eq!(claimed, deduped, "no task claimed twice");
}

#[tokio::test]
async fn stale_running_tasks_sweep_back_to_pending() {
    let store = common::memory_store().await;

    let task = store
        .add_task("interrupted", TaskKind::Multivector, TaskPriority::High, None, None)
        .await
        .unwrap();
    store.claim_next_task(true).await.unwrap().unwrap();

    // Simulated crash: nothing finishes the task. The sweep recovers it.
    let swept = store.sweep_stale_running().await.unwrap();
    assert_eq!(swept, 1);

    let recovered = store.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(recovered.status, TaskStatus::Pending);

    let reclaimed = store.claim_next_task(false).await.unwrap().unwrap();
    assert_eq!(reclaimed.id, task.id);
}

#[tokio::test]
async fn deferred_task_returns_to_pending_and_is_reclaimable() {
    let store = common::memory_store().await;

    let task = store
        .add_task(
            "needs models",
            TaskKind::Multivector,
            TaskPriority::High,
            Some(json!({ "file_path": "/tmp/report.pdf" })),
            Some("/tmp/report.pdf"),
        )
        .await
        .unwrap();

    let claimed = store.claim_next_task(true).await.unwrap().unwrap();
    assert_eq!(claimed.id, task.id);

    // Deferral writes PENDING without a result; the task is not failed.
    store
        .finish_task(task.id, TaskStatus::Pending, None, None)
        .await
        .unwrap();

    let after = store.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(after.status, TaskStatus::Pending);
    assert!(after.result.is_none());

    let reclaimed = store.claim_next_task(true).await.unwrap().unwrap();
    assert_eq!(reclaimed.id, task.id);
}

#[tokio::test]
async fn finish_task_records_terminal_state() {
    let store = common::memory_store().await;

    let task = store
        .add_task("doomed", TaskKind::Tagging, TaskPriority::Low, None, None)
        .await
        .unwrap();
    store.claim_next_task(false).await.unwrap().unwrap();
    store
        .finish_task(
            task.id,
            TaskStatus::Failed,
            Some(TaskResult::Failure),
            Some("parse exploded"),
        )
        .await
        .unwrap();

    let finished = store.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(finished.status, TaskStatus::Failed);
    assert_eq!(finished.result, Some(TaskResult::Failure));
    assert_eq!(finished.error_message.as_deref(), Some("parse exploded"));

    assert!(store.claim_next_task(false).await.unwrap().is_none());
}

#[tokio::test]
async fn open_task_lookup_matches_target_and_extra_path() {
    let store = common::memory_store().await;

    store
        .add_task(
            "mv",
            TaskKind::Multivector,
            TaskPriority::High,
            Some(json!({ "file_path": "/docs/a.pdf" })),
            None,
        )
        .await
        .unwrap();

    assert!(store
        .has_open_task_for_path(TaskKind::Multivector, "/docs/a.pdf")
        .await
        .unwrap());
    assert!(!store
        .has_open_task_for_path(TaskKind::Multivector, "/docs/b.pdf")
        .await
        .unwrap());
    assert!(!store
        .has_open_task_for_path(TaskKind::Tagging, "/docs/a.pdf")
        .await
        .unwrap());
}
