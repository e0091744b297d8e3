use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::db::MetaStore;
use crate::error::{KfError, Result};
use crate::events::EventBus;
use crate::gateway::ModelGateway;
use crate::models::{
    Task, TaskKind, TaskOutcome, TaskPriority, TaskResult, TaskStatus,
};
use crate::pipeline::{ChunkPipeline, TagPipeline};

/// Persistent priority queue driver: two cooperating loops over the same
/// task table. The HIGH loop polls for HIGH tasks only; the ALL loop
/// takes anything. Claiming is the only synchronization — no shared
/// in-memory queue exists.
pub struct TaskScheduler {
    store: Arc<dyn MetaStore>,
    gateway: ModelGateway,
    tagging: Arc<TagPipeline>,
    chunking: Arc<ChunkPipeline>,
    events: EventBus,
    high_poll_interval: Duration,
    all_poll_interval: Duration,
    pin_chain_window: chrono::Duration,
}

impl TaskScheduler {
    pub fn new(
        store: Arc<dyn MetaStore>,
        gateway: ModelGateway,
        tagging: Arc<TagPipeline>,
        chunking: Arc<ChunkPipeline>,
        events: EventBus,
        config: &Config,
    ) -> Self {
        Self {
            store,
            gateway,
            tagging,
            chunking,
            events,
            high_poll_interval: Duration::from_secs(config.scheduler.high_poll_interval_secs),
            all_poll_interval: Duration::from_secs(config.scheduler.all_poll_interval_secs),
            pin_chain_window: chrono::Duration::hours(config.scheduler.pin_chain_window_hours),
        }
    }

    /// Revert tasks a previous process left RUNNING. Must run before the
    /// workers start claiming.
    pub async fn startup_sweep(&self) -> Result<u64> {
        let swept = self.store.sweep_stale_running().await?;
        if swept > 0 {
            tracing::warn!(swept, "Reverted stale RUNNING tasks to PENDING");
        }
        Ok(swept)
    }

    /// Spawn the HIGH and ALL worker loops. Each loop drains the queue as
    /// fast as tasks complete and falls back to its poll interval when the
    /// queue is empty.
    pub fn spawn_workers(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::with_capacity(2);
        for (label, high_only, interval) in [
            ("high", true, self.high_poll_interval),
            ("all", false, self.all_poll_interval),
        ] {
            let scheduler = Arc::clone(self);
            let token = cancel.child_token();
            handles.push(tokio::spawn(async move {
                tracing::info!(worker = label, "Task worker started");
                loop {
                    if token.is_cancelled() {
                        tracing::info!(worker = label, "Task worker shutting down");
                        break;
                    }

                    let claimed = match scheduler.run_once(high_only).await {
                        Ok(claimed) => claimed,
                        Err(error) => {
                            tracing::error!(worker = label, error = %error, "Worker tick failed");
                            false
                        }
                    };

                    if claimed {
                        // Immediately look for more work.
                        continue;
                    }

                    tokio::select! {
                        _ = token.cancelled() => {
                            tracing::info!(worker = label, "Task worker shutting down");
                            break;
                        }
                        _ = tokio::time::sleep(interval) => {}
                    }
                }
            }));
        }
        handles
    }

    /// One claim-dispatch-finalize cycle. Returns whether a task was
    /// claimed. The claim and the final status write are each one short
    /// transaction; no lock is held across pipeline execution.
    pub async fn run_once(&self, high_only: bool) -> Result<bool> {
        let Some(claimed) = self.store.claim_next_task(high_only).await? else {
            return Ok(false);
        };

        // Work from a fresh snapshot, not the claim's returning row.
        let task = self
            .store
            .get_task(claimed.id)
            .await?
            .ok_or_else(|| KfError::NotFound(format!("Task {} disappeared", claimed.id)))?;

        tracing::info!(
            task_id = task.id,
            task_type = %task.task_type,
            priority = %task.priority,
            "Dispatching task"
        );

        match self.dispatch(&task).await {
            TaskOutcome::Completed(result) => {
                self.store
                    .finish_task(
                        task.id,
                        TaskStatus::Completed,
                        Some(TaskResult::Success),
                        Some(&result),
                    )
                    .await?;
                self.events
                    .task_completed(task.id, true, json!(result));
            }
            TaskOutcome::Failed(message) => {
                self.store
                    .finish_task(
                        task.id,
                        TaskStatus::Failed,
                        Some(TaskResult::Failure),
                        Some(&message),
                    )
                    .await?;
                self.events.task_completed(task.id, false, json!(message));
            }
            TaskOutcome::Deferred => {
                // Not a failure: back to PENDING, reclaimed on a later
                // poll. This is the backpressure while models load.
                tracing::warn!(
                    task_id = task.id,
                    "Required model unavailable, task deferred"
                );
                self.store
                    .finish_task(task.id, TaskStatus::Pending, None, None)
                    .await?;
            }
        }

        Ok(true)
    }

    async fn dispatch(&self, task: &Task) -> TaskOutcome {
        match self.execute(task).await {
            Ok(result) => TaskOutcome::Completed(result),
            Err(error) if error.is_model_unavailable() => {
                if let KfError::ModelUnavailable { missing } = &error {
                    self.events.model_validation_failed(
                        &missing.join(","),
                        "",
                        &error.to_string(),
                    );
                }
                TaskOutcome::Deferred
            }
            Err(error) => TaskOutcome::Failed(error.to_string()),
        }
    }

    async fn execute(&self, task: &Task) -> Result<String> {
        match task.task_type {
            TaskKind::Tagging => {
                if let Some(screening_result_id) = task.extra_i64("screening_result_id") {
                    let success = self.tagging.process_single(screening_result_id).await?;
                    if success {
                        self.maybe_chain_multivector(screening_result_id).await;
                        Ok("tagged 1 file".to_string())
                    } else {
                        Err(KfError::Internal(format!(
                            "Tagging failed for screening row {screening_result_id}"
                        )))
                    }
                } else {
                    let report = self.tagging.process_batch(task.id).await?;
                    Ok(serde_json::to_string(&report)?)
                }
            }
            TaskKind::Multivector => {
                let file_path = task
                    .extra_str("file_path")
                    .map(str::to_string)
                    .or_else(|| task.target_file_path.clone())
                    .ok_or_else(|| {
                        KfError::Validation(format!(
                            "MULTIVECTOR task {} carries no file_path",
                            task.id
                        ))
                    })?;
                self.chunking.process_document(&file_path).await?;
                Ok(format!("indexed {file_path}"))
            }
        }
    }

    /// After a successful single-file TAGGING task: if the file was pinned
    /// within the chain window, queue one HIGH MULTIVECTOR task for it.
    /// Older pins are assumed stale and skipped.
    async fn maybe_chain_multivector(&self, screening_result_id: i64) {
        if let Err(error) = self.try_chain_multivector(screening_result_id).await {
            tracing::error!(
                screening_result_id,
                error = %error,
                "MULTIVECTOR auto-chain check failed"
            );
        }
    }

    async fn try_chain_multivector(&self, screening_result_id: i64) -> Result<()> {
        let missing = self
            .gateway
            .missing_capabilities(&ChunkPipeline::REQUIRED_CAPABILITIES)
            .await?;
        if !missing.is_empty() {
            tracing::debug!(?missing, "Skipping auto-chain, chunking models unavailable");
            return Ok(());
        }

        let Some(row) = self.store.get_screening_by_id(screening_result_id).await? else {
            return Ok(());
        };

        let Some(pin) = self.store.latest_pin_for_path(&row.file_path).await? else {
            return Ok(());
        };
        if Utc::now() - pin.pinned_at > self.pin_chain_window {
            tracing::debug!(file_path = %row.file_path, "Pin outside chain window, skipping");
            return Ok(());
        }

        if self
            .store
            .has_open_task_for_path(TaskKind::Multivector, &row.file_path)
            .await?
        {
            tracing::debug!(file_path = %row.file_path, "MULTIVECTOR task already open");
            return Ok(());
        }

        let task = self
            .store
            .add_task(
                &format!("multivector: {}", row.file_name),
                TaskKind::Multivector,
                TaskPriority::High,
                Some(json!({ "file_path": row.file_path })),
                Some(&row.file_path),
            )
            .await?;
        tracing::info!(
            task_id = task.id,
            file_path = %row.file_path,
            "Chained MULTIVECTOR task for recently pinned file"
        );
        Ok(())
    }
}
