use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;

use crate::cache::TtlCache;
use crate::config::Config;
use crate::db::MetaStore;
use crate::error::Result;
use crate::events::EventBus;
use crate::gateway::{ChatTurn, ModelGateway};
use crate::models::{
    normalize_tag_name, Capability, FileScreening, ScreeningStatus, TagKind,
};

use super::extract::{extract_text, truncate_chars};
use super::prompts::{tagging_prompt, TAGGING_SYSTEM_PROMPT};

const MAX_TAGS_PER_FILE: usize = 3;

#[derive(Debug, Deserialize)]
struct TagsResponse {
    tags: Vec<String>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct BatchReport {
    pub processed: usize,
    pub success_count: usize,
    pub failed_count: usize,
}

/// File tagging: extract a content summary, ask the model for 0-3 tags,
/// intern them and link them to the screening row.
pub struct TagPipeline {
    store: Arc<dyn MetaStore>,
    gateway: ModelGateway,
    events: EventBus,
    /// All existing tag names, offered to the model as reuse candidates.
    candidate_cache: TtlCache<(), Vec<String>>,
    summary_chars: usize,
    batch_file_delay: Duration,
}

impl TagPipeline {
    pub fn new(
        store: Arc<dyn MetaStore>,
        gateway: ModelGateway,
        events: EventBus,
        config: &Config,
    ) -> Self {
        Self {
            store,
            gateway,
            events,
            candidate_cache: TtlCache::new(4, Duration::from_secs(config.cache.tag_ttl_secs)),
            summary_chars: config.tagging.summary_chars,
            batch_file_delay: Duration::from_millis(config.scheduler.batch_file_delay_ms),
        }
    }

    pub const REQUIRED_CAPABILITIES: [Capability; 1] = [Capability::StructuredOutput];

    /// Single high-priority file. Marks the row processed/failed and
    /// returns whether tagging succeeded.
    pub async fn process_single(&self, screening_result_id: i64) -> Result<bool> {
        self.gateway
            .require_capabilities(&Self::REQUIRED_CAPABILITIES)
            .await?;

        let Some(row) = self.store.get_screening_by_id(screening_result_id).await? else {
            tracing::error!(screening_result_id, "Screening row not found");
            return Ok(false);
        };

        match self.tag_file(&row).await {
            Ok(()) => {
                self.store
                    .update_screening_status(row.id, ScreeningStatus::Processed, None)
                    .await?;
                Ok(true)
            }
            Err(error) => {
                if error.is_model_unavailable() {
                    return Err(error);
                }
                tracing::error!(file_path = %row.file_path, error = %error, "Tagging failed");
                self.store
                    .update_screening_status(
                        row.id,
                        ScreeningStatus::Failed,
                        Some(&error.to_string()),
                    )
                    .await?;
                Ok(false)
            }
        }
    }

    /// Batch over all pending rows of a task. Per-file errors mark that
    /// row failed and the batch continues; only model unavailability
    /// aborts (so the scheduler can defer the task as a whole).
    pub async fn process_batch(&self, task_id: i64) -> Result<BatchReport> {
        self.gateway
            .require_capabilities(&Self::REQUIRED_CAPABILITIES)
            .await?;

        let rows = self.store.get_pending_screenings_for_task(task_id).await?;
        if rows.is_empty() {
            tracing::info!(task_id, "No pending files in batch");
            return Ok(BatchReport::default());
        }

        let total = rows.len();
        tracing::info!(task_id, total, "Processing tagging batch");
        let mut report = BatchReport::default();

        for (index, row) in rows.iter().enumerate() {
            report.processed += 1;

            match self.tag_file(row).await {
                Ok(()) => {
                    self.store
                        .update_screening_status(row.id, ScreeningStatus::Processed, None)
                        .await?;
                    report.success_count += 1;
                }
                Err(error) if error.is_model_unavailable() => return Err(error),
                Err(error) => {
                    tracing::error!(file_path = %row.file_path, error = %error, "Tagging failed");
                    self.store
                        .update_screening_status(
                            row.id,
                            ScreeningStatus::Failed,
                            Some(&error.to_string()),
                        )
                        .await?;
                    report.failed_count += 1;
                }
            }

            self.events.progress(
                "screening",
                (index + 1) as u64,
                total as u64,
                &row.file_name,
            );
            // Smooth the load on the model endpoint between files.
            tokio::time::sleep(self.batch_file_delay).await;
        }

        tracing::info!(
            task_id,
            processed = report.processed,
            succeeded = report.success_count,
            failed = report.failed_count,
            "Tagging batch finished"
        );
        Ok(report)
    }

    /// The per-file contract: 0-3 tags interned and linked, `tagged_time`
    /// stamped, one `tags-updated` event. Idempotent on re-runs.
    async fn tag_file(&self, row: &FileScreening) -> Result<()> {
        // Already tagged since the last modification: no-op.
        if let (Some(tagged), Some(modified)) = (row.tagged_time, row.modified_time) {
            if tagged > modified {
                tracing::debug!(file_path = %row.file_path, "Already tagged, skipping");
                return Ok(());
            }
        }

        let path = Path::new(&row.file_path);
        if !path.exists() {
            return Err(crate::error::KfError::NotFound(format!(
                "File not found: {}",
                row.file_path
            )));
        }

        let content = extract_text(path)?;
        if content.trim().is_empty() {
            // Nothing taggable; still processed.
            self.store.stamp_tagged_time(row.id, Utc::now()).await?;
            return Ok(());
        }
        let summary = truncate_chars(&content, self.summary_chars);

        let candidates = self.candidate_tag_names().await?;
        let turns = [
            ChatTurn::system(TAGGING_SYSTEM_PROMPT),
            ChatTurn::user(tagging_prompt(summary, &candidates)),
        ];
        let response: TagsResponse = self.gateway.chat_structured(&turns).await?;

        let mut names: Vec<String> = response
            .tags
            .iter()
            .map(|raw| normalize_tag_name(raw))
            .filter(|name| !name.is_empty())
            .collect();
        names.dedup();
        names.truncate(MAX_TAGS_PER_FILE);

        if !names.is_empty() {
            let tags = self.store.get_or_create_tags(&names, TagKind::Llm).await?;
            let tag_ids: Vec<i64> = tags.iter().map(|t| t.id).collect();
            self.store.link_tags(row.id, &tag_ids).await?;
            // New names invalidate the candidate list.
            self.candidate_cache.invalidate(&());
        }

        self.store.stamp_tagged_time(row.id, Utc::now()).await?;
        self.events.tags_updated();
        Ok(())
    }

    async fn candidate_tag_names(&self) -> Result<Vec<String>> {
        if let Some(names) = self.candidate_cache.get(&()) {
            return Ok(names);
        }
        let names = self.store.get_all_tag_names().await?;
        self.candidate_cache.insert((), names.clone());
        Ok(names)
    }
}
