use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    Capability, CapabilityAssignment, ChatMessage, ChatSession, ChildChunk, Document,
    DocumentStatus, FileCategory, FileExtensionMapping, FileFilterRule, FileScreening, Metadata,
    ModelConfiguration, ModelProvider, NewChildChunk, NewFilterRule, NewParentChunk, ParentChunk,
    PinnedFile, ProjectRecognitionRule, ResolvedModel, RulePriority, SaveMessageRequest,
    ScreeningStatus, ScreeningSubmission, SessionStats, Tag, TagKind, TagSearchOperator, TagWeight,
    Task, TaskKind, TaskPriority, TaskResult, TaskStatus,
};

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MonitoredDirectory {
    pub id: i64,
    pub path: String,
    pub alias: Option<String>,
    pub is_blacklist: bool,
    pub parent_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct BundleExtension {
    pub id: i64,
    pub extension: String,
    pub os: String,
}

// ---------------------------------------------------------------------------
// Individual store traits
// ---------------------------------------------------------------------------

/// Screening-row lifecycle: watcher submissions in, pipeline status out.
#[async_trait]
pub trait ScreeningStore: Send + Sync {
    /// Insert, or reset to `pending` and refresh metadata when
    /// `(file_path, file_hash)` already exists.
    async fn upsert_screening(&self, submission: &ScreeningSubmission) -> Result<FileScreening>;
    /// Bulk variant; commits once.
    async fn upsert_screening_batch(&self, submissions: &[ScreeningSubmission]) -> Result<usize>;
    async fn get_screening_by_id(&self, id: i64) -> Result<Option<FileScreening>>;
    async fn get_screenings_by_ids(&self, ids: &[i64]) -> Result<Vec<FileScreening>>;
    async fn get_pending_screenings_for_task(&self, task_id: i64) -> Result<Vec<FileScreening>>;
    async fn update_screening_status(
        &self,
        id: i64,
        status: ScreeningStatus,
        error: Option<&str>,
    ) -> Result<()>;
    async fn stamp_tagged_time(&self, id: i64, when: DateTime<Utc>) -> Result<()>;
    /// Purge rows whose file_path starts with `prefix`; returns how many.
    async fn delete_screenings_under_prefix(&self, prefix: &str) -> Result<u64>;
}

/// Tag interning and the inverted index.
#[async_trait]
pub trait TagStore: Send + Sync {
    /// Existing tags plus newly created ones; UNIQUE collisions fall back
    /// to lookup instead of recursing.
    async fn get_or_create_tags(&self, names: &[String], kind: TagKind) -> Result<Vec<Tag>>;
    async fn get_all_tag_names(&self) -> Result<Vec<String>>;
    async fn get_tags_by_ids(&self, ids: &[i64]) -> Result<Vec<Tag>>;
    /// Unknown names are ignored, not errors.
    async fn get_tag_ids_by_names(&self, names: &[String]) -> Result<Vec<i64>>;
    /// Union with existing ids, write sorted CSV, rewrite the FTS mirror in
    /// the same transaction.
    async fn link_tags(&self, file_id: i64, tag_ids: &[i64]) -> Result<()>;
    async fn search_file_ids_by_tags(
        &self,
        tag_ids: &[i64],
        operator: TagSearchOperator,
    ) -> Result<Vec<i64>>;
    async fn tag_cloud(&self, limit: usize, min_weight: u64) -> Result<Vec<TagWeight>>;
}

/// Persistent priority queue.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn add_task(
        &self,
        name: &str,
        kind: TaskKind,
        priority: TaskPriority,
        extra_data: Option<serde_json::Value>,
        target_file_path: Option<&str>,
    ) -> Result<Task>;
    async fn get_task(&self, id: i64) -> Result<Option<Task>>;
    /// Atomically claim the highest-priority oldest PENDING task (optionally
    /// restricted to HIGH), mark it RUNNING and return a detached snapshot.
    /// Concurrent callers see disjoint tasks.
    async fn claim_next_task(&self, high_only: bool) -> Result<Option<Task>>;
    async fn finish_task(
        &self,
        id: i64,
        status: TaskStatus,
        result: Option<TaskResult>,
        message: Option<&str>,
    ) -> Result<()>;
    /// Startup sweep: any task left RUNNING by a previous process goes back
    /// to PENDING so it is reclaimed exactly once.
    async fn sweep_stale_running(&self) -> Result<u64>;
    /// True when a PENDING or RUNNING task of this kind already targets the
    /// path (dedup guard for auto-chaining).
    async fn has_open_task_for_path(&self, kind: TaskKind, file_path: &str) -> Result<bool>;
}

/// Documents and the parent/child chunk grain.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_document(&self, id: i64) -> Result<Option<Document>>;
    async fn get_document_by_path(&self, file_path: &str) -> Result<Option<Document>>;
    async fn get_documents_by_paths(&self, file_paths: &[String]) -> Result<Vec<Document>>;
    /// Insert or refresh the row for this path; resets status to
    /// `processing` and updates the hash and parse-cache pointer.
    async fn upsert_document(
        &self,
        file_path: &str,
        file_hash: &str,
        docling_json_path: Option<&str>,
    ) -> Result<Document>;
    async fn set_document_status(
        &self,
        id: i64,
        status: DocumentStatus,
        processed_at: Option<DateTime<Utc>>,
    ) -> Result<()>;
    /// One transaction; returns assigned ids in input order.
    async fn insert_parent_chunks(&self, chunks: &[NewParentChunk]) -> Result<Vec<i64>>;
    /// One transaction; returns assigned ids in input order.
    async fn insert_child_chunks(&self, chunks: &[NewChildChunk]) -> Result<Vec<i64>>;
    async fn get_parent_chunks_by_ids(&self, ids: &[i64]) -> Result<Vec<ParentChunk>>;
    async fn get_child_chunks_by_document(&self, document_id: i64) -> Result<Vec<ChildChunk>>;
    async fn delete_chunks_by_document(&self, document_id: i64) -> Result<()>;
    async fn delete_document(&self, id: i64) -> Result<bool>;
    async fn get_documents_under_prefix(&self, prefix: &str) -> Result<Vec<Document>>;
}

/// Chat sessions, messages and the pinned-file set.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, name: &str, metadata: Option<Metadata>) -> Result<ChatSession>;
    async fn list_sessions(&self) -> Result<Vec<ChatSession>>;
    async fn get_session(&self, id: i64) -> Result<Option<ChatSession>>;
    async fn update_session(
        &self,
        id: i64,
        name: Option<&str>,
        metadata: Option<Metadata>,
    ) -> Result<ChatSession>;
    /// Soft delete (`is_active = false`).
    async fn delete_session(&self, id: i64) -> Result<bool>;
    async fn save_message(
        &self,
        session_id: i64,
        message: &SaveMessageRequest,
    ) -> Result<ChatMessage>;
    async fn get_messages(
        &self,
        session_id: i64,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ChatMessage>>;
    async fn pin_file(
        &self,
        session_id: i64,
        file_path: &str,
        file_name: &str,
        metadata: Option<Metadata>,
    ) -> Result<PinnedFile>;
    /// Removes the join row only; returns whether a row existed.
    async fn unpin_file(&self, session_id: i64, file_path: &str) -> Result<bool>;
    async fn get_pinned_files(&self, session_id: i64) -> Result<Vec<PinnedFile>>;
    /// Most recent pin for a path across sessions (drives the 24 h
    /// auto-chain window).
    async fn latest_pin_for_path(&self, file_path: &str) -> Result<Option<PinnedFile>>;
    async fn session_stats(&self, session_id: i64) -> Result<SessionStats>;
}

/// Provider registry and capability assignments.
#[async_trait]
pub trait ModelConfigStore: Send + Sync {
    async fn list_providers(&self) -> Result<Vec<ModelProvider>>;
    async fn get_provider(&self, id: i64) -> Result<Option<ModelProvider>>;
    async fn add_provider(
        &self,
        kind: &str,
        display_name: &str,
        base_url: Option<&str>,
        api_key: Option<&str>,
    ) -> Result<ModelProvider>;
    async fn update_provider(
        &self,
        id: i64,
        display_name: Option<&str>,
        base_url: Option<&str>,
        api_key: Option<&str>,
        use_proxy: Option<bool>,
        is_active: Option<bool>,
    ) -> Result<ModelProvider>;
    async fn list_configurations(&self, provider_id: i64) -> Result<Vec<ModelConfiguration>>;
    async fn get_configuration(&self, id: i64) -> Result<Option<ModelConfiguration>>;
    /// Insert if `(provider_id, model_identifier)` is new; returns the row
    /// either way.
    async fn upsert_configuration(
        &self,
        provider_id: i64,
        model_identifier: &str,
        display_name: &str,
        max_context_length: Option<u32>,
        max_output_tokens: Option<u32>,
    ) -> Result<ModelConfiguration>;
    async fn add_capability(&self, configuration_id: i64, capability: Capability) -> Result<()>;
    async fn assign_capability(
        &self,
        capability: Capability,
        configuration_id: i64,
    ) -> Result<CapabilityAssignment>;
    async fn clear_capability_assignment(&self, capability: Capability) -> Result<bool>;
    /// Resolve capability → model through the active assignment; `None`
    /// when unassigned, provider inactive, or configuration disabled.
    async fn resolve_capability(&self, capability: Capability) -> Result<Option<ResolvedModel>>;
}

/// File categories, the extension→category map and the screening rules
/// the watcher pulls before producing candidate files. Defaults are
/// seeded at schema init; user edits overlay them.
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn list_categories(&self) -> Result<Vec<FileCategory>>;
    async fn upsert_category(
        &self,
        name: &str,
        description: Option<&str>,
        icon: Option<&str>,
    ) -> Result<FileCategory>;
    async fn list_extension_mappings(&self) -> Result<Vec<FileExtensionMapping>>;
    async fn upsert_extension_mapping(
        &self,
        extension: &str,
        category_id: i64,
        priority: RulePriority,
    ) -> Result<FileExtensionMapping>;
    async fn list_filter_rules(&self, enabled_only: bool) -> Result<Vec<FileFilterRule>>;
    async fn add_filter_rule(&self, rule: &NewFilterRule) -> Result<FileFilterRule>;
    async fn set_filter_rule_enabled(&self, id: i64, enabled: bool) -> Result<FileFilterRule>;
    async fn list_project_rules(&self, enabled_only: bool)
        -> Result<Vec<ProjectRecognitionRule>>;
}

/// System config KV, monitored directories, bundle extensions.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_config_value(&self, key: &str) -> Result<Option<String>>;
    async fn set_config_value(&self, key: &str, value: &str) -> Result<()>;
    async fn list_directories(&self) -> Result<Vec<MonitoredDirectory>>;
    async fn add_directory(
        &self,
        path: &str,
        alias: Option<&str>,
        is_blacklist: bool,
        parent_id: Option<i64>,
    ) -> Result<MonitoredDirectory>;
    async fn update_directory(
        &self,
        id: i64,
        alias: Option<&str>,
        is_blacklist: Option<bool>,
    ) -> Result<MonitoredDirectory>;
    async fn delete_directory(&self, id: i64) -> Result<bool>;
    async fn list_bundle_extensions(&self, os: Option<&str>) -> Result<Vec<BundleExtension>>;
    async fn add_bundle_extension(&self, extension: &str, os: &str) -> Result<BundleExtension>;
    async fn delete_bundle_extension(&self, id: i64) -> Result<bool>;
}

// ---------------------------------------------------------------------------
// Unified backend supertrait
// ---------------------------------------------------------------------------

/// The complete metadata store. MetaStore exclusively owns every row; the
/// vector store owns vector blobs and is cascaded by callers.
#[async_trait]
pub trait MetaStore:
    ScreeningStore
    + TagStore
    + TaskStore
    + DocumentStore
    + SessionStore
    + ModelConfigStore
    + RuleStore
    + SettingsStore
{
}
