use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::connection::Database;
use crate::db::repository::{
    DocumentRepository, ModelConfigRepository, RuleRepository, ScreeningRepository,
    SessionRepository, SettingsRepository, TagRepository, TaskRepository,
};
use crate::db::traits::{
    BundleExtension, DocumentStore, MetaStore, ModelConfigStore, MonitoredDirectory, RuleStore,
    ScreeningStore, SessionStore, SettingsStore, TagStore, TaskStore,
};
use crate::error::Result;
use crate::models::{
    Capability, CapabilityAssignment, ChatMessage, ChatSession, ChildChunk, Document,
    DocumentStatus, FileCategory, FileExtensionMapping, FileFilterRule, FileScreening, Metadata,
    ModelConfiguration, ModelProvider, NewChildChunk, NewFilterRule, NewParentChunk, ParentChunk,
    PinnedFile, ProjectRecognitionRule, ResolvedModel, RulePriority, SaveMessageRequest,
    ScreeningStatus, ScreeningSubmission, SessionStats, Tag, TagKind, TagSearchOperator, TagWeight,
    Task, TaskKind, TaskPriority, TaskResult, TaskStatus,
};

pub struct LibSqlBackend {
    db: Database,
}

impl LibSqlBackend {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ScreeningStore for LibSqlBackend {
    async fn upsert_screening(&self, submission: &ScreeningSubmission) -> Result<FileScreening> {
        let conn = self.db.connect()?;
        ScreeningRepository::upsert(&conn, submission).await
    }
    async fn upsert_screening_batch(&self, submissions: &[ScreeningSubmission]) -> Result<usize> {
        let conn = self.db.connect()?;
        ScreeningRepository::upsert_batch(&conn, submissions).await
    }
    async fn get_screening_by_id(&self, id: i64) -> Result<Option<FileScreening>> {
        let conn = self.db.connect()?;
        ScreeningRepository::get_by_id(&conn, id).await
    }
    async fn get_screenings_by_ids(&self, ids: &[i64]) -> Result<Vec<FileScreening>> {
        let conn = self.db.connect()?;
        ScreeningRepository::get_by_ids(&conn, ids).await
    }
    async fn get_pending_screenings_for_task(&self, task_id: i64) -> Result<Vec<FileScreening>> {
        let conn = self.db.connect()?;
        ScreeningRepository::get_pending_for_task(&conn, task_id).await
    }
    async fn update_screening_status(
        &self,
        id: i64,
        status: ScreeningStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let conn = self.db.connect()?;
        ScreeningRepository::update_status(&conn, id, status, error).await
    }
    async fn stamp_tagged_time(&self, id: i64, when: DateTime<Utc>) -> Result<()> {
        let conn = self.db.connect()?;
        ScreeningRepository::stamp_tagged_time(&conn, id, when).await
    }
    async fn delete_screenings_under_prefix(&self, prefix: &str) -> Result<u64> {
        let conn = self.db.connect()?;
        ScreeningRepository::delete_under_prefix(&conn, prefix).await
    }
}

#[async_trait]
impl TagStore for LibSqlBackend {
    async fn get_or_create_tags(&self, names: &[String], kind: TagKind) -> Result<Vec<Tag>> {
        let conn = self.db.connect()?;
        TagRepository::get_or_create(&conn, names, kind).await
    }
    async fn get_all_tag_names(&self) -> Result<Vec<String>> {
        let conn = self.db.connect()?;
        TagRepository::get_all_names(&conn).await
    }
    async fn get_tags_by_ids(&self, ids: &[i64]) -> Result<Vec<Tag>> {
        let conn = self.db.connect()?;
        TagRepository::get_by_ids(&conn, ids).await
    }
    async fn get_tag_ids_by_names(&self, names: &[String]) -> Result<Vec<i64>> {
        let conn = self.db.connect()?;
        Ok(TagRepository::get_by_names(&conn, names)
            .await?
            .into_iter()
            .map(|t| t.id)
            .collect())
    }
    async fn link_tags(&self, file_id: i64, tag_ids: &[i64]) -> Result<()> {
        let conn = self.db.connect()?;
        TagRepository::link_to_file(&conn, file_id, tag_ids).await
    }
    async fn search_file_ids_by_tags(
        &self,
        tag_ids: &[i64],
        operator: TagSearchOperator,
    ) -> Result<Vec<i64>> {
        let conn = self.db.connect()?;
        TagRepository::search_file_ids(&conn, tag_ids, operator).await
    }
    async fn tag_cloud(&self, limit: usize, min_weight: u64) -> Result<Vec<TagWeight>> {
        let conn = self.db.connect()?;
        TagRepository::tag_cloud(&conn, limit, min_weight).await
    }
}

#[async_trait]
impl TaskStore for LibSqlBackend {
    async fn add_task(
        &self,
        name: &str,
        kind: TaskKind,
        priority: TaskPriority,
        extra_data: Option<serde_json::Value>,
        target_file_path: Option<&str>,
    ) -> Result<Task> {
        let conn = self.db.connect()?;
        TaskRepository::add(&conn, name, kind, priority, extra_data, target_file_path).await
    }
    async fn get_task(&self, id: i64) -> Result<Option<Task>> {
        let conn = self.db.connect()?;
        TaskRepository::get(&conn, id).await
    }
    async fn claim_next_task(&self, high_only: bool) -> Result<Option<Task>> {
        let conn = self.db.connect()?;
        TaskRepository::claim_next(&conn, high_only).await
    }
    async fn finish_task(
        &self,
        id: i64,
        status: TaskStatus,
        result: Option<TaskResult>,
        message: Option<&str>,
    ) -> Result<()> {
        let conn = self.db.connect()?;
        TaskRepository::finish(&conn, id, status, result, message).await
    }
    async fn sweep_stale_running(&self) -> Result<u64> {
        let conn = self.db.connect()?;
        TaskRepository::sweep_stale_running(&conn).await
    }
    async fn has_open_task_for_path(&self, kind: TaskKind, file_path: &str) -> Result<bool> {
        let conn = self.db.connect()?;
        TaskRepository::has_open_for_path(&conn, kind, file_path).await
    }
}

#[async_trait]
impl DocumentStore for LibSqlBackend {
    async fn get_document(&self, id: i64) -> Result<Option<Document>> {
        let conn = self.db.connect()?;
        DocumentRepository::get(&conn, id).await
    }
    async fn get_document_by_path(&self, file_path: &str) -> Result<Option<Document>> {
        let conn = self.db.connect()?;
        DocumentRepository::get_by_path(&conn, file_path).await
    }
    async fn get_documents_by_paths(&self, file_paths: &[String]) -> Result<Vec<Document>> {
        let conn = self.db.connect()?;
        DocumentRepository::get_by_paths(&conn, file_paths).await
    }
    async fn upsert_document(
        &self,
        file_path: &str,
        file_hash: &str,
        docling_json_path: Option<&str>,
    ) -> Result<Document> {
        let conn = self.db.connect()?;
        DocumentRepository::upsert(&conn, file_path, file_hash, docling_json_path).await
    }
    async fn set_document_status(
        &self,
        id: i64,
        status: DocumentStatus,
        processed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let conn = self.db.connect()?;
        DocumentRepository::set_status(&conn, id, status, processed_at).await
    }
    async fn insert_parent_chunks(&self, chunks: &[NewParentChunk]) -> Result<Vec<i64>> {
        let conn = self.db.connect()?;
        DocumentRepository::insert_parents(&conn, chunks).await
    }
    async fn insert_child_chunks(&self, chunks: &[NewChildChunk]) -> Result<Vec<i64>> {
        let conn = self.db.connect()?;
        DocumentRepository::insert_children(&conn, chunks).await
    }
    async fn get_parent_chunks_by_ids(&self, ids: &[i64]) -> Result<Vec<ParentChunk>> {
        let conn = self.db.connect()?;
        DocumentRepository::get_parents_by_ids(&conn, ids).await
    }
    async fn get_child_chunks_by_document(&self, document_id: i64) -> Result<Vec<ChildChunk>> {
        let conn = self.db.connect()?;
        DocumentRepository::get_children_by_document(&conn, document_id).await
    }
    async fn delete_chunks_by_document(&self, document_id: i64) -> Result<()> {
        let conn = self.db.connect()?;
        DocumentRepository::delete_chunks_by_document(&conn, document_id).await
    }
    async fn delete_document(&self, id: i64) -> Result<bool> {
        let conn = self.db.connect()?;
        DocumentRepository::delete(&conn, id).await
    }
    async fn get_documents_under_prefix(&self, prefix: &str) -> Result<Vec<Document>> {
        let conn = self.db.connect()?;
        DocumentRepository::get_under_prefix(&conn, prefix).await
    }
}

#[async_trait]
impl SessionStore for LibSqlBackend {
    async fn create_session(&self, name: &str, metadata: Option<Metadata>) -> Result<ChatSession> {
        let conn = self.db.connect()?;
        SessionRepository::create(&conn, name, metadata).await
    }
    async fn list_sessions(&self) -> Result<Vec<ChatSession>> {
        let conn = self.db.connect()?;
        SessionRepository::list(&conn).await
    }
    async fn get_session(&self, id: i64) -> Result<Option<ChatSession>> {
        let conn = self.db.connect()?;
        SessionRepository::get(&conn, id).await
    }
    async fn update_session(
        &self,
        id: i64,
        name: Option<&str>,
        metadata: Option<Metadata>,
    ) -> Result<ChatSession> {
        let conn = self.db.connect()?;
        SessionRepository::update(&conn, id, name, metadata).await
    }
    async fn delete_session(&self, id: i64) -> Result<bool> {
        let conn = self.db.connect()?;
        SessionRepository::soft_delete(&conn, id).await
    }
    async fn save_message(
        &self,
        session_id: i64,
        message: &SaveMessageRequest,
    ) -> Result<ChatMessage> {
        let conn = self.db.connect()?;
        SessionRepository::save_message(&conn, session_id, message).await
    }
    async fn get_messages(
        &self,
        session_id: i64,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ChatMessage>> {
        let conn = self.db.connect()?;
        SessionRepository::get_messages(&conn, session_id, limit, offset).await
    }
    async fn pin_file(
        &self,
        session_id: i64,
        file_path: &str,
        file_name: &str,
        metadata: Option<Metadata>,
    ) -> Result<PinnedFile> {
        let conn = self.db.connect()?;
        SessionRepository::pin_file(&conn, session_id, file_path, file_name, metadata).await
    }
    async fn unpin_file(&self, session_id: i64, file_path: &str) -> Result<bool> {
        let conn = self.db.connect()?;
        SessionRepository::unpin_file(&conn, session_id, file_path).await
    }
    async fn get_pinned_files(&self, session_id: i64) -> Result<Vec<PinnedFile>> {
        let conn = self.db.connect()?;
        SessionRepository::get_pinned(&conn, session_id).await
    }
    async fn latest_pin_for_path(&self, file_path: &str) -> Result<Option<PinnedFile>> {
        let conn = self.db.connect()?;
        SessionRepository::latest_pin_for_path(&conn, file_path).await
    }
    async fn session_stats(&self, session_id: i64) -> Result<SessionStats> {
        let conn = self.db.connect()?;
        SessionRepository::stats(&conn, session_id).await
    }
}

#[async_trait]
impl ModelConfigStore for LibSqlBackend {
    async fn list_providers(&self) -> Result<Vec<ModelProvider>> {
        let conn = self.db.connect()?;
        ModelConfigRepository::list_providers(&conn).await
    }
    async fn get_provider(&self, id: i64) -> Result<Option<ModelProvider>> {
        let conn = self.db.connect()?;
        ModelConfigRepository::get_provider(&conn, id).await
    }
    async fn add_provider(
        &self,
        kind: &str,
        display_name: &str,
        base_url: Option<&str>,
        api_key: Option<&str>,
    ) -> Result<ModelProvider> {
        let conn = self.db.connect()?;
        ModelConfigRepository::add_provider(&conn, kind, display_name, base_url, api_key).await
    }
    async fn update_provider(
        &self,
        id: i64,
        display_name: Option<&str>,
        base_url: Option<&str>,
        api_key: Option<&str>,
        use_proxy: Option<bool>,
        is_active: Option<bool>,
    ) -> Result<ModelProvider> {
        let conn = self.db.connect()?;
        ModelConfigRepository::update_provider(
            &conn,
            id,
            display_name,
            base_url,
            api_key,
            use_proxy,
            is_active,
        )
        .await
    }
    async fn list_configurations(&self, provider_id: i64) -> Result<Vec<ModelConfiguration>> {
        let conn = self.db.connect()?;
        ModelConfigRepository::list_configurations(&conn, provider_id).await
    }
    async fn get_configuration(&self, id: i64) -> Result<Option<ModelConfiguration>> {
        let conn = self.db.connect()?;
        ModelConfigRepository::get_configuration(&conn, id).await
    }
    async fn upsert_configuration(
        &self,
        provider_id: i64,
        model_identifier: &str,
        display_name: &str,
        max_context_length: Option<u32>,
        max_output_tokens: Option<u32>,
    ) -> Result<ModelConfiguration> {
        let conn = self.db.connect()?;
        ModelConfigRepository::upsert_configuration(
            &conn,
            provider_id,
            model_identifier,
            display_name,
            max_context_length,
            max_output_tokens,
        )
        .await
    }
    async fn add_capability(&self, configuration_id: i64, capability: Capability) -> Result<()> {
        let conn = self.db.connect()?;
        ModelConfigRepository::add_capability(&conn, configuration_id, capability).await
    }
    async fn assign_capability(
        &self,
        capability: Capability,
        configuration_id: i64,
    ) -> Result<CapabilityAssignment> {
        let conn = self.db.connect()?;
        ModelConfigRepository::assign_capability(&conn, capability, configuration_id).await
    }
    async fn clear_capability_assignment(&self, capability: Capability) -> Result<bool> {
        let conn = self.db.connect()?;
        ModelConfigRepository::clear_assignment(&conn, capability).await
    }
    async fn resolve_capability(&self, capability: Capability) -> Result<Option<ResolvedModel>> {
        let conn = self.db.connect()?;
        ModelConfigRepository::resolve(&conn, capability).await
    }
}

#[async_trait]
impl RuleStore for LibSqlBackend {
    async fn list_categories(&self) -> Result<Vec<FileCategory>> {
        let conn = self.db.connect()?;
        RuleRepository::list_categories(&conn).await
    }
    async fn upsert_category(
        &self,
        name: &str,
        description: Option<&str>,
        icon: Option<&str>,
    ) -> Result<FileCategory> {
        let conn = self.db.connect()?;
        RuleRepository::upsert_category(&conn, name, description, icon).await
    }
    async fn list_extension_mappings(&self) -> Result<Vec<FileExtensionMapping>> {
        let conn = self.db.connect()?;
        RuleRepository::list_extension_mappings(&conn).await
    }
    async fn upsert_extension_mapping(
        &self,
        extension: &str,
        category_id: i64,
        priority: RulePriority,
    ) -> Result<FileExtensionMapping> {
        let conn = self.db.connect()?;
        RuleRepository::upsert_extension_mapping(&conn, extension, category_id, priority).await
    }
    async fn list_filter_rules(&self, enabled_only: bool) -> Result<Vec<FileFilterRule>> {
        let conn = self.db.connect()?;
        RuleRepository::list_filter_rules(&conn, enabled_only).await
    }
    async fn add_filter_rule(&self, rule: &NewFilterRule) -> Result<FileFilterRule> {
        let conn = self.db.connect()?;
        RuleRepository::add_filter_rule(&conn, rule).await
    }
    async fn set_filter_rule_enabled(&self, id: i64, enabled: bool) -> Result<FileFilterRule> {
        let conn = self.db.connect()?;
        RuleRepository::set_filter_rule_enabled(&conn, id, enabled).await
    }
    async fn list_project_rules(
        &self,
        enabled_only: bool,
    ) -> Result<Vec<ProjectRecognitionRule>> {
        let conn = self.db.connect()?;
        RuleRepository::list_project_rules(&conn, enabled_only).await
    }
}

#[async_trait]
impl SettingsStore for LibSqlBackend {
    async fn get_config_value(&self, key: &str) -> Result<Option<String>> {
        let conn = self.db.connect()?;
        SettingsRepository::get_value(&conn, key).await
    }
    async fn set_config_value(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.db.connect()?;
        SettingsRepository::set_value(&conn, key, value).await
    }
    async fn list_directories(&self) -> Result<Vec<MonitoredDirectory>> {
        let conn = self.db.connect()?;
        SettingsRepository::list_directories(&conn).await
    }
    async fn add_directory(
        &self,
        path: &str,
        alias: Option<&str>,
        is_blacklist: bool,
        parent_id: Option<i64>,
    ) -> Result<MonitoredDirectory> {
        let conn = self.db.connect()?;
        SettingsRepository::add_directory(&conn, path, alias, is_blacklist, parent_id).await
    }
    async fn update_directory(
        &self,
        id: i64,
        alias: Option<&str>,
        is_blacklist: Option<bool>,
    ) -> Result<MonitoredDirectory> {
        let conn = self.db.connect()?;
        SettingsRepository::update_directory(&conn, id, alias, is_blacklist).await
    }
    async fn delete_directory(&self, id: i64) -> Result<bool> {
        let conn = self.db.connect()?;
        SettingsRepository::delete_directory(&conn, id).await
    }
    async fn list_bundle_extensions(&self, os: Option<&str>) -> Result<Vec<BundleExtension>> {
        let conn = self.db.connect()?;
        SettingsRepository::list_bundle_extensions(&conn, os).await
    }
    async fn add_bundle_extension(&self, extension: &str, os: &str) -> Result<BundleExtension> {
        let conn = self.db.connect()?;
        SettingsRepository::add_bundle_extension(&conn, extension, os).await
    }
    async fn delete_bundle_extension(&self, id: i64) -> Result<bool> {
        let conn = self.db.connect()?;
        SettingsRepository::delete_bundle_extension(&conn, id).await
    }
}

#[async_trait]
impl MetaStore for LibSqlBackend {}
