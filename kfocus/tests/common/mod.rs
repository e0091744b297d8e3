use std::sync::Arc;

use kfocus::db::{Database, LibSqlBackend, MetaStore};
use kfocus::models::ScreeningSubmission;

/// Fresh in-memory metadata store with the full schema applied.
pub async fn memory_store() -> Arc<dyn MetaStore> {
    let db = Database::open_in_memory()
        .await
        .expect("in-memory database should open");
    Arc::new(LibSqlBackend::new(db))
}

/// Minimal watcher submission for a path/hash pair.
pub fn submission(file_path: &str, file_hash: &str) -> ScreeningSubmission {
    ScreeningSubmission {
        file_path: file_path.to_string(),
        file_name: file_path
            .rsplit('/')
            .next()
            .unwrap_or(file_path)
            .to_string(),
        file_size: 1234,
        extension: file_path.rsplit('.').next().map(str::to_string),
        file_hash: Some(file_hash.to_string()),
        created_time: None,
        modified_time: Some(chrono::Utc::now()),
        category_id: None,
        matched_rules: None,
        extra_metadata: None,
        task_id: None,
    }
}
