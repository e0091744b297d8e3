use axum::extract::{Path as AxumPath, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::AppState;
use crate::config::is_supported_extension;
use crate::error::{KfError, Result};
use crate::models::{
    ScreeningSubmission, TagSearchOperator, TaskKind, TaskPriority,
};
use crate::pipeline::ChunkPipeline;

#[derive(Debug, Deserialize)]
pub struct SubmitScreeningRequest {
    #[serde(flatten)]
    pub submission: ScreeningSubmission,
    /// User-visible files jump the queue: a HIGH single-file TAGGING task
    /// is created immediately instead of waiting for the next batch.
    #[serde(default)]
    pub urgent: bool,
}

/// Watcher ingress: one screening row in, a pending row out. Resubmitting
/// the same `(path, hash)` resets it to pending.
pub async fn submit_screening(
    State(state): State<AppState>,
    Json(request): Json<SubmitScreeningRequest>,
) -> Result<Json<Value>> {
    let row = state.store.upsert_screening(&request.submission).await?;

    let task_id = if request.urgent {
        let task = state
            .store
            .add_task(
                &format!("tagging: {}", row.file_name),
                TaskKind::Tagging,
                TaskPriority::High,
                Some(json!({ "screening_result_id": row.id })),
                Some(&row.file_path),
            )
            .await?;
        Some(task.id)
    } else {
        None
    };

    Ok(Json(json!({
        "success": true,
        "screening_id": row.id,
        "status": row.status,
        "task_id": task_id,
    })))
}

#[derive(Debug, Deserialize)]
pub struct BatchScreeningRequest {
    pub results: Vec<ScreeningSubmission>,
    /// When set, a batch TAGGING task is queued for the submitted rows.
    #[serde(default)]
    pub enqueue_tagging: bool,
}

pub async fn submit_screening_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchScreeningRequest>,
) -> Result<Json<Value>> {
    if request.results.is_empty() {
        return Ok(Json(json!({ "success": true, "accepted": 0 })));
    }

    let task = if request.enqueue_tagging {
        Some(
            state
                .store
                .add_task(
                    &format!("tagging batch of {}", request.results.len()),
                    TaskKind::Tagging,
                    TaskPriority::Medium,
                    None,
                    None,
                )
                .await?,
        )
    } else {
        None
    };

    let submissions: Vec<ScreeningSubmission> = request
        .results
        .into_iter()
        .map(|mut submission| {
            if let Some(task) = &task {
                submission.task_id = Some(task.id);
            }
            submission
        })
        .collect();

    let accepted = state.store.upsert_screening_batch(&submissions).await?;
    Ok(Json(json!({
        "success": true,
        "accepted": accepted,
        "task_id": task.map(|t| t.id),
    })))
}

#[derive(Debug, Deserialize)]
pub struct PinFileRequest {
    pub file_path: String,
    pub session_id: Option<i64>,
}

/// Pinning a file queues a HIGH MULTIVECTOR task after validating the
/// file and the required models. The session join row is written when a
/// session id is supplied.
pub async fn pin_file(
    State(state): State<AppState>,
    Json(request): Json<PinFileRequest>,
) -> Result<Json<Value>> {
    let path = std::path::Path::new(&request.file_path);
    if !path.exists() {
        return Ok(Json(json!({
            "success": false,
            "message": format!("File does not exist: {}", request.file_path),
        })));
    }
    if std::fs::File::open(path).is_err() {
        return Ok(Json(json!({
            "success": false,
            "message": format!("File is not readable: {}", request.file_path),
        })));
    }
    if !is_supported_extension(path) {
        return Ok(Json(json!({
            "success": false,
            "message": "Unsupported file type for indexing",
        })));
    }

    // Missing chunking models answer with the dedicated wire shape.
    state
        .gateway
        .require_capabilities(&ChunkPipeline::REQUIRED_CAPABILITIES)
        .await?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(&request.file_path)
        .to_string();

    if let Some(session_id) = request.session_id {
        state
            .store
            .pin_file(session_id, &request.file_path, &file_name, None)
            .await?;
    }

    let task = state
        .store
        .add_task(
            &format!("multivector: {file_name}"),
            TaskKind::Multivector,
            TaskPriority::High,
            Some(json!({ "file_path": request.file_path })),
            Some(&request.file_path),
        )
        .await?;

    Ok(Json(json!({
        "success": true,
        "task_id": task.id,
        "message": "Indexing task created",
    })))
}

pub async fn get_task(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<i64>,
) -> Result<Json<Value>> {
    let task = state
        .store
        .get_task(id)
        .await?
        .ok_or_else(|| KfError::NotFound(format!("Task {id} not found")))?;
    Ok(Json(json!({ "success": true, "task": task })))
}

#[derive(Debug, Deserialize)]
pub struct SemanticSearchRequest {
    pub query: String,
    pub top_k: Option<usize>,
    pub document_ids: Option<Vec<i64>>,
}

pub async fn semantic_search(
    State(state): State<AppState>,
    Json(request): Json<SemanticSearchRequest>,
) -> Result<Json<Value>> {
    let top_k = request.top_k.unwrap_or(state.retriever.default_top_k());
    let hits = state
        .retriever
        .search(&request.query, top_k, request.document_ids.as_deref())
        .await?;
    Ok(Json(json!({ "success": true, "results": hits })))
}

#[derive(Debug, Deserialize)]
pub struct TagSearchRequest {
    pub tag_names: Vec<String>,
    #[serde(default)]
    pub operator: TagSearchOperator,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Tag search over the inverted index. Unknown tag names are ignored;
/// asking only for unknown names simply matches nothing.
pub async fn search_files_by_tags(
    State(state): State<AppState>,
    Json(request): Json<TagSearchRequest>,
) -> Result<Json<Value>> {
    let tag_ids = state.store.get_tag_ids_by_names(&request.tag_names).await?;
    if tag_ids.is_empty() {
        return Ok(Json(json!({ "success": true, "files": [] })));
    }

    let file_ids = state
        .store
        .search_file_ids_by_tags(&tag_ids, request.operator)
        .await?;

    let offset = request.offset.unwrap_or(0);
    let limit = request.limit.unwrap_or(50);
    let page: Vec<i64> = file_ids.into_iter().skip(offset).take(limit).collect();

    let rows = state.store.get_screenings_by_ids(&page).await?;
    let files: Vec<Value> = rows
        .iter()
        .map(|row| {
            json!({
                "id": row.id,
                "path": row.file_path,
                "file_name": row.file_name,
                "tags_display_ids": row.tags_display_ids,
            })
        })
        .collect();
    Ok(Json(json!({ "success": true, "files": files })))
}

#[derive(Debug, Deserialize)]
pub struct TagCloudQuery {
    pub limit: Option<usize>,
    pub min_weight: Option<u64>,
}

pub async fn tag_cloud(
    State(state): State<AppState>,
    Query(query): Query<TagCloudQuery>,
) -> Result<Json<Value>> {
    let cloud = state
        .store
        .tag_cloud(query.limit.unwrap_or(100), query.min_weight.unwrap_or(1))
        .await?;
    Ok(Json(json!({ "success": true, "tags": cloud })))
}
