use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::AppState;
use crate::error::{KfError, Result};
use crate::models::{MessageRole, Metadata, SaveMessageRequest};

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub name: Option<String>,
    pub metadata: Option<Metadata>,
}

pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<Value>> {
    let name = request.name.unwrap_or_else(|| "New Chat".to_string());
    let session = state.store.create_session(&name, request.metadata).await?;
    Ok(Json(json!({ "success": true, "session": session })))
}

#[derive(Debug, Deserialize)]
pub struct SmartSessionRequest {
    pub first_message: String,
    pub metadata: Option<Metadata>,
}

/// Session titled by the model from the first user message; falls back to
/// a truncation when the model is unavailable.
pub async fn create_smart_session(
    State(state): State<AppState>,
    Json(request): Json<SmartSessionRequest>,
) -> Result<Json<Value>> {
    let session = state
        .sessions
        .create_smart_session(&request.first_message, request.metadata)
        .await?;
    Ok(Json(json!({ "success": true, "session": session })))
}

pub async fn list_sessions(State(state): State<AppState>) -> Result<Json<Value>> {
    let sessions = state.store.list_sessions().await?;
    Ok(Json(json!({ "success": true, "sessions": sessions })))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    let session = state
        .store
        .get_session(id)
        .await?
        .ok_or_else(|| KfError::NotFound(format!("Session {id} not found")))?;
    Ok(Json(json!({ "success": true, "session": session })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateSessionRequest {
    pub name: Option<String>,
    pub metadata: Option<Metadata>,
}

pub async fn update_session(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateSessionRequest>,
) -> Result<Json<Value>> {
    let session = state
        .store
        .update_session(id, request.name.as_deref(), request.metadata)
        .await?;
    Ok(Json(json!({ "success": true, "session": session })))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    let deleted = state.store.delete_session(id).await?;
    if !deleted {
        return Err(KfError::NotFound(format!("Session {id} not found")));
    }
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Value>> {
    let messages = state
        .store
        .get_messages(id, query.limit.unwrap_or(100), query.offset.unwrap_or(0))
        .await?;
    Ok(Json(json!({ "success": true, "messages": messages })))
}

pub async fn save_message(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<SaveMessageRequest>,
) -> Result<Json<Value>> {
    let message = state.store.save_message(id, &request).await?;
    Ok(Json(json!({ "success": true, "message": message })))
}

pub async fn session_stats(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    let stats = state.store.session_stats(id).await?;
    Ok(Json(json!({ "success": true, "stats": stats })))
}

pub async fn get_pinned_files(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    let pinned = state.store.get_pinned_files(id).await?;
    Ok(Json(json!({ "success": true, "pinned_files": pinned })))
}

#[derive(Debug, Deserialize)]
pub struct PinRequest {
    pub file_path: String,
    pub file_name: Option<String>,
    pub metadata: Option<Metadata>,
}

pub async fn pin_file(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<PinRequest>,
) -> Result<Json<Value>> {
    let file_name = request.file_name.unwrap_or_else(|| {
        std::path::Path::new(&request.file_path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&request.file_path)
            .to_string()
    });
    let pinned = state
        .store
        .pin_file(id, &request.file_path, &file_name, request.metadata)
        .await?;
    Ok(Json(json!({ "success": true, "pinned_file": pinned })))
}

#[derive(Debug, Deserialize)]
pub struct UnpinQuery {
    pub file_path: String,
}

pub async fn unpin_file(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<UnpinQuery>,
) -> Result<Json<Value>> {
    let removed = state.store.unpin_file(id, &query.file_path).await?;
    Ok(Json(json!({ "success": removed })))
}

#[derive(Debug, Deserialize)]
pub struct UiStreamRequest {
    pub session_id: i64,
    pub message_id: Option<String>,
    pub content: String,
}

/// Server-Sent-Events chat stream: `start`, `text-start`, `text-delta`*,
/// `text-end`, `finish` (or `error`), then `data: [DONE]`. The user
/// message is persisted before streaming begins; the assistant message
/// with its RAG sources is persisted after the stream completes.
pub async fn ui_stream(
    State(state): State<AppState>,
    Json(request): Json<UiStreamRequest>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, std::convert::Infallible>>>> {
    let session_id = request.session_id;
    state
        .store
        .get_session(session_id)
        .await?
        .ok_or_else(|| KfError::NotFound(format!("Session {session_id} not found")))?;

    let user_message_id = request
        .message_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    state
        .store
        .save_message(
            session_id,
            &SaveMessageRequest {
                message_id: user_message_id,
                role: MessageRole::User,
                content: request.content.clone(),
                parts: None,
                metadata: None,
                sources: None,
            },
        )
        .await?;

    let prepared = state.chat.prepare(session_id, &request.content).await?;
    let sources_json = serde_json::to_value(&prepared.sources).ok();
    let upstream = state.gateway.stream_chat(&prepared.turns).await?;
    let store = state.store.clone();

    let stream = async_stream::stream! {
        let part_id = Uuid::new_v4().to_string();
        yield sse_json(&json!({ "type": "start" }));
        yield sse_json(&json!({ "type": "text-start", "id": part_id }));

        let mut upstream = upstream;
        let mut assistant_text = String::new();
        let mut failed = false;

        while let Some(delta) = upstream.next().await {
            match delta {
                Ok(delta) => {
                    assistant_text.push_str(&delta);
                    yield sse_json(&json!({
                        "type": "text-delta",
                        "id": part_id,
                        "delta": delta,
                    }));
                }
                Err(error) => {
                    failed = true;
                    yield sse_json(&json!({
                        "type": "error",
                        "id": part_id,
                        "errorText": error.to_string(),
                    }));
                    break;
                }
            }
        }

        yield sse_json(&json!({ "type": "text-end", "id": part_id }));
        if !failed {
            yield sse_json(&json!({ "type": "finish" }));
        }

        // Assistant messages persist only after the stream ends.
        if !assistant_text.is_empty() {
            let save = SaveMessageRequest {
                message_id: Uuid::new_v4().to_string(),
                role: MessageRole::Assistant,
                content: assistant_text,
                parts: None,
                metadata: None,
                sources: sources_json.clone(),
            };
            if let Err(error) = store.save_message(session_id, &save).await {
                tracing::error!(session_id, error = %error, "Failed to persist assistant message");
            }
        }

        yield Ok(Event::default().data("[DONE]"));
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn sse_json(value: &Value) -> std::result::Result<Event, std::convert::Infallible> {
    Ok(Event::default().data(value.to_string()))
}
