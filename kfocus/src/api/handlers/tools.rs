use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::AppState;
use crate::error::Result;

#[derive(Debug, Deserialize)]
pub struct ToolResponseRequest {
    pub call_id: String,
    pub success: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub duration: Option<f64>,
}

/// Tool-channel response ingress from the frontend. The record is
/// acknowledged and surfaced on the event bus for whichever chat turn is
/// waiting on it; a lost response must not wedge anything, so this is
/// fire-and-forget.
pub async fn tool_response(
    State(state): State<AppState>,
    Json(request): Json<ToolResponseRequest>,
) -> Result<Json<Value>> {
    tracing::debug!(
        call_id = %request.call_id,
        success = request.success,
        duration = ?request.duration,
        "Tool response received"
    );

    state.events.send(
        "tool-response",
        json!({
            "call_id": request.call_id,
            "success": request.success,
            "result": request.result,
            "error": request.error,
            "duration": request.duration,
        }),
    );

    Ok(Json(json!({ "success": true })))
}
