use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KfError {
    #[error("Database error: {0}")]
    Database(#[from] libsql::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Model unavailable: {}", missing.join(", "))]
    ModelUnavailable { missing: Vec<String> },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Vectorization error: {0}")]
    Vectorization(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Rate limit exceeded, retry after {retry_after:?} seconds")]
    RateLimit { retry_after: Option<u64> },

    #[error("Model call error: {0}")]
    Model(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl KfError {
    /// Shorthand for a single-capability unavailability.
    pub fn model_missing(capability: impl Into<String>) -> Self {
        Self::ModelUnavailable {
            missing: vec![capability.into()],
        }
    }

    /// Deferral marker: pipelines treat this variant as "try again later",
    /// every other variant as a real failure.
    pub fn is_model_unavailable(&self) -> bool {
        matches!(self, Self::ModelUnavailable { .. })
    }
}

impl IntoResponse for KfError {
    fn into_response(self) -> Response {
        // ModelUnavailable has a dedicated wire shape the shell keys on.
        if let KfError::ModelUnavailable { missing } = &self {
            let body = Json(json!({
                "success": false,
                "error_type": "model_missing",
                "missing_models": missing,
            }));
            return (StatusCode::SERVICE_UNAVAILABLE, body).into_response();
        }

        let (status, message) = match &self {
            KfError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            KfError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            KfError::Database(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            KfError::Parse(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            KfError::Vectorization(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            KfError::Timeout(msg) => (StatusCode::GATEWAY_TIMEOUT, msg.clone()),
            KfError::RateLimit { .. } => (StatusCode::TOO_MANY_REQUESTS, self.to_string()),
            KfError::Model(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            KfError::Http(e) => (StatusCode::BAD_GATEWAY, e.to_string()),
            KfError::Json(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            KfError::Io(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            KfError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            KfError::ModelUnavailable { .. } => unreachable!(),
        };

        let body = Json(json!({
            "success": false,
            "error": message,
            "code": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, KfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_missing_lists_capability() {
        let err = KfError::model_missing("embedding");
        assert!(err.is_model_unavailable());
        assert!(err.to_string().contains("embedding"));
    }

    #[test]
    fn other_errors_are_not_deferrals() {
        assert!(!KfError::Parse("bad pdf".into()).is_model_unavailable());
        assert!(!KfError::NotFound("task 7".into()).is_model_unavailable());
    }
}
