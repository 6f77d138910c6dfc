use crate::services::file_system::FsError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<FsError> for AppError {
    fn from(err: FsError) -> Self {
        let status = match &err {
            FsError::NotFound { .. } => StatusCode::NOT_FOUND,
            FsError::AlreadyExists { .. } => StatusCode::CONFLICT,
            FsError::Authorization(_) => StatusCode::FORBIDDEN,
            FsError::Transient(_) => StatusCode::BAD_GATEWAY,
            FsError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_system_errors_map_to_statuses() {
        let not_found: AppError = FsError::NotFound {
            path: "a.txt".into(),
        }
        .into();
        assert_eq!(not_found.status, StatusCode::NOT_FOUND);
        assert!(not_found.message.contains("a.txt"));

        let exists: AppError = FsError::AlreadyExists {
            path: "a.txt".into(),
        }
        .into();
        assert_eq!(exists.status, StatusCode::CONFLICT);

        let denied: AppError = FsError::Authorization("AccessDenied".into()).into();
        assert_eq!(denied.status, StatusCode::FORBIDDEN);

        let flaky: AppError = FsError::Transient("timeout".into()).into();
        assert_eq!(flaky.status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn response_carries_status_and_json_body() {
        let response = AppError::from(FsError::NotFound {
            path: "1001/a.txt".into(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], 404);
        assert_eq!(json["error"], "file `1001/a.txt` not found");
    }
}
