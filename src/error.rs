use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// A single failing request field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {}", first_message(.0))]
    Validation(Vec<FieldError>),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Auth(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Delivery(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

fn first_message(errors: &[FieldError]) -> &str {
    errors.first().map(|e| e.message.as_str()).unwrap_or("invalid input")
}

impl AppError {
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation(vec![FieldError::new(field, message)])
    }

    pub fn no_document(id: impl std::fmt::Display) -> Self {
        AppError::NotFound(format!("No document for this id {}", id))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Delivery(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(e: JsonRejection) -> Self {
        AppError::invalid("body", e.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(e: MultipartRejection) -> Self {
        AppError::invalid("body", e.body_text())
    }
}

impl From<MultipartError> for AppError {
    fn from(e: MultipartError) -> Self {
        AppError::invalid("body", e.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(e: PathRejection) -> Self {
        AppError::invalid("id", e.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(e: QueryRejection) -> Self {
        AppError::invalid("query", e.body_text())
    }
}

/// Uniform error envelope: `fail` for caller mistakes, `error` for server faults.
#[derive(Debug, Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<FieldError>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let label = if status.is_client_error() { "fail" } else { "error" };

        let (message, errors) = match self {
            AppError::Validation(errors) => (first_message(&errors).to_string(), errors),
            AppError::Internal(e) => {
                error!(error = ?e, "internal error");
                ("Internal server error".to_string(), Vec::new())
            }
            AppError::Delivery(msg) => {
                error!(%msg, "notification delivery failed");
                (msg, Vec::new())
            }
            other => (other.to_string(), Vec::new()),
        };

        let body = ErrorBody {
            status: label,
            message,
            errors,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let resp = err.into_response();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn validation_error_lists_fields() {
        let (status, json) = body_json(AppError::Validation(vec![
            FieldError::new("name", "Too short User name"),
            FieldError::new("email", "Invalid email address"),
        ]))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["status"], "fail");
        assert_eq!(json["message"], "Too short User name");
        assert_eq!(json["errors"][1]["field"], "email");
    }

    #[tokio::test]
    async fn internal_error_hides_details() {
        let (status, json) = body_json(AppError::Internal(anyhow::anyhow!("db exploded"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], "Internal server error");
        assert!(json.get("errors").is_none());
    }

    #[tokio::test]
    async fn not_found_uses_fail_status() {
        let (status, json) = body_json(AppError::no_document("42")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["status"], "fail");
        assert_eq!(json["message"], "No document for this id 42");
    }
}
