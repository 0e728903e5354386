use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::report::ReportError;
use crate::run::error::RunError;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
}

/// Application error type that converts to HTTP responses.
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    /// A run that failed while capturing.
    Engine { run_id: String, message: String },
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: msg,
                    details: None,
                    report_id: None,
                },
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    error: msg,
                    details: None,
                    report_id: None,
                },
            ),
            AppError::Engine { run_id, message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse {
                    error: "Comparison failed".to_string(),
                    details: Some(message),
                    report_id: Some(run_id),
                },
            ),
            AppError::Internal(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse {
                    error: "Internal server error".to_string(),
                    details: Some(format!("{:#}", err)),
                    report_id: None,
                },
            ),
        };

        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<RunError> for AppError {
    fn from(err: RunError) -> Self {
        match err {
            RunError::Validation(e) => AppError::BadRequest(e.to_string()),
            RunError::Engine { run_id, source } => AppError::Engine {
                run_id: run_id.to_string(),
                message: source.to_string(),
            },
            err @ RunError::Transition { .. } => AppError::Internal(err.into()),
        }
    }
}

impl From<ReportError> for AppError {
    fn from(err: ReportError) -> Self {
        match err {
            ReportError::InvalidId(e) => AppError::BadRequest(e.to_string()),
            ReportError::NotFound(_) => AppError::NotFound(err.to_string()),
        }
    }
}
