use crate::services::transfer::TransferError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// Error code reported for failed uploads.
pub const UPLOAD_ERR: &str = "files-001";
/// Error code reported for failed deletes.
pub const DELETE_ERR: &str = "files-002";

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub trace_id: String,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad Request: {message}")]
    BadRequest { code: &'static str, message: String },

    #[error("Payload Too Large: {message}")]
    PayloadTooLarge { code: &'static str, message: String },

    #[error("Transfer failed: {source}")]
    Transfer {
        code: &'static str,
        #[source]
        source: TransferError,
    },
}

impl AppError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }

    pub fn transfer(code: &'static str) -> impl FnOnce(TransferError) -> Self {
        move |source| Self::Transfer { code, source }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::BadRequest { code, message } => (StatusCode::BAD_REQUEST, code, message),
            AppError::PayloadTooLarge { code, message } => {
                (StatusCode::PAYLOAD_TOO_LARGE, code, message)
            }
            AppError::Transfer { code, source } => {
                tracing::error!("Transfer error [{}]: {}", code, source);
                (StatusCode::INTERNAL_SERVER_ERROR, code, source.to_string())
            }
        };

        let body = Json(ErrorResponse {
            trace_id: code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}
