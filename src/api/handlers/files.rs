use crate::AppState;
use crate::api::error::{AppError, DELETE_ERR, ErrorResponse, UPLOAD_ERR};
use crate::services::transfer::{DeleteJob, UploadJob, UploadResult};
use crate::utils::file_name::rand_file_name;
use crate::utils::validation::{
    validate_destination, validate_file_size, validate_image_extension,
};
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartError, rejection::JsonRejection},
    http::StatusCode,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
pub struct DeleteFileRequest {
    pub destination: String,
    #[validate(length(min = 1, message = "file_name must not be empty"))]
    pub file_name: String,
}

impl From<DeleteFileRequest> for DeleteJob {
    fn from(req: DeleteFileRequest) -> Self {
        DeleteJob::new(req.destination, req.file_name)
    }
}

fn multipart_error(e: MultipartError) -> AppError {
    let err_msg = e.to_string();
    if err_msg.contains("length limit exceeded") {
        AppError::PayloadTooLarge {
            code: UPLOAD_ERR,
            message: "Request body exceeds the maximum allowed limit".to_string(),
        }
    } else {
        AppError::bad_request(UPLOAD_ERR, err_msg)
    }
}

#[utoipa::path(
    post,
    path = "/files/upload",
    request_body(content = Multipart, description = "Image parts under `files` plus a `destination` prefix"),
    responses(
        (status = 201, description = "Files uploaded and made public", body = [UploadResult]),
        (status = 400, description = "Invalid extension or size", body = ErrorResponse),
        (status = 500, description = "Transfer failed", body = ErrorResponse)
    ),
    tag = "files"
)]
pub async fn upload_files(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Vec<UploadResult>>), AppError> {
    let mut destination = String::new();
    let mut files: Vec<(String, Bytes)> = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "files" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await.map_err(multipart_error)?;
                files.push((filename, data));
            }
            "destination" => {
                destination = field.text().await.map_err(multipart_error)?;
            }
            other => debug!("Ignoring multipart field '{}'", other),
        }
    }

    validate_destination(&destination).map_err(|e| AppError::bad_request(UPLOAD_ERR, e.message))?;

    let mut jobs = Vec::with_capacity(files.len());
    for (filename, data) in files {
        let ext = validate_image_extension(&filename)
            .map_err(|e| AppError::bad_request(UPLOAD_ERR, e.message))?;
        validate_file_size(data.len(), state.config.file_limit)
            .map_err(|e| AppError::bad_request(UPLOAD_ERR, e.message))?;

        let file_name = rand_file_name(&ext);
        debug!("Staged '{}' as {}{}", filename, destination, file_name);
        jobs.push(UploadJob::new(data, destination.clone(), file_name, ext));
    }

    let results = state
        .transfer
        .upload_batch(jobs)
        .await
        .map_err(AppError::transfer(UPLOAD_ERR))?;

    info!("📦 {} files uploaded to '{}'", results.len(), destination);
    Ok((StatusCode::CREATED, Json(results)))
}

#[utoipa::path(
    post,
    path = "/files/delete",
    request_body = [DeleteFileRequest],
    responses(
        (status = 200, description = "Files deleted"),
        (status = 400, description = "Malformed request", body = ErrorResponse),
        (status = 500, description = "Transfer failed", body = ErrorResponse)
    ),
    tag = "files"
)]
pub async fn delete_files(
    State(state): State<AppState>,
    payload: Result<Json<Vec<DeleteFileRequest>>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Json(req) = payload.map_err(|e| AppError::bad_request(DELETE_ERR, e.body_text()))?;

    for item in &req {
        item.validate()
            .map_err(|e| AppError::bad_request(DELETE_ERR, e.to_string()))?;
        validate_destination(&item.destination)
            .map_err(|e| AppError::bad_request(DELETE_ERR, e.message))?;
    }

    let jobs: Vec<DeleteJob> = req.into_iter().map(DeleteJob::from).collect();
    let count = jobs.len();

    state
        .transfer
        .delete_batch(jobs)
        .await
        .map_err(AppError::transfer(DELETE_ERR))?;

    info!("🧹 {} files deleted", count);
    Ok(Json(serde_json::Value::Null))
}
