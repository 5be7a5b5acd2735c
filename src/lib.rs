pub mod api;
pub mod config;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::config::TransferConfig;
use crate::services::transfer::TransferService;
use axum::{
    Router,
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::health::health_check,
        api::handlers::files::upload_files,
        api::handlers::files::delete_files,
    ),
    components(
        schemas(
            api::error::ErrorResponse,
            api::handlers::health::HealthResponse,
            api::handlers::files::DeleteFileRequest,
            services::transfer::UploadResult,
        )
    ),
    tags(
        (name = "files", description = "Bulk media upload and delete"),
        (name = "system", description = "Service status")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub transfer: Arc<TransferService>,
    pub config: TransferConfig,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route("/files/upload", post(api::handlers::files::upload_files))
        .route("/files/delete", post(api::handlers::files::delete_files))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .layer(axum::extract::DefaultBodyLimit::max(state.config.body_limit))
        .with_state(state)
}
