//! HTTP route handlers.

use crate::image_proc::{ImageProcessor, ProcessingError};
use crate::options::{OptionValue, OptionsError, OptionsRegistry};
use axum::{
    extract::{
        multipart::{Multipart, MultipartRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<ImageProcessor>,
    pub options: Arc<OptionsRegistry>,
}

/// Query string of PATCH /set/{name}
#[derive(Debug, Deserialize)]
pub struct SetQuery {
    pub value: Option<String>,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// POST /use - Display an uploaded image
pub async fn use_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(e) => {
            tracing::debug!("Upload is not multipart: {}", e);
            return error_response(StatusCode::UNPROCESSABLE_ENTITY, "No file part");
        }
    };

    // Find the first part named 'file'
    let field = loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() == Some("file") {
                    break field;
                }
            }
            Ok(None) => {
                tracing::warn!("Upload missing file field");
                return error_response(StatusCode::UNPROCESSABLE_ENTITY, "No file part");
            }
            Err(e) => {
                tracing::warn!("Multipart parse error: {}", e);
                return error_response(e.status(), "Malformed multipart body");
            }
        }
    };

    if field.file_name().is_none_or(str::is_empty) {
        tracing::warn!("Upload has an empty filename");
        return error_response(StatusCode::UNPROCESSABLE_ENTITY, "No selected file");
    }

    let data = match field.bytes().await {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!("Failed reading upload field: {}", e);
            return error_response(e.status(), "Failed to read upload");
        }
    };

    tracing::info!("Received upload of {} bytes", data.len());

    match state.processor.process(data).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "message": "Image successfully processed" })),
        )
            .into_response(),
        Err(ProcessingError::Decode(e)) => {
            tracing::warn!("Invalid image upload: {}", e);
            error_response(StatusCode::UNPROCESSABLE_ENTITY, "Invalid image file")
        }
        Err(e) => {
            tracing::error!("Display update failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Display update failed")
        }
    }
}

/// PATCH /set/{name}?value=... - Overwrite a panel option
pub async fn set_option(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<SetQuery>,
) -> Response {
    match state.options.set(&name, query.value.map(OptionValue::Str)).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(OptionsError::MissingValue) => {
            error_response(StatusCode::BAD_REQUEST, "No value provided")
        }
        Err(e) => {
            tracing::debug!("Set rejected: {}", e);
            error_response(StatusCode::NOT_FOUND, "Option not found")
        }
    }
}

/// GET /options - All public panel options
pub async fn list_options(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.options.list().await)
}

/// GET /get/{name} - A single panel option
pub async fn get_option(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.options.get(&name).await {
        Ok(value) => Json(json!({ "value": value })).into_response(),
        Err(_) => error_response(StatusCode::NOT_FOUND, "Option not found"),
    }
}

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
