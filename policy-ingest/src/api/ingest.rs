//! Spreadsheet upload endpoints

use crate::api::parse_query_number;
use crate::models::{IngestionReport, StructureReport};
use crate::{ApiError, ApiResult, AppState};
use axum::{
    extract::{Multipart, Query, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

/// Multipart part carrying the spreadsheet
const FILE_FIELD: &str = "file";

#[derive(Debug, Deserialize)]
pub struct IngestParams {
    /// Rows per insert transaction (100 - 10000), parsed by the handler
    pub batch_size: Option<String>,
}

struct Upload {
    filename: String,
    bytes: Vec<u8>,
}

async fn read_upload(mut multipart: Multipart) -> ApiResult<Upload> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ApiError::BadRequest("Upload has no filename".to_string()))?;
        let bytes = field.bytes().await?;

        return Ok(Upload {
            filename,
            bytes: bytes.to_vec(),
        });
    }

    Err(ApiError::BadRequest(format!(
        "Missing multipart field '{}'",
        FILE_FIELD
    )))
}

/// POST /ingest
///
/// Always answers 200 with a report once the upload passes the type and size
/// checks; the report's `status` says whether anything was stored.
pub async fn ingest_file(
    State(state): State<AppState>,
    Query(params): Query<IngestParams>,
    multipart: Multipart,
) -> ApiResult<Json<IngestionReport>> {
    let requested = parse_query_number("batch_size", params.batch_size.as_deref())?;
    let batch_size = state
        .settings
        .batch_size(requested)
        .map_err(ApiError::BadRequest)?;

    let upload = read_upload(multipart).await?;
    state
        .settings
        .check_upload(&upload.filename, upload.bytes.len())
        .map_err(ApiError::BadRequest)?;

    info!(filename = %upload.filename, size_bytes = upload.bytes.len(), "Upload received");

    let report = state
        .pipeline
        .ingest(&upload.bytes, &upload.filename, batch_size)
        .await;
    Ok(Json(report))
}

/// POST /ingest/validate
pub async fn validate_file(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<StructureReport>> {
    let upload = read_upload(multipart).await?;
    state
        .settings
        .check_upload(&upload.filename, upload.bytes.len())
        .map_err(ApiError::BadRequest)?;

    let pipeline = Arc::clone(&state.pipeline);
    let max_rows = state.settings.ingestion.max_rows;
    let report = tokio::task::spawn_blocking(move || {
        pipeline.validate_structure(&upload.bytes, &upload.filename, max_rows)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Structure validation failed: {}", e)))?;

    Ok(Json(report))
}

pub fn ingest_routes() -> Router<AppState> {
    Router::new()
        .route("/ingest", post(ingest_file))
        .route("/ingest/validate", post(validate_file))
}
