//! Single-policy endpoints

use crate::db::{PolicyStore, StoredPolicy};
use crate::ingest::{check_percentages, check_record};
use crate::models::PolicyRecord;
use crate::{ApiError, ApiResult, AppState};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use policy_common::Error;
use tracing::info;

/// POST /policies
///
/// 400 on an invariant violation, 409 when the policy number already exists.
pub async fn create_policy(
    State(state): State<AppState>,
    Json(record): Json<PolicyRecord>,
) -> ApiResult<(StatusCode, Json<StoredPolicy>)> {
    check_record(&record)
        .and_then(|()| check_percentages(&record))
        .map_err(ApiError::BadRequest)?;

    let stored = state
        .policies
        .create_one(&record)
        .await
        .map_err(|e| match e {
            Error::Duplicate(msg) => ApiError::Conflict(msg),
            other => ApiError::Common(other),
        })?;

    info!(policy_number = %stored.record.policy_number, guid = %stored.guid, "Policy created");
    Ok((StatusCode::CREATED, Json(stored)))
}

/// GET /policies/:policy_number
pub async fn get_policy(
    State(state): State<AppState>,
    Path(policy_number): Path<String>,
) -> ApiResult<Json<StoredPolicy>> {
    state
        .policies
        .find_by_unique_key(&policy_number)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Policy '{}'", policy_number)))
}

pub fn policy_routes() -> Router<AppState> {
    Router::new()
        .route("/policies", post(create_policy))
        .route("/policies/:policy_number", get(get_policy))
}
