//! Natural-language query endpoint

use crate::models::{QueryRequest, QueryResponse};
use crate::{ApiError, ApiResult, AppState};
use axum::{extract::State, routing::post, Json, Router};
use policy_common::config::LLM_API_KEY_ENV;

/// POST /query
///
/// 400 for an out-of-range request, 503 while no LLM API key is configured.
pub async fn query_policies(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> ApiResult<Json<QueryResponse>> {
    request.validate().map_err(ApiError::BadRequest)?;

    let workflow = state.query_workflow.as_ref().ok_or_else(|| {
        ApiError::ServiceUnavailable(format!(
            "LLM API key not configured; set {} or llm.api_key",
            LLM_API_KEY_ENV
        ))
    })?;

    Ok(Json(workflow.process(&request).await))
}

pub fn query_routes() -> Router<AppState> {
    Router::new().route("/query", post(query_policies))
}
