//! Portfolio summary and service metrics

use crate::api::parse_query_number;
use crate::db::{DateRangeSummary, FinancialSummary, IngestionStats, QueryStats};
use crate::query::WorkflowStats;
use crate::{ApiError, ApiResult, AppState};
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use policy_common::db::IngestionLogEntry;
use serde::{Deserialize, Serialize};

const RECENT_INGESTIONS: u32 = 5;

#[derive(Debug, Serialize)]
pub struct DataSummaryResponse {
    pub financial: FinancialSummary,
    pub date_range: DateRangeSummary,
    pub generated_at: DateTime<Utc>,
}

/// GET /data-summary
pub async fn data_summary(State(state): State<AppState>) -> ApiResult<Json<DataSummaryResponse>> {
    let financial = state.policies.financial_summary().await?;
    let date_range = state.policies.date_range_summary().await?;

    Ok(Json(DataSummaryResponse {
        financial,
        date_range,
        generated_at: Utc::now(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct MetricsParams {
    /// Trailing window in days (1 - 365), default 1
    pub days: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub ingestion: IngestionStats,
    pub queries: QueryStats,
    /// Absent while natural-language queries are disabled
    pub workflow: Option<WorkflowStats>,
    pub recent_ingestions: Vec<IngestionLogEntry>,
}

/// GET /metrics
pub async fn metrics(
    State(state): State<AppState>,
    Query(params): Query<MetricsParams>,
) -> ApiResult<Json<MetricsResponse>> {
    let days: u32 = parse_query_number("days", params.days.as_deref())?.unwrap_or(1);
    if !(1..=365).contains(&days) {
        return Err(ApiError::BadRequest(format!(
            "days must be between 1 and 365, got {}",
            days
        )));
    }

    Ok(Json(MetricsResponse {
        ingestion: state.audit.ingestion_stats(days).await?,
        queries: state.audit.query_stats(days).await?,
        workflow: state.query_workflow.as_ref().map(|w| w.stats()),
        recent_ingestions: state.audit.recent_ingestions(RECENT_INGESTIONS).await?,
    }))
}

pub fn summary_routes() -> Router<AppState> {
    Router::new()
        .route("/data-summary", get(data_summary))
        .route("/metrics", get(metrics))
}
