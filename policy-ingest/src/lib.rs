//! policy-ingest library interface
//!
//! Spreadsheet ingestion, the SQLite policy store and the natural-language
//! query workflow, exposed over HTTP by the `policy-ingest` binary.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod models;
pub mod query;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use crate::config::Settings;
use crate::db::{SqliteAuditLog, SqlitePolicyStore};
use crate::ingest::IngestionPipeline;
use crate::query::{LlmClient, QueryWorkflow};
use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Multipart framing allowance on top of the configured file size limit
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    pub policies: SqlitePolicyStore,
    pub audit: SqliteAuditLog,
    pub pipeline: Arc<IngestionPipeline>,
    /// `None` while no LLM API key is configured
    pub query_workflow: Option<Arc<QueryWorkflow>>,
    pub settings: Arc<Settings>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, settings: Settings, llm: Option<Arc<dyn LlmClient>>) -> Self {
        let policies = SqlitePolicyStore::new(db.clone());
        let audit = SqliteAuditLog::new(db.clone());

        let pipeline = IngestionPipeline::from_config(
            Arc::new(policies.clone()),
            Arc::new(audit.clone()),
            &settings.ingestion,
        );

        let query_workflow = llm.map(|llm| {
            Arc::new(QueryWorkflow::new(
                llm,
                policies.clone(),
                Arc::new(audit.clone()),
            ))
        });

        Self {
            db,
            policies,
            audit,
            pipeline: Arc::new(pipeline),
            query_workflow,
            settings: Arc::new(settings),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.settings.ingestion.max_file_size_bytes() as usize + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .merge(api::ingest_routes())
        .merge(api::policy_routes())
        .merge(api::query_routes())
        .merge(api::summary_routes())
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
