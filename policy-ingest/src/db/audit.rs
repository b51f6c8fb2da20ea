//! SQLite audit log
//!
//! One `data_ingestion_logs` row per ingestion run and one `query_logs` row per
//! natural-language query, plus the aggregate statistics served by `/metrics`.

use crate::db::AuditSink;
use crate::utils::retry_on_lock;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use policy_common::db::{IngestionLogEntry, QueryLogEntry};
use policy_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

const MAX_LOCK_WAIT_MS: u64 = 2000;

/// Ingestion statistics over a trailing window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestionStats {
    pub period_days: u32,
    pub total_ingestions: i64,
    pub successful_ingestions: i64,
    pub partial_ingestions: i64,
    pub failed_ingestions: i64,
    pub total_rows_processed: i64,
    pub total_rows_failed: i64,
    pub average_processing_time_ms: f64,
}

/// Query statistics over a trailing window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryStats {
    pub period_days: u32,
    pub total_queries: i64,
    pub failed_queries: i64,
    pub cache_hits: i64,
    pub average_processing_time_ms: f64,
    pub average_confidence: f64,
    pub total_tokens_used: i64,
}

/// Audit log backed by the shared SQLite pool
#[derive(Debug, Clone)]
pub struct SqliteAuditLog {
    pool: SqlitePool,
}

impl SqliteAuditLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn ingestion_stats(&self, days: u32) -> Result<IngestionStats> {
        let since = window_start(days);

        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN status = 'success' THEN 1 ELSE 0 END), 0) AS successful,
                COALESCE(SUM(CASE WHEN status = 'partial' THEN 1 ELSE 0 END), 0) AS partial,
                COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0) AS failed,
                COALESCE(SUM(processed_rows), 0) AS rows_processed,
                COALESCE(SUM(failed_rows), 0) AS rows_failed,
                COALESCE(AVG(CAST(processing_time_ms AS REAL)), 0.0) AS avg_time
            FROM data_ingestion_logs
            WHERE created_at >= ?
            "#,
        )
        .bind(&since)
        .fetch_one(&self.pool)
        .await?;

        Ok(IngestionStats {
            period_days: days,
            total_ingestions: row.get("total"),
            successful_ingestions: row.get("successful"),
            partial_ingestions: row.get("partial"),
            failed_ingestions: row.get("failed"),
            total_rows_processed: row.get("rows_processed"),
            total_rows_failed: row.get("rows_failed"),
            average_processing_time_ms: row.get("avg_time"),
        })
    }

    pub async fn query_stats(&self, days: u32) -> Result<QueryStats> {
        let since = window_start(days);

        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN error_message IS NOT NULL THEN 1 ELSE 0 END), 0) AS failed,
                COALESCE(SUM(cache_hit), 0) AS cache_hits,
                COALESCE(AVG(CAST(processing_time_ms AS REAL)), 0.0) AS avg_time,
                COALESCE(AVG(confidence_score), 0.0) AS avg_confidence,
                COALESCE(SUM(tokens_used), 0) AS tokens
            FROM query_logs
            WHERE created_at >= ?
            "#,
        )
        .bind(&since)
        .fetch_one(&self.pool)
        .await?;

        Ok(QueryStats {
            period_days: days,
            total_queries: row.get("total"),
            failed_queries: row.get("failed"),
            cache_hits: row.get("cache_hits"),
            average_processing_time_ms: row.get("avg_time"),
            average_confidence: row.get("avg_confidence"),
            total_tokens_used: row.get("tokens"),
        })
    }

    /// Most recent ingestion runs, newest first
    pub async fn recent_ingestions(&self, limit: u32) -> Result<Vec<IngestionLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT filename, file_size_bytes, total_rows, processed_rows, failed_rows,
                   processing_time_ms, status, error_details
            FROM data_ingestion_logs
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| IngestionLogEntry {
                filename: row.get("filename"),
                file_size_bytes: row.get::<i64, _>("file_size_bytes").max(0) as u64,
                total_rows: row.get::<i64, _>("total_rows").max(0) as usize,
                processed_rows: row.get::<i64, _>("processed_rows").max(0) as usize,
                failed_rows: row.get::<i64, _>("failed_rows").max(0) as usize,
                processing_time_ms: row.get::<i64, _>("processing_time_ms").max(0) as u64,
                status: row.get("status"),
                error_details: row.get("error_details"),
            })
            .collect())
    }
}

/// RFC 3339 timestamp `days` ago; audit rows store RFC 3339 so text comparison orders correctly
fn window_start(days: u32) -> String {
    (Utc::now() - Duration::days(i64::from(days))).to_rfc3339()
}

#[async_trait]
impl AuditSink for SqliteAuditLog {
    async fn record_ingestion(&self, entry: &IngestionLogEntry) -> Result<()> {
        let guid = Uuid::new_v4().to_string();
        let created_at = Utc::now().to_rfc3339();

        retry_on_lock("ingestion audit", MAX_LOCK_WAIT_MS, || async {
            sqlx::query(
                r#"
                INSERT INTO data_ingestion_logs (
                    guid, filename, file_size_bytes, total_rows, processed_rows, failed_rows,
                    processing_time_ms, status, error_details, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&guid)
            .bind(&entry.filename)
            .bind(entry.file_size_bytes as i64)
            .bind(entry.total_rows as i64)
            .bind(entry.processed_rows as i64)
            .bind(entry.failed_rows as i64)
            .bind(entry.processing_time_ms as i64)
            .bind(&entry.status)
            .bind(&entry.error_details)
            .bind(&created_at)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
            Ok(())
        })
        .await
    }

    async fn record_query(&self, entry: &QueryLogEntry) -> Result<()> {
        let guid = Uuid::new_v4().to_string();
        let created_at = Utc::now().to_rfc3339();

        retry_on_lock("query audit", MAX_LOCK_WAIT_MS, || async {
            sqlx::query(
                r#"
                INSERT INTO query_logs (
                    guid, question, generated_sql, result_count, processing_time_ms,
                    confidence_score, tokens_used, cache_hit, error_message, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&guid)
            .bind(&entry.question)
            .bind(&entry.generated_sql)
            .bind(entry.result_count as i64)
            .bind(entry.processing_time_ms as i64)
            .bind(entry.confidence_score)
            .bind(entry.tokens_used as i64)
            .bind(entry.cache_hit)
            .bind(&entry.error_message)
            .bind(&created_at)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
            Ok(())
        })
        .await
    }
}
