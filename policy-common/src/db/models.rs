//! Database models

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Canonical, validated policy row
///
/// Only the row validator constructs these; downstream code treats them as immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRecord {
    pub policy_number: String,
    pub insured_name: String,
    pub sum_insured: f64,
    pub premium: f64,
    pub own_retention_ppn: f64,
    pub own_retention_sum_insured: f64,
    pub own_retention_premium: f64,
    pub treaty_ppn: f64,
    pub treaty_sum_insured: f64,
    pub treaty_premium: f64,
    pub insurance_period_start_date: NaiveDate,
    pub insurance_period_end_date: NaiveDate,
}

/// One audit row per ingestion run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionLogEntry {
    pub filename: String,
    pub file_size_bytes: u64,
    pub total_rows: usize,
    pub processed_rows: usize,
    pub failed_rows: usize,
    pub processing_time_ms: u64,
    /// "success", "partial" or "failed"
    pub status: String,
    pub error_details: Option<String>,
}

/// One row per natural-language query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryLogEntry {
    pub question: String,
    pub generated_sql: Option<String>,
    pub result_count: usize,
    pub processing_time_ms: u64,
    pub confidence_score: f64,
    pub tokens_used: u64,
    pub cache_hit: bool,
    pub error_message: Option<String>,
}
