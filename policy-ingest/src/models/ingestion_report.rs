//! Ingestion run results
//!
//! An [`IngestionReport`] is produced for every run, including runs that failed
//! before any row was read. Callers must treat `requires_acknowledgement` as a
//! signal that rows were coerced, dropped or rejected even when the status is
//! `success`.

use crate::models::validation::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Overall outcome of an ingestion run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestionStatus {
    /// Every input row was persisted
    Success,
    /// Some rows persisted, some did not
    Partial,
    /// Nothing persisted
    Failed,
}

impl IngestionStatus {
    /// Derive status from row accounting
    pub fn from_counts(processed_rows: usize, failed_rows: usize) -> Self {
        if processed_rows == 0 {
            IngestionStatus::Failed
        } else if failed_rows == 0 {
            IngestionStatus::Success
        } else {
            IngestionStatus::Partial
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IngestionStatus::Success => "success",
            IngestionStatus::Partial => "partial",
            IngestionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for IngestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate result of one ingestion run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionReport {
    pub ingestion_id: Uuid,

    pub filename: String,

    /// Data rows read from the sheet (header excluded)
    pub total_rows: usize,

    /// Rows persisted to the store
    pub processed_rows: usize,

    /// `total_rows - processed_rows`: dropped, rejected and batch failures together
    pub failed_rows: usize,

    /// Rows dropped for a missing policy number or insured name
    pub dropped_rows: usize,

    pub processing_time_ms: u64,

    pub status: IngestionStatus,

    /// Ordered error strings: cell errors, then row rejections, then batch failures
    pub errors: Vec<String>,

    /// Ordered warning strings: dropped rows and consistency discrepancies
    pub warnings: Vec<String>,

    /// Structured cell-level errors, in row-major order
    pub validation_errors: Vec<ValidationError>,

    /// True whenever errors or warnings are non-empty
    pub requires_acknowledgement: bool,
}

impl IngestionReport {
    /// Report for a run that aborted before persistence
    pub fn failed(
        ingestion_id: Uuid,
        filename: impl Into<String>,
        processing_time_ms: u64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            ingestion_id,
            filename: filename.into(),
            total_rows: 0,
            processed_rows: 0,
            failed_rows: 0,
            dropped_rows: 0,
            processing_time_ms,
            status: IngestionStatus::Failed,
            errors: vec![error.into()],
            warnings: Vec::new(),
            validation_errors: Vec::new(),
            requires_acknowledgement: true,
        }
    }

    /// Errors joined for the audit log, `None` when there were none
    pub fn error_text(&self) -> Option<String> {
        if self.errors.is_empty() {
            None
        } else {
            Some(self.errors.join("; "))
        }
    }
}

/// Result of checking a sheet's structure without ingesting it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureReport {
    pub valid: bool,
    pub total_rows: usize,
    pub total_columns: usize,
    /// Normalized headers in sheet order
    pub columns: Vec<String>,
    /// Canonical name → detected header
    pub detected_mapping: BTreeMap<String, String>,
    pub missing_fields: Vec<String>,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}
