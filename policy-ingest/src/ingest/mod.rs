//! Spreadsheet ingestion pipeline
//!
//! Leaves first:
//! - [`spreadsheet`]: raw bytes → header row + typed cells
//! - [`sanitizer`]: one cell → number or trimmed text, with per-cell error capture
//! - [`period_parser`]: free-text insurance period → (start, end) dates
//! - [`column_mapper`]: arbitrary headers → canonical fields
//! - [`row_validator`]: cleaned row → accepted record, dropped or rejected
//! - [`pipeline`]: composes the above, batches persistence, reports

pub mod column_mapper;
pub mod period_parser;
pub mod pipeline;
pub mod row_validator;
pub mod sanitizer;
pub mod spreadsheet;

pub use column_mapper::{map_columns, resolve_columns, ColumnAliases, ColumnResolution};
pub use pipeline::IngestionPipeline;
pub use row_validator::{check_percentages, check_record, CleanedRow, RowOutcome, RowValidator};
pub use spreadsheet::{CellValue, RawSpreadsheet};

use thiserror::Error;

/// Structural ingestion failures
///
/// Any of these aborts the run before persistence. The pipeline converts them into a
/// failed [`crate::models::IngestionReport`]; they never escape `ingest`.
#[derive(Debug, Error)]
pub enum IngestError {
    /// File extension is not one of the accepted spreadsheet types
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// Workbook or CSV could not be decoded
    #[error("Spreadsheet parsing failed: {0}")]
    Unreadable(String),

    /// Sheet has no header row
    #[error("Spreadsheet has no header row")]
    NoHeader,

    /// Required canonical fields did not resolve to any header
    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    /// Sheet has a header but no data rows
    #[error("No valid data found in file")]
    NoData,

    /// Decoding task panicked or was cancelled
    #[error("Spreadsheet decoder failed: {0}")]
    DecoderFailed(String),
}
