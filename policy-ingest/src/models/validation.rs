//! Cell-level validation errors
//!
//! A `ValidationError` is recorded whenever a cell had to be coerced or flagged.
//! The offending value is preserved verbatim in `raw_value` even when the pipeline
//! substituted a default so the rest of the row could continue.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of cell-level problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Text could not be parsed as a number; 0.0 was substituted
    InvalidNumeric,
    /// Percentage outside [0, 100]; value kept as parsed
    InvalidPercentage,
    /// Date or date range could not be parsed; fallback dates were substituted
    InvalidDateFormat,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidNumeric => "invalid_numeric",
            ErrorKind::InvalidPercentage => "invalid_percentage",
            ErrorKind::InvalidDateFormat => "invalid_date_format",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One cell-level validation failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    /// 1-indexed sheet row (header is row 1, first data row is row 2)
    pub row_number: usize,

    /// Canonical column name
    pub column_name: String,

    pub error_kind: ErrorKind,

    pub message: String,

    /// Original cell text before sanitization
    pub raw_value: Option<String>,
}

impl ValidationError {
    pub fn new(
        row_number: usize,
        column_name: impl Into<String>,
        error_kind: ErrorKind,
        message: impl Into<String>,
        raw_value: Option<String>,
    ) -> Self {
        Self {
            row_number,
            column_name: column_name.into(),
            error_kind,
            message: message.into(),
            raw_value,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Row {}, column {} ({}): {}",
            self.row_number, self.column_name, self.error_kind, self.message
        )
    }
}
