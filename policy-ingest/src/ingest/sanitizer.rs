//! Cell sanitization
//!
//! Numeric cells never fail outright: unparseable text is recorded as an
//! `invalid_numeric` error and replaced by 0.0 so the rest of the row survives.
//! Percentages are range-checked separately and keep their parsed value.

use crate::ingest::spreadsheet::CellValue;
use crate::models::{CanonicalField, ErrorKind, ValidationError};

/// Characters removed before numeric parsing
const STRIPPED_CHARS: [char; 8] = [',', '%', '₦', '$', '€', '£', '¥', '₹'];

/// Text values treated as "no value"
const NULL_TOKENS: [&str; 3] = ["nan", "null", "none"];

/// Sanitize a numeric cell
///
/// Returns the parsed value, or 0.0 plus an `invalid_numeric` error when the
/// cell text is not a number. Blank and null-like cells yield 0.0 with no error.
pub fn sanitize_numeric(
    cell: &CellValue,
    row_number: usize,
    field: CanonicalField,
) -> (f64, Option<ValidationError>) {
    if let CellValue::Number(n) = cell {
        if n.is_nan() {
            return (0.0, None);
        }
        if n.is_finite() {
            return (*n, None);
        }
    }

    let raw = cell.to_text();
    let cleaned: String = raw.chars().filter(|c| !STRIPPED_CHARS.contains(c)).collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || NULL_TOKENS.iter().any(|t| cleaned.eq_ignore_ascii_case(t)) {
        return (0.0, None);
    }

    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() => (value, None),
        _ => (
            0.0,
            Some(ValidationError::new(
                row_number,
                field.as_str(),
                ErrorKind::InvalidNumeric,
                format!("Cannot convert '{}' to number", cleaned),
                Some(raw),
            )),
        ),
    }
}

/// Flag a percentage outside [0, 100]
///
/// The value itself is left untouched.
pub fn check_percentage(
    value: f64,
    row_number: usize,
    field: CanonicalField,
) -> Option<ValidationError> {
    if (0.0..=100.0).contains(&value) {
        None
    } else {
        Some(ValidationError::new(
            row_number,
            field.as_str(),
            ErrorKind::InvalidPercentage,
            format!("Percentage must be between 0 and 100, got {}", value),
            Some(value.to_string()),
        ))
    }
}

/// Sanitize a string cell: trimmed, with a literal "nan" treated as empty
pub fn sanitize_text(cell: &CellValue) -> String {
    let text = cell.to_text();
    let trimmed = text.trim();
    if trimmed.eq_ignore_ascii_case("nan") {
        String::new()
    } else {
        trimmed.to_string()
    }
}
