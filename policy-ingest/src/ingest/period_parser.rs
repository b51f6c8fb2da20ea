//! Insurance period parsing
//!
//! A period column holds two dates separated by a hyphen, e.g.
//! `01/01/2024 - 31/12/2024`. Patterns are tried in a fixed order and the first
//! one that matches anywhere in the text is used. Each captured side is then parsed
//! with the first of [`DATE_FORMATS`] that accepts it, so `03/04/2024` is always
//! read day-first. The format order is load-bearing: changing it changes the dates
//! assigned to previously ingested files.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Date formats, in priority order
pub const DATE_FORMATS: [&str; 6] = ["%d/%m/%Y", "%m/%d/%Y", "%Y-%m-%d", "%d-%m-%Y", "%d.%m.%Y", "%Y/%m/%d"];

static PERIOD_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(\d{1,2}/\d{1,2}/\d{4})\s*-\s*(\d{1,2}/\d{1,2}/\d{4})",
        r"(\d{4}-\d{1,2}-\d{1,2})\s*-\s*(\d{4}-\d{1,2}-\d{1,2})",
        r"(\d{1,2}-\d{1,2}-\d{4})\s*-\s*(\d{1,2}-\d{1,2}-\d{4})",
        r"(\d{1,2}\.\d{1,2}\.\d{4})\s*-\s*(\d{1,2}\.\d{1,2}\.\d{4})",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Period parsing failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeriodError {
    #[error("Cannot parse insurance period: {0}")]
    NoMatch(String),

    #[error("Cannot parse date '{0}' in insurance period")]
    InvalidDate(String),
}

/// Range substituted when a period cannot be parsed
pub fn fallback_period() -> (NaiveDate, NaiveDate) {
    (
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or(NaiveDate::MIN),
        NaiveDate::from_ymd_opt(2024, 12, 31).unwrap_or(NaiveDate::MIN),
    )
}

/// Parse a free-text insurance period into (start, end)
///
/// Ordering of the two dates is not checked here.
pub fn parse_period(text: &str) -> Result<(NaiveDate, NaiveDate), PeriodError> {
    let text = text.trim();

    let captures = PERIOD_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(text))
        .ok_or_else(|| PeriodError::NoMatch(text.to_string()))?;

    let start_text = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
    let end_text = captures.get(2).map(|m| m.as_str()).unwrap_or_default();

    let start = parse_single_date(start_text)
        .ok_or_else(|| PeriodError::InvalidDate(start_text.to_string()))?;
    let end =
        parse_single_date(end_text).ok_or_else(|| PeriodError::InvalidDate(end_text.to_string()))?;

    Ok((start, end))
}

/// Parse one date with the first matching format
pub fn parse_single_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
}
