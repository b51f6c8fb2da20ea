//! Read-only guard for model-generated SQL
//!
//! Anything that is not a single `SELECT`/`WITH` statement free of write or
//! schema keywords is replaced by [`fallback_sql`]. Accepted statements end with
//! a `LIMIT` no larger than [`MAX_LIMIT`].

use once_cell::sync::Lazy;
use regex::Regex;

/// Upper bound on rows any generated statement may return
pub const MAX_LIMIT: u32 = 1000;

const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "REPLACE", "ATTACH", "DETACH",
    "PRAGMA", "VACUUM", "REINDEX", "TRUNCATE", "GRANT", "REVOKE",
];

static TRAILING_LIMIT: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)\bLIMIT\s+(\d+)(\s+OFFSET\s+\d+)?\s*$").ok());

/// Statement ready to execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardedSql {
    pub sql: String,
    /// True when the model output was rejected
    pub used_fallback: bool,
}

/// Safe default when the model output cannot be used
pub fn fallback_sql(max_results: u32) -> String {
    format!("SELECT * FROM insurance_policies LIMIT {}", max_results.min(MAX_LIMIT))
}

/// Remove markdown code fences around a statement
pub fn strip_code_fences(text: &str) -> &str {
    let mut text = text.trim();
    if let Some(rest) = text.strip_prefix("```") {
        let rest = rest.strip_prefix("sql").or_else(|| rest.strip_prefix("SQL")).unwrap_or(rest);
        text = rest.trim_start();
        if let Some(end) = text.find("```") {
            text = &text[..end];
        }
    }
    text.trim()
}

/// Validate model output and bound its row count
pub fn guard_sql(raw: &str, max_results: u32) -> GuardedSql {
    match accept(raw) {
        Some(statement) => GuardedSql {
            sql: apply_limit(&statement, max_results),
            used_fallback: false,
        },
        None => GuardedSql {
            sql: fallback_sql(max_results),
            used_fallback: true,
        },
    }
}

fn accept(raw: &str) -> Option<String> {
    let statement = strip_code_fences(raw).trim_end_matches(|c: char| c == ';' || c.is_whitespace());
    if statement.is_empty() || statement.contains(';') {
        return None;
    }

    let upper = statement.to_uppercase();
    let mut words = upper.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'));
    let first = words.find(|w| !w.is_empty())?;
    if first != "SELECT" && first != "WITH" {
        return None;
    }

    if upper
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .any(|w| FORBIDDEN_KEYWORDS.contains(&w))
    {
        return None;
    }

    Some(statement.to_string())
}

fn apply_limit(statement: &str, max_results: u32) -> String {
    match TRAILING_LIMIT.as_ref().and_then(|re| re.captures(statement)) {
        Some(captures) => {
            let limit: u64 = captures[1].parse().unwrap_or(u64::MAX);
            if limit > MAX_LIMIT as u64 {
                let range = captures.get(1).map(|m| m.range()).unwrap_or(0..0);
                format!("{}{}{}", &statement[..range.start], MAX_LIMIT, &statement[range.end..])
            } else {
                statement.to_string()
            }
        }
        None => format!("{} LIMIT {}", statement, max_results.min(MAX_LIMIT)),
    }
}
