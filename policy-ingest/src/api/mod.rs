//! HTTP API handlers for policy-ingest
//!
//! | Route | Handler |
//! |---|---|
//! | `POST /ingest` | [`ingest::ingest_file`] |
//! | `POST /ingest/validate` | [`ingest::validate_file`] |
//! | `POST /policies` | [`policies::create_policy`] |
//! | `GET /policies/:policy_number` | [`policies::get_policy`] |
//! | `POST /query` | [`query::query_policies`] |
//! | `GET /data-summary` | [`summary::data_summary`] |
//! | `GET /metrics` | [`summary::metrics`] |
//! | `GET /health` | [`health::health_check`] |

use crate::{ApiError, ApiResult};
use std::str::FromStr;

pub mod health;
pub mod ingest;
pub mod policies;
pub mod query;
pub mod summary;

pub use health::health_routes;
pub use ingest::ingest_routes;
pub use policies::policy_routes;
pub use query::query_routes;
pub use summary::summary_routes;

/// Parse an optional numeric query parameter, answering 400 with the JSON error body
pub(crate) fn parse_query_number<T: FromStr>(name: &str, raw: Option<&str>) -> ApiResult<Option<T>> {
    raw.map(|value| {
        value.trim().parse::<T>().map_err(|_| {
            ApiError::BadRequest(format!("{} must be a non-negative integer, got '{}'", name, value))
        })
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_number() {
        assert_eq!(parse_query_number::<usize>("batch_size", None).unwrap(), None);
        assert_eq!(parse_query_number::<usize>("batch_size", Some(" 500 ")).unwrap(), Some(500));
        assert!(matches!(
            parse_query_number::<usize>("batch_size", Some("lots")),
            Err(ApiError::BadRequest(msg)) if msg == "batch_size must be a non-negative integer, got 'lots'"
        ));
        assert!(parse_query_number::<u32>("days", Some("-1")).is_err());
    }
}
