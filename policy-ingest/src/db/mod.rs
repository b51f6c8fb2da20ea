//! Persistence for policy-ingest
//!
//! The ingestion pipeline talks to storage through two seams:
//! - [`PolicyStore`]: batched policy inserts and lookups
//! - [`AuditSink`]: one audit row per ingestion run and per query
//!
//! SQLite implementations live in [`policies`] and [`audit`].

pub mod audit;
pub mod policies;

pub use audit::{IngestionStats, QueryStats, SqliteAuditLog};
pub use policies::{DateRangeSummary, FinancialSummary, SqlitePolicyStore, StoredPolicy};

use async_trait::async_trait;
use policy_common::db::{IngestionLogEntry, PolicyRecord, QueryLogEntry};
use policy_common::Result;
use tracing::warn;

/// Accounting for one `create_many` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub succeeded: usize,
    pub failed: usize,
    /// One entry per failed batch: `"Batch {n}: {error}"`, 1-indexed
    pub errors: Vec<String>,
}

/// Policy persistence
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Insert one batch atomically: either every record commits or none do
    async fn insert_batch(&self, batch: &[PolicyRecord]) -> Result<()>;

    /// Look up a policy by its policy number
    async fn find_by_unique_key(&self, policy_number: &str) -> Result<Option<StoredPolicy>>;

    /// Insert a single policy, rejecting an existing policy number with `Error::Duplicate`
    ///
    /// Unlike [`PolicyStore::create_many`], the duplicate check runs before the insert.
    async fn create_one(&self, record: &PolicyRecord) -> Result<StoredPolicy>;

    /// Insert records in sequential batches of `batch_size`
    ///
    /// A failing batch is counted as wholly failed and does not stop later batches.
    /// Batches that already committed are never rolled back.
    async fn create_many(&self, records: &[PolicyRecord], batch_size: usize) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for (index, batch) in records.chunks(batch_size.max(1)).enumerate() {
            match self.insert_batch(batch).await {
                Ok(()) => outcome.succeeded += batch.len(),
                Err(e) => {
                    warn!(batch = index + 1, size = batch.len(), error = %e, "Policy batch failed");
                    outcome.failed += batch.len();
                    outcome.errors.push(format!("Batch {}: {}", index + 1, e));
                }
            }
        }

        outcome
    }
}

/// Audit trail writer
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record_ingestion(&self, entry: &IngestionLogEntry) -> Result<()>;

    async fn record_query(&self, entry: &QueryLogEntry) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use policy_common::Error;
    use std::sync::Mutex;

    /// Store that fails every batch containing a policy number starting with "BAD"
    struct PickyStore {
        inserted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PolicyStore for PickyStore {
        async fn insert_batch(&self, batch: &[PolicyRecord]) -> Result<()> {
            if batch.iter().any(|r| r.policy_number.starts_with("BAD")) {
                return Err(Error::Internal("constraint failed".to_string()));
            }
            let mut inserted = self.inserted.lock().unwrap();
            inserted.extend(batch.iter().map(|r| r.policy_number.clone()));
            Ok(())
        }

        async fn find_by_unique_key(&self, _policy_number: &str) -> Result<Option<StoredPolicy>> {
            Ok(None)
        }

        async fn create_one(&self, _record: &PolicyRecord) -> Result<StoredPolicy> {
            Err(Error::Internal("unused".to_string()))
        }
    }

    fn record(policy_number: &str) -> PolicyRecord {
        PolicyRecord {
            policy_number: policy_number.to_string(),
            insured_name: "Acme".to_string(),
            sum_insured: 100.0,
            premium: 1.0,
            own_retention_ppn: 50.0,
            own_retention_sum_insured: 50.0,
            own_retention_premium: 0.5,
            treaty_ppn: 50.0,
            treaty_sum_insured: 50.0,
            treaty_premium: 0.5,
            insurance_period_start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            insurance_period_end_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_failed_batch_does_not_poison_later_batches() {
        let store = PickyStore {
            inserted: Mutex::new(Vec::new()),
        };
        let records: Vec<_> = ["P1", "P2", "BAD3", "P4", "P5"]
            .iter()
            .map(|n| record(n))
            .collect();

        let outcome = store.create_many(&records, 2).await;

        assert_eq!(outcome.succeeded, 3);
        assert_eq!(outcome.failed, 2);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].starts_with("Batch 2: "));
        assert_eq!(*store.inserted.lock().unwrap(), vec!["P1", "P2", "P5"]);
    }

    #[tokio::test]
    async fn test_zero_batch_size_is_treated_as_one() {
        let store = PickyStore {
            inserted: Mutex::new(Vec::new()),
        };
        let records = vec![record("P1"), record("BAD2")];

        let outcome = store.create_many(&records, 0).await;
        assert_eq!(outcome.succeeded, 1);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.errors, vec!["Batch 2: Internal error: constraint failed".to_string()]);
    }
}
