//! SQLite policy store
//!
//! Each batch runs in its own transaction, wrapped in [`retry_on_lock`] so a
//! concurrent writer holding the lock delays the batch instead of failing it.

use crate::db::PolicyStore;
use crate::utils::retry_on_lock;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use policy_common::db::PolicyRecord;
use policy_common::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, SqlitePool, TypeInfo, ValueRef};
use tracing::debug;
use uuid::Uuid;

/// Default maximum time a batch waits on a locked database
const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

/// Persisted policy with storage metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPolicy {
    pub guid: Uuid,
    #[serde(flatten)]
    pub record: PolicyRecord,
    pub created_at: String,
    pub updated_at: String,
}

/// Aggregates over every stored policy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialSummary {
    pub total_policies: i64,
    pub total_sum_insured: f64,
    pub total_premium: f64,
    pub average_sum_insured: f64,
    pub average_premium: f64,
    pub total_own_retention_sum_insured: f64,
    pub total_own_retention_premium: f64,
    pub total_treaty_sum_insured: f64,
    pub total_treaty_premium: f64,
}

/// Coverage window over every stored policy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DateRangeSummary {
    pub earliest_start_date: Option<NaiveDate>,
    pub latest_end_date: Option<NaiveDate>,
    /// Policies whose period contains today
    pub active_policies: i64,
    /// Policies whose period ended before today
    pub expired_policies: i64,
}

/// Policy store backed by the shared SQLite pool
#[derive(Debug, Clone)]
pub struct SqlitePolicyStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqlitePolicyStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }

    pub fn with_max_lock_wait(mut self, max_lock_wait_ms: u64) -> Self {
        self.max_lock_wait_ms = max_lock_wait_ms;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn insert_batch_once(&self, batch: &[PolicyRecord]) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        for record in batch {
            insert_policy(&mut tx, Uuid::new_v4(), record, &now).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Count of stored policies
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM insurance_policies")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn financial_summary(&self) -> Result<FinancialSummary> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total_policies,
                COALESCE(SUM(sum_insured), 0.0) AS total_sum_insured,
                COALESCE(SUM(premium), 0.0) AS total_premium,
                COALESCE(AVG(sum_insured), 0.0) AS average_sum_insured,
                COALESCE(AVG(premium), 0.0) AS average_premium,
                COALESCE(SUM(own_retention_sum_insured), 0.0) AS total_own_retention_sum_insured,
                COALESCE(SUM(own_retention_premium), 0.0) AS total_own_retention_premium,
                COALESCE(SUM(treaty_sum_insured), 0.0) AS total_treaty_sum_insured,
                COALESCE(SUM(treaty_premium), 0.0) AS total_treaty_premium
            FROM insurance_policies
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(FinancialSummary {
            total_policies: row.get("total_policies"),
            total_sum_insured: row.get("total_sum_insured"),
            total_premium: row.get("total_premium"),
            average_sum_insured: row.get("average_sum_insured"),
            average_premium: row.get("average_premium"),
            total_own_retention_sum_insured: row.get("total_own_retention_sum_insured"),
            total_own_retention_premium: row.get("total_own_retention_premium"),
            total_treaty_sum_insured: row.get("total_treaty_sum_insured"),
            total_treaty_premium: row.get("total_treaty_premium"),
        })
    }

    pub async fn date_range_summary(&self) -> Result<DateRangeSummary> {
        let today = Utc::now().date_naive().to_string();

        let row = sqlx::query(
            r#"
            SELECT
                MIN(insurance_period_start_date) AS earliest_start,
                MAX(insurance_period_end_date) AS latest_end,
                COALESCE(SUM(CASE WHEN insurance_period_start_date <= ?1
                                   AND insurance_period_end_date >= ?1 THEN 1 ELSE 0 END), 0) AS active,
                COALESCE(SUM(CASE WHEN insurance_period_end_date < ?1 THEN 1 ELSE 0 END), 0) AS expired
            FROM insurance_policies
            "#,
        )
        .bind(&today)
        .fetch_one(&self.pool)
        .await?;

        let earliest: Option<String> = row.get("earliest_start");
        let latest: Option<String> = row.get("latest_end");

        Ok(DateRangeSummary {
            earliest_start_date: earliest.as_deref().map(parse_stored_date).transpose()?,
            latest_end_date: latest.as_deref().map(parse_stored_date).transpose()?,
            active_policies: row.get("active"),
            expired_policies: row.get("expired"),
        })
    }

    /// Run a caller-supplied statement and return rows as JSON objects
    ///
    /// The caller is responsible for ensuring the statement is read-only.
    pub async fn execute_query(&self, sql: &str) -> Result<Vec<Map<String, Value>>> {
        debug!(sql, "Executing generated query");
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }
}

#[async_trait]
impl PolicyStore for SqlitePolicyStore {
    async fn insert_batch(&self, batch: &[PolicyRecord]) -> Result<()> {
        retry_on_lock("policy batch insert", self.max_lock_wait_ms, || async {
            self.insert_batch_once(batch).await
        })
        .await
    }

    async fn find_by_unique_key(&self, policy_number: &str) -> Result<Option<StoredPolicy>> {
        let row = sqlx::query(
            r#"
            SELECT guid, policy_number, insured_name, sum_insured, premium,
                   own_retention_ppn, own_retention_sum_insured, own_retention_premium,
                   treaty_ppn, treaty_sum_insured, treaty_premium,
                   insurance_period_start_date, insurance_period_end_date,
                   created_at, updated_at
            FROM insurance_policies
            WHERE policy_number = ?
            "#,
        )
        .bind(policy_number)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(stored_policy_from_row).transpose()
    }

    async fn create_one(&self, record: &PolicyRecord) -> Result<StoredPolicy> {
        if self.find_by_unique_key(&record.policy_number).await?.is_some() {
            return Err(Error::Duplicate(format!(
                "Policy number '{}' already exists",
                record.policy_number
            )));
        }

        let guid = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        insert_policy(&mut tx, guid, record, &now).await?;
        tx.commit().await?;

        Ok(StoredPolicy {
            guid,
            record: record.clone(),
            created_at: now.clone(),
            updated_at: now,
        })
    }
}

async fn insert_policy(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    guid: Uuid,
    record: &PolicyRecord,
    now: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO insurance_policies (
            guid, policy_number, insured_name, sum_insured, premium,
            own_retention_ppn, own_retention_sum_insured, own_retention_premium,
            treaty_ppn, treaty_sum_insured, treaty_premium,
            insurance_period_start_date, insurance_period_end_date,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(guid.to_string())
    .bind(&record.policy_number)
    .bind(&record.insured_name)
    .bind(record.sum_insured)
    .bind(record.premium)
    .bind(record.own_retention_ppn)
    .bind(record.own_retention_sum_insured)
    .bind(record.own_retention_premium)
    .bind(record.treaty_ppn)
    .bind(record.treaty_sum_insured)
    .bind(record.treaty_premium)
    .bind(record.insurance_period_start_date.to_string())
    .bind(record.insurance_period_end_date.to_string())
    .bind(now)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn parse_stored_date(text: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|e| Error::Internal(format!("Invalid stored date '{}': {}", text, e)))
}

fn stored_policy_from_row(row: &SqliteRow) -> Result<StoredPolicy> {
    let guid_str: String = row.get("guid");
    let guid = Uuid::parse_str(&guid_str)
        .map_err(|e| Error::Internal(format!("Invalid policy guid '{}': {}", guid_str, e)))?;

    let start: String = row.get("insurance_period_start_date");
    let end: String = row.get("insurance_period_end_date");

    Ok(StoredPolicy {
        guid,
        record: PolicyRecord {
            policy_number: row.get("policy_number"),
            insured_name: row.get("insured_name"),
            sum_insured: row.get("sum_insured"),
            premium: row.get("premium"),
            own_retention_ppn: row.get("own_retention_ppn"),
            own_retention_sum_insured: row.get("own_retention_sum_insured"),
            own_retention_premium: row.get("own_retention_premium"),
            treaty_ppn: row.get("treaty_ppn"),
            treaty_sum_insured: row.get("treaty_sum_insured"),
            treaty_premium: row.get("treaty_premium"),
            insurance_period_start_date: parse_stored_date(&start)?,
            insurance_period_end_date: parse_stored_date(&end)?,
        },
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

/// Convert a dynamically typed row into a JSON object keyed by column name
fn row_to_json(row: &SqliteRow) -> Map<String, Value> {
    let mut object = Map::new();

    for (index, column) in row.columns().iter().enumerate() {
        let type_name = match row.try_get_raw(index) {
            Ok(raw) if raw.is_null() => None,
            Ok(raw) => Some(raw.type_info().name().to_string()),
            Err(_) => None,
        };

        let value = match type_name.as_deref() {
            None => Value::Null,
            Some("INTEGER") => row.try_get::<i64, _>(index).map(Value::from).unwrap_or(Value::Null),
            Some("REAL") => row.try_get::<f64, _>(index).map(Value::from).unwrap_or(Value::Null),
            Some("BLOB") => Value::Null,
            Some(_) => row.try_get::<String, _>(index).map(Value::from).unwrap_or(Value::Null),
        };

        object.insert(column.name().to_string(), value);
    }

    object
}
