//! Database initialization
//!
//! Creates the SQLite file on first run and brings the schema up to date. Every
//! statement is `IF NOT EXISTS`, so calling [`init_database`] against an existing
//! database is safe.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL lets query traffic read while an ingestion batch holds the write lock
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_schema(&pool).await?;

    info!("Database schema ready");
    Ok(pool)
}

/// Create every table and index
///
/// Split out from [`init_database`] so in-memory pools used by tests get the same schema.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_policies_table(pool).await?;
    create_ingestion_logs_table(pool).await?;
    create_query_logs_table(pool).await?;
    Ok(())
}

/// Create the insurance_policies table
///
/// Dates are stored as ISO-8601 `YYYY-MM-DD` text so lexical ordering matches
/// calendar ordering in generated SQL.
pub async fn create_policies_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS insurance_policies (
            guid TEXT PRIMARY KEY,
            policy_number TEXT NOT NULL UNIQUE,
            insured_name TEXT NOT NULL,
            sum_insured REAL NOT NULL,
            premium REAL NOT NULL,
            own_retention_ppn REAL NOT NULL DEFAULT 0,
            own_retention_sum_insured REAL NOT NULL DEFAULT 0,
            own_retention_premium REAL NOT NULL DEFAULT 0,
            treaty_ppn REAL NOT NULL DEFAULT 0,
            treaty_sum_insured REAL NOT NULL DEFAULT 0,
            treaty_premium REAL NOT NULL DEFAULT 0,
            insurance_period_start_date TEXT NOT NULL,
            insurance_period_end_date TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (length(policy_number) BETWEEN 1 AND 50),
            CHECK (length(insured_name) BETWEEN 1 AND 200),
            CHECK (sum_insured > 0),
            CHECK (premium > 0),
            CHECK (own_retention_sum_insured >= 0),
            CHECK (own_retention_premium >= 0),
            CHECK (treaty_sum_insured >= 0),
            CHECK (treaty_premium >= 0),
            CHECK (insurance_period_end_date > insurance_period_start_date)
        )
        "#,
    )
    .execute(pool)
    .await?;

    for statement in POLICY_INDEXES {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}

/// Lookup and aggregation indexes on insurance_policies
const POLICY_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_policies_insured_name ON insurance_policies(insured_name)",
    "CREATE INDEX IF NOT EXISTS idx_policies_period ON insurance_policies(insurance_period_start_date, insurance_period_end_date)",
    "CREATE INDEX IF NOT EXISTS idx_policies_sum_insured ON insurance_policies(sum_insured)",
    "CREATE INDEX IF NOT EXISTS idx_policies_premium ON insurance_policies(premium)",
    "CREATE INDEX IF NOT EXISTS idx_policies_treaty ON insurance_policies(treaty_ppn, treaty_sum_insured, treaty_premium)",
];

/// Create the data_ingestion_logs table (one row per ingestion run)
pub async fn create_ingestion_logs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS data_ingestion_logs (
            guid TEXT PRIMARY KEY,
            filename TEXT NOT NULL,
            file_size_bytes INTEGER NOT NULL DEFAULT 0,
            total_rows INTEGER NOT NULL DEFAULT 0,
            processed_rows INTEGER NOT NULL DEFAULT 0,
            failed_rows INTEGER NOT NULL DEFAULT 0,
            processing_time_ms INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            error_details TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (status IN ('success', 'partial', 'failed'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_ingestion_logs_created ON data_ingestion_logs(created_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the query_logs table (one row per natural-language query)
pub async fn create_query_logs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS query_logs (
            guid TEXT PRIMARY KEY,
            question TEXT NOT NULL,
            generated_sql TEXT,
            result_count INTEGER NOT NULL DEFAULT 0,
            processing_time_ms INTEGER NOT NULL DEFAULT 0,
            confidence_score REAL NOT NULL DEFAULT 0,
            tokens_used INTEGER NOT NULL DEFAULT 0,
            cache_hit INTEGER NOT NULL DEFAULT 0,
            error_message TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_query_logs_created ON query_logs(created_at)")
        .execute(pool)
        .await?;

    Ok(())
}
