//! Integration tests for database initialization
//!
//! - The database file and its parent directories are created on first run
//! - Re-opening an existing database is idempotent
//! - Table constraints reject rows the row validator would also reject

use policy_common::db::init::{create_schema, init_database};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::Row;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("policies.db");
    assert!(!db_path.exists());

    let result = init_database(&db_path).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("policies.db");

    let pool1 = init_database(&db_path).await.unwrap();
    pool1.close().await;

    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());
}

#[tokio::test]
async fn test_schema_creates_all_tables() {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    create_schema(&pool).await.unwrap();
    // Second run must be a no-op
    create_schema(&pool).await.unwrap();

    let rows = sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
        .fetch_all(&pool)
        .await
        .unwrap();
    let names: Vec<String> = rows.iter().map(|r| r.get::<String, _>("name")).collect();

    assert!(names.contains(&"insurance_policies".to_string()));
    assert!(names.contains(&"data_ingestion_logs".to_string()));
    assert!(names.contains(&"query_logs".to_string()));
}

#[tokio::test]
async fn test_schema_creates_policy_indexes() {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    create_schema(&pool).await.unwrap();

    let indexes: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = 'insurance_policies' AND name LIKE 'idx_%' ORDER BY name",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    assert_eq!(
        indexes,
        vec![
            "idx_policies_insured_name",
            "idx_policies_period",
            "idx_policies_premium",
            "idx_policies_sum_insured",
            "idx_policies_treaty",
        ]
    );
}

#[tokio::test]
async fn test_policy_constraints_reject_inverted_period() {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    create_schema(&pool).await.unwrap();

    let result = sqlx::query(
        r#"
        INSERT INTO insurance_policies (
            guid, policy_number, insured_name, sum_insured, premium,
            insurance_period_start_date, insurance_period_end_date
        ) VALUES ('g1', 'P-1', 'Acme', 1000.0, 10.0, '2024-12-31', '2024-01-01')
        "#,
    )
    .execute(&pool)
    .await;

    assert!(result.is_err(), "Inverted insurance period must be rejected");
}

#[tokio::test]
async fn test_ingestion_log_status_constraint() {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    create_schema(&pool).await.unwrap();

    let ok = sqlx::query(
        "INSERT INTO data_ingestion_logs (guid, filename, status) VALUES ('a', 'f.xlsx', 'partial')",
    )
    .execute(&pool)
    .await;
    assert!(ok.is_ok());

    let bad = sqlx::query(
        "INSERT INTO data_ingestion_logs (guid, filename, status) VALUES ('b', 'f.xlsx', 'unknown')",
    )
    .execute(&pool)
    .await;
    assert!(bad.is_err());
}
