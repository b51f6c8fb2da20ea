//! Ingestion pipeline against a file-backed database and real workbooks

use policy_common::config::IngestionConfig;
use policy_common::db::init_database;
use policy_ingest::db::{PolicyStore, SqliteAuditLog, SqlitePolicyStore};
use policy_ingest::ingest::IngestionPipeline;
use policy_ingest::models::{ErrorKind, IngestionStatus};
use rust_xlsxwriter::{ExcelDateTime, Format, Workbook, XlsxError};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;

const STANDARD_HEADERS: [&str; 11] = [
    "POLICY NUMBER",
    "INSURED NAME",
    "SUM INSURED",
    "PREMIUM",
    "OWN RETENTION %",
    "OWN RETENTION SUM INSURED",
    "OWN RETENTION PREMIUM",
    "TREATY %",
    "TREATY SUM INSURED",
    "TREATY PREMIUM",
    "PERIOD OF INSURANCE",
];

/// One sheet cell in a fixture row
enum Cell<'a> {
    Text(&'a str),
    Number(f64),
    /// Date cell (year, month, day) with a date number format
    Date(u16, u8, u8),
    Blank,
}

use Cell::{Blank, Date, Number, Text};

fn workbook(headers: &[&str], rows: &[Vec<Cell>]) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let date_format = Format::new().set_num_format("yyyy-mm-dd");
    let sheet = workbook.add_worksheet();

    for (col, header) in headers.iter().enumerate() {
        sheet.write_string(0, col as u16, *header)?;
    }
    for (r, row) in rows.iter().enumerate() {
        let r = r as u32 + 1;
        for (col, cell) in row.iter().enumerate() {
            let col = col as u16;
            match cell {
                Text(s) => {
                    sheet.write_string(r, col, *s)?;
                }
                Number(n) => {
                    sheet.write_number(r, col, *n)?;
                }
                Date(year, month, day) => {
                    let date = ExcelDateTime::from_ymd(*year, *month, *day)?;
                    sheet.write_datetime_with_format(r, col, &date, &date_format)?;
                }
                Blank => {}
            }
        }
    }

    workbook.save_to_buffer()
}

fn policy_row<'a>(
    number: &'a str,
    name: &'a str,
    sum_insured: Cell<'a>,
    treaty_ppn: f64,
    period: &'a str,
) -> Vec<Cell<'a>> {
    vec![
        Text(number),
        if name.is_empty() { Blank } else { Text(name) },
        sum_insured,
        Number(5000.0),
        Number(60.0),
        Number(600_000.0),
        Number(3000.0),
        Number(treaty_ppn),
        Number(400_000.0),
        Number(2000.0),
        Text(period),
    ]
}

struct Harness {
    _dir: TempDir,
    pool: SqlitePool,
    store: SqlitePolicyStore,
    pipeline: IngestionPipeline,
}

async fn harness(config: &IngestionConfig) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("data").join("policies.db"))
        .await
        .unwrap();
    let store = SqlitePolicyStore::new(pool.clone());
    let pipeline = IngestionPipeline::from_config(
        Arc::new(store.clone()),
        Arc::new(SqliteAuditLog::new(pool.clone())),
        config,
    );
    Harness {
        _dir: dir,
        pool,
        store,
        pipeline,
    }
}

async fn log_count(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM data_ingestion_logs")
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_mixed_workbook_end_to_end() {
    let h = harness(&IngestionConfig::default()).await;
    let bytes = workbook(
        &STANDARD_HEADERS,
        &[
            policy_row("P001", "Acme Ltd", Text("₦1,000,000"), 40.0, "01/01/2024 - 31/12/2024"),
            policy_row("P002", "Beta Plc", Number(1_000_000.0), 150.0, "2024-01-01 - 2024-12-31"),
            policy_row("P003", "", Number(1_000_000.0), 40.0, "01/01/2024 - 31/12/2024"),
        ],
    )
    .unwrap();

    let report = h.pipeline.ingest(&bytes, "policies.xlsx", 1000).await;

    assert_eq!(report.status, IngestionStatus::Partial);
    assert_eq!(report.total_rows, 3);
    assert_eq!(report.processed_rows, 2);
    assert_eq!(report.failed_rows, 1);
    assert_eq!(report.dropped_rows, 1);

    let kinds: Vec<_> = report.validation_errors.iter().map(|e| e.error_kind).collect();
    assert_eq!(kinds, vec![ErrorKind::InvalidPercentage]);
    assert_eq!(report.validation_errors[0].row_number, 3);

    let acme = h.store.find_by_unique_key("P001").await.unwrap().unwrap();
    assert_eq!(acme.record.sum_insured, 1_000_000.0);
    assert_eq!(acme.record.insured_name, "Acme Ltd");
    assert_eq!(acme.record.insurance_period_end_date.to_string(), "2024-12-31");

    let beta = h.store.find_by_unique_key("P002").await.unwrap().unwrap();
    assert_eq!(beta.record.treaty_ppn, 150.0);

    assert!(h.store.find_by_unique_key("P003").await.unwrap().is_none());
    assert_eq!(log_count(&h.pool).await, 1);
}

#[tokio::test]
async fn test_alias_headers_resolve() {
    let h = harness(&IngestionConfig::default()).await;
    let headers = [
        "Policy No",
        "Client Name",
        "Coverage Amount",
        "Annual Premium",
        "Retention %",
        "Retention_Sum",
        "Retention_Premium",
        "Treaty %",
        "Treaty_Sum",
        "Treaty_Prem",
        "Policy Period",
    ];
    let bytes = workbook(
        &headers,
        &[policy_row("A-1", "Delta", Number(1_000_000.0), 40.0, "15.03.2024 - 14.03.2025")],
    )
    .unwrap();

    let report = h.pipeline.ingest(&bytes, "aliases.xlsx", 1000).await;
    assert_eq!(report.status, IngestionStatus::Success, "errors: {:?}", report.errors);
    assert!(!report.requires_acknowledgement);

    let stored = h.store.find_by_unique_key("A-1").await.unwrap().unwrap();
    assert_eq!(stored.record.premium, 5000.0);
    assert_eq!(stored.record.own_retention_premium, 3000.0);
    assert_eq!(stored.record.treaty_premium, 2000.0);
    assert_eq!(stored.record.insurance_period_start_date.to_string(), "2024-03-15");
}

#[tokio::test]
async fn test_primary_header_override() {
    let mut primary = BTreeMap::new();
    primary.insert("policy_number".to_string(), "Ref".to_string());
    let config = IngestionConfig {
        primary_headers: primary,
        ..Default::default()
    };
    let h = harness(&config).await;

    let mut headers = STANDARD_HEADERS;
    headers[0] = "REF";
    let bytes = workbook(
        &headers,
        &[policy_row("R-9", "Echo", Number(1_000_000.0), 40.0, "01/01/2024 - 31/12/2024")],
    )
    .unwrap();

    let report = h.pipeline.ingest(&bytes, "override.xlsx", 1000).await;
    assert_eq!(report.processed_rows, 1);
    assert!(h.store.find_by_unique_key("R-9").await.unwrap().is_some());
}

#[tokio::test]
async fn test_duplicate_in_batch_fails_whole_batch() {
    let h = harness(&IngestionConfig::default()).await;
    let bytes = workbook(
        &STANDARD_HEADERS,
        &[
            policy_row("D-1", "One", Number(1_000_000.0), 40.0, "01/01/2024 - 31/12/2024"),
            policy_row("D-1", "Two", Number(1_000_000.0), 40.0, "01/01/2024 - 31/12/2024"),
            policy_row("D-3", "Three", Number(1_000_000.0), 40.0, "01/01/2024 - 31/12/2024"),
        ],
    )
    .unwrap();

    let report = h.pipeline.ingest(&bytes, "dupes.xlsx", 2).await;

    assert_eq!(report.processed_rows, 1);
    assert_eq!(report.failed_rows, 2);
    assert_eq!(report.status, IngestionStatus::Partial);
    assert!(report.errors.iter().any(|e| e.starts_with("Batch 1: ")));
    assert!(h.store.find_by_unique_key("D-3").await.unwrap().is_some());
    assert_eq!(h.store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_reingesting_same_file_is_rejected_by_unique_key() {
    let h = harness(&IngestionConfig::default()).await;
    let bytes = workbook(
        &STANDARD_HEADERS,
        &[policy_row("U-1", "Uno", Number(1_000_000.0), 40.0, "01/01/2024 - 31/12/2024")],
    )
    .unwrap();

    let first = h.pipeline.ingest(&bytes, "book.xlsx", 1000).await;
    let second = h.pipeline.ingest(&bytes, "book.xlsx", 1000).await;

    assert_eq!(first.status, IngestionStatus::Success);
    assert_eq!(second.status, IngestionStatus::Failed);
    assert_eq!(second.processed_rows, 0);
    assert_eq!(h.store.count().await.unwrap(), 1);
    assert_eq!(log_count(&h.pool).await, 2);
}

#[tokio::test]
async fn test_consistency_mismatch_is_a_warning() {
    let h = harness(&IngestionConfig::default()).await;
    let bytes = workbook(
        &STANDARD_HEADERS,
        &[policy_row("C-1", "Cons", Number(900_000.0), 40.0, "01/01/2024 - 31/12/2024")],
    )
    .unwrap();

    let report = h.pipeline.ingest(&bytes, "book.xlsx", 1000).await;
    assert_eq!(report.status, IngestionStatus::Success);
    assert!(report.requires_acknowledgement);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].starts_with("Row 2: own_retention_sum_insured + treaty_sum_insured"));
}

#[tokio::test]
async fn test_header_only_workbook_fails() {
    let h = harness(&IngestionConfig::default()).await;
    let bytes = workbook(&STANDARD_HEADERS, &[]).unwrap();

    let report = h.pipeline.ingest(&bytes, "empty.xlsx", 1000).await;
    assert_eq!(report.status, IngestionStatus::Failed);
    assert_eq!(report.errors, vec!["No valid data found in file".to_string()]);
    assert_eq!(log_count(&h.pool).await, 1);
}

#[tokio::test]
async fn test_invalid_numeric_cell_is_zeroed_and_reported() {
    let h = harness(&IngestionConfig::default()).await;
    let mut row = policy_row("N-1", "Num", Number(1_000_000.0), 40.0, "01/01/2024 - 31/12/2024");
    row[6] = Text("three thousand");
    let bytes = workbook(&STANDARD_HEADERS, &[row]).unwrap();

    let report = h.pipeline.ingest(&bytes, "book.xlsx", 1000).await;
    assert_eq!(report.processed_rows, 1);
    assert_eq!(report.validation_errors.len(), 1);
    assert_eq!(report.validation_errors[0].error_kind, ErrorKind::InvalidNumeric);
    assert_eq!(report.validation_errors[0].column_name, "own_retention_premium");

    let stored = h.store.find_by_unique_key("N-1").await.unwrap().unwrap();
    assert_eq!(stored.record.own_retention_premium, 0.0);
}

#[tokio::test]
async fn test_excel_date_cells_fill_explicit_period_columns() {
    let h = harness(&IngestionConfig::default()).await;

    let mut headers: Vec<&str> = STANDARD_HEADERS[..10].to_vec();
    headers.extend(["START DATE", "END DATE"]);

    let mut row = policy_row("X-1", "Dated", Number(1_000_000.0), 40.0, "");
    row.truncate(10);
    row.extend([Date(2024, 3, 15), Date(2025, 3, 14)]);

    let bytes = workbook(&headers, &[row]).unwrap();
    let report = h.pipeline.ingest(&bytes, "dated.xlsx", 1000).await;

    assert_eq!(report.status, IngestionStatus::Success, "errors: {:?}", report.errors);
    assert!(report.validation_errors.is_empty(), "{:?}", report.validation_errors);

    let stored = h.store.find_by_unique_key("X-1").await.unwrap().unwrap();
    assert_eq!(stored.record.insurance_period_start_date.to_string(), "2024-03-15");
    assert_eq!(stored.record.insurance_period_end_date.to_string(), "2025-03-14");
}
