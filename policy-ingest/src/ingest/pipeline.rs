//! Ingestion pipeline
//!
//! `ingest(bytes, filename, batch_size)` always returns an [`IngestionReport`]:
//!
//! 1. Decode the first sheet and normalize headers (trim + uppercase), on the
//!    blocking pool
//! 2. Resolve columns; any unresolved required field aborts the run
//! 3. Sanitize every cell of every row, collecting cell-level errors in row order
//! 4. Validate rows: drop rows without identity, reject invariant violations
//! 5. Persist accepted records in sequential batches
//! 6. Write exactly one audit entry, whatever the outcome
//!
//! Structural failures (steps 1-2, a decoder panic, or a sheet with no data rows)
//! produce a failed report with zero counts and a single error string. A failed audit write is
//! logged and otherwise ignored.

use crate::db::{AuditSink, PolicyStore};
use crate::ingest::column_mapper::{map_columns, resolve_columns, ColumnAliases};
use crate::ingest::period_parser::{fallback_period, parse_period, parse_single_date};
use crate::ingest::row_validator::{CleanedRow, RowOutcome, RowValidator};
use crate::ingest::sanitizer::{check_percentage, sanitize_numeric, sanitize_text};
use crate::ingest::spreadsheet::{CellValue, RawSpreadsheet};
use crate::ingest::IngestError;
use crate::models::{
    CanonicalField, ColumnMapping, ErrorKind, IngestionReport, IngestionStatus, PolicyRecord,
    StructureReport, ValidationError,
};
use chrono::NaiveDate;
use policy_common::config::IngestionConfig;
use policy_common::db::IngestionLogEntry;
use std::any::Any;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Rows above which structure validation recommends a larger batch size
const LARGE_FILE_ROWS: usize = 10_000;

/// Rows converted and validated, ready to persist
#[derive(Debug, Default)]
struct PreparedRows {
    total_rows: usize,
    records: Vec<PolicyRecord>,
    validation_errors: Vec<ValidationError>,
    rejections: Vec<String>,
    consistency_warnings: Vec<String>,
    dropped_rows: usize,
}

/// Spreadsheet → policy store pipeline
#[derive(Clone)]
pub struct IngestionPipeline {
    store: Arc<dyn PolicyStore>,
    audit: Arc<dyn AuditSink>,
    aliases: ColumnAliases,
    validator: RowValidator,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn PolicyStore>,
        audit: Arc<dyn AuditSink>,
        aliases: ColumnAliases,
        validator: RowValidator,
    ) -> Self {
        Self {
            store,
            audit,
            aliases,
            validator,
        }
    }

    /// Pipeline using configured primary headers and consistency tolerance
    pub fn from_config(
        store: Arc<dyn PolicyStore>,
        audit: Arc<dyn AuditSink>,
        config: &IngestionConfig,
    ) -> Self {
        Self::new(
            store,
            audit,
            ColumnAliases::with_primary_headers(&config.primary_headers),
            RowValidator::new(config.consistency_tolerance),
        )
    }

    /// Ingest one uploaded spreadsheet
    pub async fn ingest(&self, bytes: &[u8], filename: &str, batch_size: usize) -> IngestionReport {
        let started = Instant::now();
        let ingestion_id = Uuid::new_v4();
        info!(%ingestion_id, filename, size_bytes = bytes.len(), batch_size, "Starting ingestion");

        let pipeline = self.clone();
        let owned_bytes = bytes.to_vec();
        let owned_name = filename.to_string();
        let prepared = run_blocking(move || pipeline.prepare(&owned_bytes, &owned_name)).await;

        let report = match prepared {
            Ok(prepared) => {
                self.persist(ingestion_id, filename, prepared, batch_size, started)
                    .await
            }
            Err(e) => {
                error!(%ingestion_id, filename, error = %e, "Ingestion aborted");
                IngestionReport::failed(ingestion_id, filename, elapsed_ms(started), e.to_string())
            }
        };

        info!(
            %ingestion_id,
            status = %report.status,
            total_rows = report.total_rows,
            processed_rows = report.processed_rows,
            failed_rows = report.failed_rows,
            processing_time_ms = report.processing_time_ms,
            "Ingestion complete"
        );

        self.record_audit(&report, bytes.len()).await;
        report
    }

    /// Check headers and row count without touching the store
    pub fn validate_structure(&self, bytes: &[u8], filename: &str, max_rows: usize) -> StructureReport {
        let sheet = match RawSpreadsheet::from_bytes(bytes, filename) {
            Ok(sheet) => sheet,
            Err(e) => {
                return StructureReport {
                    valid: false,
                    total_rows: 0,
                    total_columns: 0,
                    columns: Vec::new(),
                    detected_mapping: Default::default(),
                    missing_fields: Vec::new(),
                    issues: vec![e.to_string()],
                    recommendations: vec![
                        "Upload the policy register as .xlsx, .xls or .csv".to_string()
                    ],
                }
            }
        };

        let headers = sheet.normalized_headers();
        let resolution = resolve_columns(&headers, &self.aliases);
        let total_rows = sheet.row_count();

        let mut issues = Vec::new();
        let mut recommendations = Vec::new();

        if !resolution.missing.is_empty() {
            issues.push(format!(
                "Missing required columns: {}",
                resolution.missing.join(", ")
            ));
            for missing in &resolution.missing {
                recommendations.push(self.header_hint(missing));
            }
        }

        for (index, header) in headers.iter().enumerate() {
            if header.is_empty() {
                issues.push(format!("Column {} has an empty header", index + 1));
            }
        }

        if total_rows == 0 {
            issues.push("File contains no data rows".to_string());
        } else if total_rows > max_rows {
            issues.push(format!(
                "File has {} rows, exceeding the limit of {}",
                total_rows, max_rows
            ));
        }

        if total_rows > LARGE_FILE_ROWS {
            recommendations.push("Large file: use a batch_size of 5000 or more".to_string());
        }

        StructureReport {
            valid: issues.is_empty(),
            total_rows,
            total_columns: headers.len(),
            columns: headers,
            detected_mapping: resolution.mapping.to_header_map(),
            missing_fields: resolution.missing,
            issues,
            recommendations,
        }
    }

    fn header_hint(&self, missing: &str) -> String {
        match CanonicalField::from_name(missing) {
            Some(field) => format!(
                "Add a column for {} (accepted headers include: {})",
                field,
                self.aliases.aliases(field).join(", ")
            ),
            None => format!(
                "Add a combined period column (e.g. {}) or both START DATE and END DATE columns",
                self.aliases
                    .aliases(CanonicalField::PeriodOfInsurance)
                    .first()
                    .map(String::as_str)
                    .unwrap_or("PERIOD OF INSURANCE")
            ),
        }
    }

    fn prepare(&self, bytes: &[u8], filename: &str) -> Result<PreparedRows, IngestError> {
        let sheet = RawSpreadsheet::from_bytes(bytes, filename)?;
        let headers = sheet.normalized_headers();
        info!(rows = sheet.row_count(), columns = ?headers, "Read spreadsheet");

        let mapping = map_columns(&headers, &self.aliases)?;

        if sheet.row_count() == 0 {
            return Err(IngestError::NoData);
        }

        let mut prepared = PreparedRows {
            total_rows: sheet.row_count(),
            ..Default::default()
        };

        for row_index in 0..sheet.row_count() {
            let row = clean_row(&sheet, row_index, &mapping, &mut prepared.validation_errors);
            match self.validator.validate(row) {
                RowOutcome::Accepted { record, warning } => {
                    prepared.records.push(record);
                    prepared.consistency_warnings.extend(warning);
                }
                RowOutcome::Dropped => prepared.dropped_rows += 1,
                RowOutcome::Rejected(reason) => prepared.rejections.push(reason),
            }
        }

        if prepared.dropped_rows > 0 {
            warn!(
                dropped = prepared.dropped_rows,
                "Dropped rows with missing policy number or insured name"
            );
        }

        Ok(prepared)
    }

    async fn persist(
        &self,
        ingestion_id: Uuid,
        filename: &str,
        prepared: PreparedRows,
        batch_size: usize,
        started: Instant,
    ) -> IngestionReport {
        let PreparedRows {
            total_rows,
            records,
            validation_errors,
            rejections,
            consistency_warnings,
            dropped_rows,
        } = prepared;

        let mut errors: Vec<String> = validation_errors.iter().map(ToString::to_string).collect();
        errors.extend(rejections);

        let mut warnings = Vec::new();
        if dropped_rows > 0 {
            warnings.push(format!(
                "Dropped {} rows with missing policy number or insured name",
                dropped_rows
            ));
        }
        warnings.extend(consistency_warnings);

        let processed_rows = if records.is_empty() {
            errors.push("No valid data found in file".to_string());
            0
        } else {
            let outcome = self.store.create_many(&records, batch_size).await;
            errors.extend(outcome.errors);
            outcome.succeeded
        };

        let failed_rows = total_rows.saturating_sub(processed_rows);
        let requires_acknowledgement = !errors.is_empty() || !warnings.is_empty();

        IngestionReport {
            ingestion_id,
            filename: filename.to_string(),
            total_rows,
            processed_rows,
            failed_rows,
            dropped_rows,
            processing_time_ms: elapsed_ms(started),
            status: IngestionStatus::from_counts(processed_rows, failed_rows),
            errors,
            warnings,
            validation_errors,
            requires_acknowledgement,
        }
    }

    async fn record_audit(&self, report: &IngestionReport, size_bytes: usize) {
        let entry = IngestionLogEntry {
            filename: report.filename.clone(),
            file_size_bytes: size_bytes as u64,
            total_rows: report.total_rows,
            processed_rows: report.processed_rows,
            failed_rows: report.failed_rows,
            processing_time_ms: report.processing_time_ms,
            status: report.status.as_str().to_string(),
            error_details: report.error_text(),
        };

        if let Err(e) = self.audit.record_ingestion(&entry).await {
            error!(
                ingestion_id = %report.ingestion_id,
                error = %e,
                "Failed to write ingestion audit entry"
            );
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Coerce one sheet row into native types, appending cell errors in column order
fn clean_row(
    sheet: &RawSpreadsheet,
    row_index: usize,
    mapping: &ColumnMapping,
    errors: &mut Vec<ValidationError>,
) -> CleanedRow {
    let row_number = row_index + 2;
    let cell = |field: CanonicalField| field_cell(sheet, mapping, row_index, field);

    let mut number = |field: CanonicalField| -> f64 {
        let (value, err) = sanitize_numeric(cell(field), row_number, field);
        errors.extend(err);
        if field.is_percentage() {
            errors.extend(check_percentage(value, row_number, field));
        }
        value
    };

    let sum_insured = number(CanonicalField::SumInsured);
    let premium = number(CanonicalField::Premium);
    let own_retention_ppn = number(CanonicalField::OwnRetentionPpn);
    let own_retention_sum_insured = number(CanonicalField::OwnRetentionSumInsured);
    let own_retention_premium = number(CanonicalField::OwnRetentionPremium);
    let treaty_ppn = number(CanonicalField::TreatyPpn);
    let treaty_sum_insured = number(CanonicalField::TreatySumInsured);
    let treaty_premium = number(CanonicalField::TreatyPremium);

    let (start, end) = if mapping.has_period_column() {
        period_from_text(cell(CanonicalField::PeriodOfInsurance), row_number, errors)
    } else {
        let (fallback_start, fallback_end) = fallback_period();
        (
            date_from_cell(
                cell(CanonicalField::InsurancePeriodStartDate),
                CanonicalField::InsurancePeriodStartDate,
                fallback_start,
                row_number,
                errors,
            ),
            date_from_cell(
                cell(CanonicalField::InsurancePeriodEndDate),
                CanonicalField::InsurancePeriodEndDate,
                fallback_end,
                row_number,
                errors,
            ),
        )
    };

    CleanedRow {
        row_number,
        policy_number: sanitize_text(cell(CanonicalField::PolicyNumber)),
        insured_name: sanitize_text(cell(CanonicalField::InsuredName)),
        sum_insured,
        premium,
        own_retention_ppn,
        own_retention_sum_insured,
        own_retention_premium,
        treaty_ppn,
        treaty_sum_insured,
        treaty_premium,
        insurance_period_start_date: start,
        insurance_period_end_date: end,
    }
}

fn field_cell<'a>(
    sheet: &'a RawSpreadsheet,
    mapping: &ColumnMapping,
    row_index: usize,
    field: CanonicalField,
) -> &'a CellValue {
    static UNMAPPED: CellValue = CellValue::Empty;
    match mapping.index_of(field) {
        Some(column) => sheet.cell(row_index, column),
        None => &UNMAPPED,
    }
}

fn period_from_text(
    cell: &CellValue,
    row_number: usize,
    errors: &mut Vec<ValidationError>,
) -> (NaiveDate, NaiveDate) {
    let text = cell.to_text();
    match parse_period(&text) {
        Ok(range) => range,
        Err(e) => {
            errors.push(ValidationError::new(
                row_number,
                CanonicalField::PeriodOfInsurance.as_str(),
                ErrorKind::InvalidDateFormat,
                format!("Cannot parse date range: {}", e),
                Some(text),
            ));
            fallback_period()
        }
    }
}

fn date_from_cell(
    cell: &CellValue,
    field: CanonicalField,
    fallback: NaiveDate,
    row_number: usize,
    errors: &mut Vec<ValidationError>,
) -> NaiveDate {
    if let CellValue::Date(date) = cell {
        return *date;
    }

    let text = cell.to_text();
    match parse_single_date(&text) {
        Some(date) => date,
        None => {
            errors.push(ValidationError::new(
                row_number,
                field.as_str(),
                ErrorKind::InvalidDateFormat,
                format!("Cannot parse date: '{}'", text.trim()),
                Some(text),
            ));
            fallback
        }
    }
}

/// Run CPU-bound spreadsheet work on the blocking pool
///
/// A panic inside the work becomes [`IngestError::DecoderFailed`].
pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T, IngestError>
where
    F: FnOnce() -> Result<T, IngestError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(IngestError::DecoderFailed(panic_message(e.into_panic()))),
        Err(e) => Err(IngestError::DecoderFailed(e.to_string())),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panic without message".to_string()
    }
}
