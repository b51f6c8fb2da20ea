//! Spreadsheet decoding
//!
//! Workbooks (xlsx, xlsm, xlsb, xls, ods) are decoded with calamine; `.csv` files with
//! the csv crate. Only the first worksheet is read. The first row is the header; trailing
//! blank rows are discarded so they do not count toward `total_rows`.

use crate::ingest::IngestError;
use calamine::{open_workbook_auto_from_rs, Data, DataType, Reader};
use chrono::NaiveDate;
use std::io::Cursor;

/// One raw cell value
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
}

static EMPTY_CELL: CellValue = CellValue::Empty;

impl CellValue {
    /// Empty cell or whitespace-only text
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Text rendering used for headers, string fields and error messages
    ///
    /// Integral numbers render without a fractional part so a numeric policy
    /// number cell `10045` stays `"10045"`.
    pub fn to_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl From<&Data> for CellValue {
    fn from(cell: &Data) -> Self {
        match cell {
            Data::Empty => CellValue::Empty,
            Data::String(s) => CellValue::Text(s.clone()),
            Data::Float(f) => CellValue::Number(*f),
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Bool(b) => CellValue::Bool(*b),
            Data::DateTime(_) | Data::DateTimeIso(_) => cell
                .as_date()
                .map(CellValue::Date)
                .unwrap_or_else(|| CellValue::Text(cell.to_string())),
            Data::DurationIso(s) => CellValue::Text(s.clone()),
            Data::Error(_) => CellValue::Text(cell.to_string()),
        }
    }
}

/// First worksheet of an uploaded file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSpreadsheet {
    /// Header cells as written in the sheet
    pub headers: Vec<String>,
    /// Data rows, header excluded
    pub rows: Vec<Vec<CellValue>>,
}

impl RawSpreadsheet {
    /// Decode uploaded bytes, choosing the reader by filename extension
    pub fn from_bytes(bytes: &[u8], filename: &str) -> Result<Self, IngestError> {
        let extension = policy_common::config::file_extension(filename)
            .ok_or_else(|| IngestError::UnsupportedFileType(filename.to_string()))?;

        match extension.as_str() {
            "csv" => Self::from_csv(bytes),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Self::from_workbook(bytes),
            other => Err(IngestError::UnsupportedFileType(other.to_string())),
        }
    }

    /// Decode the first worksheet of a workbook
    pub fn from_workbook(bytes: &[u8]) -> Result<Self, IngestError> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
            .map_err(|e| IngestError::Unreadable(e.to_string()))?;

        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| IngestError::Unreadable("workbook has no worksheets".to_string()))?
            .map_err(|e| IngestError::Unreadable(e.to_string()))?;

        let mut rows = range.rows();
        let headers = rows
            .next()
            .map(|row| row.iter().map(|c| CellValue::from(c).to_text()).collect::<Vec<_>>())
            .ok_or(IngestError::NoHeader)?;

        let data = rows
            .map(|row| row.iter().map(CellValue::from).collect())
            .collect();

        Ok(Self::assemble(headers, data))
    }

    /// Decode a CSV file; every non-empty field is text
    pub fn from_csv(bytes: &[u8]) -> Result<Self, IngestError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes);

        let mut records = reader.records();
        let headers = match records.next() {
            Some(record) => record
                .map_err(|e| IngestError::Unreadable(e.to_string()))?
                .iter()
                .map(|h| h.trim_start_matches('\u{feff}').to_string())
                .collect::<Vec<_>>(),
            None => return Err(IngestError::NoHeader),
        };

        let mut data = Vec::new();
        for record in records {
            let record = record.map_err(|e| IngestError::Unreadable(e.to_string()))?;
            data.push(
                record
                    .iter()
                    .map(|field| {
                        if field.is_empty() {
                            CellValue::Empty
                        } else {
                            CellValue::Text(field.to_string())
                        }
                    })
                    .collect(),
            );
        }

        Ok(Self::assemble(headers, data))
    }

    fn assemble(headers: Vec<String>, mut rows: Vec<Vec<CellValue>>) -> Self {
        while rows
            .last()
            .map(|row| row.iter().all(CellValue::is_blank))
            .unwrap_or(false)
        {
            rows.pop();
        }
        Self { headers, rows }
    }

    /// Headers trimmed and uppercased, in sheet order
    pub fn normalized_headers(&self) -> Vec<String> {
        self.headers
            .iter()
            .map(|h| h.trim().to_uppercase())
            .collect()
    }

    /// Cell at (data row, column); ragged rows read as empty
    pub fn cell(&self, row: usize, column: usize) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .unwrap_or(&EMPTY_CELL)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}
