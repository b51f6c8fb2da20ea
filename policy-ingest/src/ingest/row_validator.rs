//! Row acceptance
//!
//! Rules, in order:
//! 1. Empty policy number or insured name: the row is dropped
//! 2. Period end must be strictly after start
//! 3. Amount bounds and text lengths (sum insured and premium > 0, shares >= 0)
//!
//! Out-of-range percentages were already flagged by the sanitizer and do not
//! reject the row. The retention + treaty = sum insured consistency check only
//! produces a warning.

use crate::models::PolicyRecord;
use chrono::NaiveDate;

const MAX_POLICY_NUMBER_LEN: usize = 50;
const MAX_INSURED_NAME_LEN: usize = 200;

/// Row with every field already coerced to its native type
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedRow {
    /// 1-indexed sheet row number
    pub row_number: usize,
    pub policy_number: String,
    pub insured_name: String,
    pub sum_insured: f64,
    pub premium: f64,
    pub own_retention_ppn: f64,
    pub own_retention_sum_insured: f64,
    pub own_retention_premium: f64,
    pub treaty_ppn: f64,
    pub treaty_sum_insured: f64,
    pub treaty_premium: f64,
    pub insurance_period_start_date: NaiveDate,
    pub insurance_period_end_date: NaiveDate,
}

/// Result of validating one row
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    /// Row becomes a record; `warning` carries a consistency discrepancy if any
    Accepted {
        record: PolicyRecord,
        warning: Option<String>,
    },
    /// Missing policy number or insured name
    Dropped,
    /// Row violates a record invariant; message is prefixed with the row number
    Rejected(String),
}

/// Applies record invariants to cleaned rows
#[derive(Debug, Clone, Copy)]
pub struct RowValidator {
    consistency_tolerance: f64,
}

impl Default for RowValidator {
    fn default() -> Self {
        Self::new(0.01)
    }
}

impl RowValidator {
    pub fn new(consistency_tolerance: f64) -> Self {
        Self {
            consistency_tolerance,
        }
    }

    pub fn validate(&self, row: CleanedRow) -> RowOutcome {
        if row.policy_number.trim().is_empty() || row.insured_name.trim().is_empty() {
            return RowOutcome::Dropped;
        }

        let row_number = row.row_number;
        let warning = self.consistency_warning(&row);
        let record = PolicyRecord {
            policy_number: row.policy_number,
            insured_name: row.insured_name,
            sum_insured: row.sum_insured,
            premium: row.premium,
            own_retention_ppn: row.own_retention_ppn,
            own_retention_sum_insured: row.own_retention_sum_insured,
            own_retention_premium: row.own_retention_premium,
            treaty_ppn: row.treaty_ppn,
            treaty_sum_insured: row.treaty_sum_insured,
            treaty_premium: row.treaty_premium,
            insurance_period_start_date: row.insurance_period_start_date,
            insurance_period_end_date: row.insurance_period_end_date,
        };

        match check_record(&record) {
            Ok(()) => RowOutcome::Accepted { record, warning },
            Err(reason) => RowOutcome::Rejected(format!("Row {}: {}", row_number, reason)),
        }
    }

    fn consistency_warning(&self, row: &CleanedRow) -> Option<String> {
        let split = row.own_retention_sum_insured + row.treaty_sum_insured;
        if (split - row.sum_insured).abs() > self.consistency_tolerance {
            Some(format!(
                "Row {}: own_retention_sum_insured + treaty_sum_insured ({}) does not match sum_insured ({})",
                row.row_number, split, row.sum_insured
            ))
        } else {
            None
        }
    }
}

/// Record invariants shared by the bulk and single-record paths
pub fn check_record(row: &PolicyRecord) -> Result<(), String> {
    if row.policy_number.trim().is_empty() {
        return Err("policy_number must not be empty".to_string());
    }
    if row.insured_name.trim().is_empty() {
        return Err("insured_name must not be empty".to_string());
    }

    if row.insurance_period_end_date <= row.insurance_period_start_date {
        return Err(format!(
            "Insurance period end date ({}) must be after start date ({})",
            row.insurance_period_end_date, row.insurance_period_start_date
        ));
    }

    if row.sum_insured <= 0.0 {
        return Err(format!("sum_insured must be greater than 0, got {}", row.sum_insured));
    }
    if row.premium <= 0.0 {
        return Err(format!("premium must be greater than 0, got {}", row.premium));
    }

    let shares = [
        ("own_retention_sum_insured", row.own_retention_sum_insured),
        ("own_retention_premium", row.own_retention_premium),
        ("treaty_sum_insured", row.treaty_sum_insured),
        ("treaty_premium", row.treaty_premium),
    ];
    if let Some((name, value)) = shares.iter().find(|(_, v)| *v < 0.0) {
        return Err(format!("{} must not be negative, got {}", name, value));
    }

    let policy_len = row.policy_number.chars().count();
    if policy_len > MAX_POLICY_NUMBER_LEN {
        return Err(format!(
            "policy_number must be at most {} characters, got {}",
            MAX_POLICY_NUMBER_LEN, policy_len
        ));
    }
    let name_len = row.insured_name.chars().count();
    if name_len > MAX_INSURED_NAME_LEN {
        return Err(format!(
            "insured_name must be at most {} characters, got {}",
            MAX_INSURED_NAME_LEN, name_len
        ));
    }

    Ok(())
}

/// Percentage bounds for records that did not pass through the sanitizer
///
/// The bulk path flags out-of-range percentages and persists them; the
/// single-record path rejects them.
pub fn check_percentages(row: &PolicyRecord) -> Result<(), String> {
    let shares = [
        ("own_retention_ppn", row.own_retention_ppn),
        ("treaty_ppn", row.treaty_ppn),
    ];
    match shares.iter().find(|(_, v)| !(0.0..=100.0).contains(v)) {
        Some((name, value)) => Err(format!("{} must be between 0 and 100, got {}", name, value)),
        None => Ok(()),
    }
}
