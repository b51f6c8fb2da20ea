//! Canonical policy fields and the header mapping resolved for one sheet

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Canonical field name a spreadsheet header can resolve to
///
/// Declaration order is the order the column mapper resolves fields in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    PolicyNumber,
    InsuredName,
    SumInsured,
    Premium,
    OwnRetentionPpn,
    OwnRetentionSumInsured,
    OwnRetentionPremium,
    TreatyPpn,
    TreatySumInsured,
    TreatyPremium,
    PeriodOfInsurance,
    InsurancePeriodStartDate,
    InsurancePeriodEndDate,
}

impl CanonicalField {
    /// Every field, in resolution order
    pub const ALL: [CanonicalField; 13] = [
        CanonicalField::PolicyNumber,
        CanonicalField::InsuredName,
        CanonicalField::SumInsured,
        CanonicalField::Premium,
        CanonicalField::OwnRetentionPpn,
        CanonicalField::OwnRetentionSumInsured,
        CanonicalField::OwnRetentionPremium,
        CanonicalField::TreatyPpn,
        CanonicalField::TreatySumInsured,
        CanonicalField::TreatyPremium,
        CanonicalField::PeriodOfInsurance,
        CanonicalField::InsurancePeriodStartDate,
        CanonicalField::InsurancePeriodEndDate,
    ];

    /// Identity and financial fields that must always resolve
    pub const REQUIRED: [CanonicalField; 10] = [
        CanonicalField::PolicyNumber,
        CanonicalField::InsuredName,
        CanonicalField::SumInsured,
        CanonicalField::Premium,
        CanonicalField::OwnRetentionPpn,
        CanonicalField::OwnRetentionSumInsured,
        CanonicalField::OwnRetentionPremium,
        CanonicalField::TreatyPpn,
        CanonicalField::TreatySumInsured,
        CanonicalField::TreatyPremium,
    ];

    /// Fields sanitized as numbers
    pub const NUMERIC: [CanonicalField; 8] = [
        CanonicalField::SumInsured,
        CanonicalField::Premium,
        CanonicalField::OwnRetentionPpn,
        CanonicalField::OwnRetentionSumInsured,
        CanonicalField::OwnRetentionPremium,
        CanonicalField::TreatyPpn,
        CanonicalField::TreatySumInsured,
        CanonicalField::TreatyPremium,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalField::PolicyNumber => "policy_number",
            CanonicalField::InsuredName => "insured_name",
            CanonicalField::SumInsured => "sum_insured",
            CanonicalField::Premium => "premium",
            CanonicalField::OwnRetentionPpn => "own_retention_ppn",
            CanonicalField::OwnRetentionSumInsured => "own_retention_sum_insured",
            CanonicalField::OwnRetentionPremium => "own_retention_premium",
            CanonicalField::TreatyPpn => "treaty_ppn",
            CanonicalField::TreatySumInsured => "treaty_sum_insured",
            CanonicalField::TreatyPremium => "treaty_premium",
            CanonicalField::PeriodOfInsurance => "period_of_insurance",
            CanonicalField::InsurancePeriodStartDate => "insurance_period_start_date",
            CanonicalField::InsurancePeriodEndDate => "insurance_period_end_date",
        }
    }

    /// Parse a canonical name as written in config files
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|field| field.as_str() == name)
    }

    /// Percentage fields are range-checked against [0, 100]
    pub fn is_percentage(&self) -> bool {
        matches!(self, CanonicalField::OwnRetentionPpn | CanonicalField::TreatyPpn)
    }

    pub fn is_numeric(&self) -> bool {
        Self::NUMERIC.contains(self)
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sheet column a canonical field resolved to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedColumn {
    /// Normalized (trimmed, uppercased) header text
    pub header: String,
    /// Zero-based column index in the sheet
    pub index: usize,
}

/// Resolved header mapping for one sheet
///
/// Only built by the column mapper once every required field resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    columns: BTreeMap<CanonicalField, MappedColumn>,
}

impl ColumnMapping {
    pub fn new(columns: BTreeMap<CanonicalField, MappedColumn>) -> Self {
        Self { columns }
    }

    pub fn get(&self, field: CanonicalField) -> Option<&MappedColumn> {
        self.columns.get(&field)
    }

    /// Column index for a field, if mapped
    pub fn index_of(&self, field: CanonicalField) -> Option<usize> {
        self.columns.get(&field).map(|c| c.index)
    }

    /// Whether the combined period column is present
    pub fn has_period_column(&self) -> bool {
        self.columns.contains_key(&CanonicalField::PeriodOfInsurance)
    }

    /// Whether both explicit start and end date columns are present
    pub fn has_explicit_dates(&self) -> bool {
        self.columns.contains_key(&CanonicalField::InsurancePeriodStartDate)
            && self.columns.contains_key(&CanonicalField::InsurancePeriodEndDate)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CanonicalField, &MappedColumn)> {
        self.columns.iter()
    }

    /// Canonical name → detected header, for reporting
    pub fn to_header_map(&self) -> BTreeMap<String, String> {
        self.columns
            .iter()
            .map(|(field, column)| (field.as_str().to_string(), column.header.clone()))
            .collect()
    }
}
