//! Header → canonical field resolution
//!
//! For each canonical field, in declaration order, the candidate aliases are tried
//! in priority order. An alias first looks for an exact header match, then for the
//! first header (in sheet order) that contains the alias or is contained by it.
//! The first alias producing any match wins; there is no scoring across aliases.
//! A header already claimed by an earlier field is not offered to later ones.

use crate::ingest::IngestError;
use crate::models::{CanonicalField, ColumnMapping, MappedColumn};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Label used for the period requirement in missing-field reports
pub const PERIOD_REQUIREMENT: &str = "insurance period dates";

/// Candidate header aliases per canonical field, in priority order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnAliases {
    aliases: BTreeMap<CanonicalField, Vec<String>>,
}

fn default_aliases(field: CanonicalField) -> &'static [&'static str] {
    match field {
        CanonicalField::PolicyNumber => &["POLICY NUMBER", "POLICY NO", "POLICY_NUMBER", "POLICY"],
        CanonicalField::InsuredName => &[
            "INSURED NAME",
            "CLIENT NAME",
            "CUSTOMER NAME",
            "CUSTOMER_NAME",
            "CLIENT_NAME",
            "INSURED",
        ],
        CanonicalField::SumInsured => &[
            "SUM INSURED",
            "SUM_INSURED",
            "COVERAGE AMOUNT",
            "COVERAGE_AMOUNT",
            "INSURED AMOUNT",
            "INSURED_AMOUNT",
        ],
        CanonicalField::Premium => &[
            "PREMIUM",
            "PREMIUM AMOUNT",
            "PREMIUM_AMOUNT",
            "ANNUAL PREMIUM",
            "ANNUAL_PREMIUM",
        ],
        CanonicalField::OwnRetentionPpn => &["OWN RETENTION %", "OWN_RETENTION_PCT", "RETENTION_%", "RETENTION %"],
        CanonicalField::OwnRetentionSumInsured => &["OWN RETENTION SUM INSURED", "OWN_RETENTION_SUM", "RETENTION_SUM"],
        CanonicalField::OwnRetentionPremium => &["OWN RETENTION PREMIUM", "OWN_RETENTION_PREM", "RETENTION_PREMIUM"],
        CanonicalField::TreatyPpn => &["TREATY %", "TREATY_PCT", "TREATY_%"],
        CanonicalField::TreatySumInsured => &["TREATY SUM INSURED", "TREATY_SUM", "TREATY_COVERAGE"],
        CanonicalField::TreatyPremium => &["TREATY PREMIUM", "TREATY_PREM"],
        CanonicalField::PeriodOfInsurance => &[
            "PERIOD OF INSURANCE",
            "INSURANCE PERIOD",
            "INSURANCE_PERIOD",
            "POLICY PERIOD",
            "POLICY_PERIOD",
        ],
        CanonicalField::InsurancePeriodStartDate => &["START DATE", "START_DATE"],
        CanonicalField::InsurancePeriodEndDate => &["END DATE", "END_DATE"],
    }
}

impl Default for ColumnAliases {
    fn default() -> Self {
        let aliases = CanonicalField::ALL
            .into_iter()
            .map(|field| {
                let names = default_aliases(field).iter().map(|s| s.to_string()).collect();
                (field, names)
            })
            .collect();
        Self { aliases }
    }
}

impl ColumnAliases {
    /// Default aliases with configured primary headers placed first
    ///
    /// Keys are canonical field names; unknown keys are logged and ignored.
    pub fn with_primary_headers(primary: &BTreeMap<String, String>) -> Self {
        let mut aliases = Self::default();
        for (name, header) in primary {
            match CanonicalField::from_name(name) {
                Some(field) => aliases.prepend(field, header),
                None => warn!("Ignoring primary header for unknown field '{}'", name),
            }
        }
        aliases
    }

    /// Put `header` at the front of a field's candidate list
    pub fn prepend(&mut self, field: CanonicalField, header: &str) {
        let header = header.trim().to_uppercase();
        if header.is_empty() {
            return;
        }
        let list = self.aliases.entry(field).or_default();
        list.retain(|existing| *existing != header);
        list.insert(0, header);
    }

    pub fn aliases(&self, field: CanonicalField) -> &[String] {
        self.aliases.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Outcome of resolving one sheet's headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnResolution {
    pub mapping: ColumnMapping,
    /// Required field names (or [`PERIOD_REQUIREMENT`]) that did not resolve
    pub missing: Vec<String>,
}

impl ColumnResolution {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Resolve headers without failing on missing fields
///
/// `headers` must already be trimmed and uppercased.
pub fn resolve_columns(headers: &[String], aliases: &ColumnAliases) -> ColumnResolution {
    let mut claimed = vec![false; headers.len()];
    let mut columns = BTreeMap::new();

    for field in CanonicalField::ALL {
        if let Some(index) = find_header(headers, &claimed, aliases.aliases(field)) {
            claimed[index] = true;
            debug!(field = field.as_str(), header = %headers[index], "Resolved column");
            columns.insert(
                field,
                MappedColumn {
                    header: headers[index].clone(),
                    index,
                },
            );
        }
    }

    let mapping = ColumnMapping::new(columns);

    let mut missing: Vec<String> = CanonicalField::REQUIRED
        .into_iter()
        .filter(|field| mapping.get(*field).is_none())
        .map(|field| field.as_str().to_string())
        .collect();

    if !mapping.has_period_column() && !mapping.has_explicit_dates() {
        missing.push(PERIOD_REQUIREMENT.to_string());
    }

    ColumnResolution { mapping, missing }
}

/// Resolve headers, failing if any required field is unresolved
pub fn map_columns(headers: &[String], aliases: &ColumnAliases) -> Result<ColumnMapping, IngestError> {
    let resolution = resolve_columns(headers, aliases);
    if resolution.is_complete() {
        Ok(resolution.mapping)
    } else {
        Err(IngestError::MissingColumns(resolution.missing))
    }
}

fn find_header(headers: &[String], claimed: &[bool], aliases: &[String]) -> Option<usize> {
    let available = |i: &usize| !claimed[*i] && !headers[*i].is_empty();

    aliases.iter().find_map(|alias| {
        let alias = alias.to_uppercase();

        let exact = (0..headers.len())
            .filter(available)
            .find(|&i| headers[i] == alias);

        exact.or_else(|| {
            (0..headers.len())
                .filter(available)
                .find(|&i| headers[i].contains(&alias) || alias.contains(&headers[i]))
        })
    })
}
