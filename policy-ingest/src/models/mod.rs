//! Data models for policy-ingest
//!
//! - Canonical field names and resolved column mappings
//! - Cell-level validation errors
//! - Ingestion reports returned to callers
//! - Natural-language query request/response types

pub mod column_mapping;
pub mod ingestion_report;
pub mod query;
pub mod validation;

pub use column_mapping::{CanonicalField, ColumnMapping, MappedColumn};
pub use ingestion_report::{IngestionReport, IngestionStatus, StructureReport};
pub use query::{QueryRequest, QueryResponse, QueryStep, QueryStepKind};
pub use policy_common::db::PolicyRecord;
pub use validation::{ErrorKind, ValidationError};
