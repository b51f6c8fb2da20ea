//! Natural-language query request and response types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// POST /query request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Question about the policy data (1-1000 characters)
    pub question: String,

    /// Maximum rows to return (1-100)
    #[serde(default = "default_max_results")]
    pub max_results: u32,

    /// Include per-step workflow details in the response
    #[serde(default = "default_true")]
    pub include_reasoning: bool,

    /// Serve from the answer cache when possible
    #[serde(default = "default_true")]
    pub use_cache: bool,
}

fn default_max_results() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

impl QueryRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            max_results: default_max_results(),
            include_reasoning: true,
            use_cache: true,
        }
    }

    /// Check field ranges, returning a message suitable for a 400 response
    pub fn validate(&self) -> Result<(), String> {
        let len = self.question.trim().chars().count();
        if len == 0 {
            return Err("question must not be empty".to_string());
        }
        if self.question.chars().count() > 1000 {
            return Err("question must be at most 1000 characters".to_string());
        }
        if !(1..=100).contains(&self.max_results) {
            return Err(format!(
                "max_results must be between 1 and 100, got {}",
                self.max_results
            ));
        }
        Ok(())
    }
}

/// Kind of workflow step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStepKind {
    Analysis,
    QueryGeneration,
    DatabaseQuery,
    ResponseGeneration,
    Error,
}

/// One step of the query workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryStep {
    pub step_name: String,
    pub step_type: QueryStepKind,
    pub input_data: serde_json::Value,
    pub output_data: serde_json::Value,
    pub execution_time_ms: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// POST /query response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub query_id: Uuid,
    pub question: String,
    pub answer: String,
    /// 0.85 when the SQL executed, 0.3 when it did not, 0.0 when the workflow aborted
    pub confidence_score: f64,
    pub workflow_steps: Vec<QueryStep>,
    /// Policy numbers of the first rows used to build the answer
    pub source_policies: Vec<String>,
    pub generated_sql: Option<String>,
    pub result_count: usize,
    pub total_processing_time_ms: u64,
    pub database_query_time_ms: u64,
    pub llm_processing_time_ms: u64,
    pub tokens_used: u64,
    pub cache_hit: bool,
}
