//! Natural-language questions over the policy table
//!
//! - [`llm_client`]: model seam and the Gemini REST client
//! - [`prompts`]: analysis, SQL and answer prompt templates
//! - [`sql_guard`]: read-only enforcement and row limits for generated SQL
//! - [`workflow`]: the four-step orchestration with answer cache

pub mod llm_client;
pub mod prompts;
pub mod sql_guard;
pub mod workflow;

pub use llm_client::{GeminiClient, LlmClient, LlmError, LlmResponse};
pub use sql_guard::{guard_sql, GuardedSql};
pub use workflow::{QueryWorkflow, WorkflowStats};
