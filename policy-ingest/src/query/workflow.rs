//! Natural-language query workflow
//!
//! Four sequential steps, each recorded as a [`QueryStep`]:
//! analyze → generate SQL → execute → summarize.
//!
//! A failed analysis or SQL-generation call aborts with an apology answer and
//! confidence 0.0. A failed execution still produces an answer, at confidence 0.3.

use crate::db::{AuditSink, SqlitePolicyStore};
use crate::models::{QueryRequest, QueryResponse, QueryStep, QueryStepKind};
use crate::query::llm_client::{generate_json, LlmClient};
use crate::query::prompts::{answer_generation_prompt, query_analysis_prompt, sql_generation_prompt};
use crate::query::sql_guard::guard_sql;
use policy_common::db::QueryLogEntry;
use serde::Serialize;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Only answers above this confidence are cached
pub const CACHE_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Cached answers kept before the oldest is evicted
const CACHE_CAPACITY: usize = 500;

/// Rows whose policy numbers are reported as sources
const SOURCE_POLICY_COUNT: usize = 5;

const CONFIDENCE_EXECUTED: f64 = 0.85;
const CONFIDENCE_NOT_EXECUTED: f64 = 0.3;

/// Cache and model usage counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkflowStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_entries: usize,
    pub llm_requests: u64,
    pub llm_tokens_used: u64,
}

#[derive(Default)]
struct AnswerCache {
    entries: HashMap<String, QueryResponse>,
    order: VecDeque<String>,
}

impl AnswerCache {
    fn get(&self, key: &str) -> Option<QueryResponse> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: String, response: QueryResponse) {
        if self.entries.insert(key.clone(), response).is_none() {
            self.order.push_back(key);
        }
        while self.order.len() > CACHE_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }
}

/// Cache key: SHA-256 of the normalized question and row limit
pub fn cache_key(question: &str, max_results: u32) -> String {
    let normalized = question.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    let digest = Sha256::digest(format!("{}|{}", normalized, max_results).as_bytes());
    format!("{:x}", digest)
}

/// Outcome of one model call inside the workflow
struct StepResult<T> {
    value: Option<T>,
    step: QueryStep,
    tokens: u64,
}

/// Question → SQL → answer orchestration
pub struct QueryWorkflow {
    llm: Arc<dyn LlmClient>,
    store: SqlitePolicyStore,
    audit: Arc<dyn AuditSink>,
    cache: Mutex<AnswerCache>,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    llm_requests: AtomicU64,
    llm_tokens_used: AtomicU64,
}

impl QueryWorkflow {
    pub fn new(llm: Arc<dyn LlmClient>, store: SqlitePolicyStore, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            llm,
            store,
            audit,
            cache: Mutex::new(AnswerCache::default()),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            llm_requests: AtomicU64::new(0),
            llm_tokens_used: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> WorkflowStats {
        WorkflowStats {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cache_entries: self.cache.lock().map(|c| c.entries.len()).unwrap_or(0),
            llm_requests: self.llm_requests.load(Ordering::Relaxed),
            llm_tokens_used: self.llm_tokens_used.load(Ordering::Relaxed),
        }
    }

    /// Answer one question; never fails
    ///
    /// The request is assumed to have passed [`QueryRequest::validate`].
    pub async fn process(&self, request: &QueryRequest) -> QueryResponse {
        let started = Instant::now();
        let key = cache_key(&request.question, request.max_results);

        if request.use_cache {
            if let Some(mut cached) = self.cached(&key) {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                cached.query_id = Uuid::new_v4();
                cached.cache_hit = true;
                cached.total_processing_time_ms = started.elapsed().as_millis() as u64;
                cached.database_query_time_ms = 0;
                cached.llm_processing_time_ms = 0;
                cached.tokens_used = 0;
                info!(query_id = %cached.query_id, "Answered from cache");
                self.record(&cached, None).await;
                return finish(cached, request.include_reasoning);
            }
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }

        let response = self.run(request, started).await;

        if request.use_cache && response.confidence_score > CACHE_CONFIDENCE_THRESHOLD {
            if let Ok(mut cache) = self.cache.lock() {
                cache.insert(key, response.clone());
            }
        }

        let failure = response
            .workflow_steps
            .iter()
            .find_map(|s| s.error_message.clone());
        self.record(&response, failure).await;

        finish(response, request.include_reasoning)
    }

    fn cached(&self, key: &str) -> Option<QueryResponse> {
        self.cache.lock().ok().and_then(|cache| cache.get(key))
    }

    async fn run(&self, request: &QueryRequest, started: Instant) -> QueryResponse {
        let query_id = Uuid::new_v4();
        info!(%query_id, question = %request.question, "Processing query");

        let mut steps = Vec::with_capacity(4);
        let mut tokens_used = 0;

        let analysis = self.analyze(&request.question).await;
        steps.push(analysis.step);
        tokens_used += analysis.tokens;
        let Some(analysis) = analysis.value else {
            return error_response(query_id, request, "Query analysis failed", steps, tokens_used, started);
        };

        let generated = self.generate_sql(&request.question, &analysis, request.max_results).await;
        steps.push(generated.step);
        tokens_used += generated.tokens;
        let Some(sql) = generated.value else {
            return error_response(query_id, request, "SQL generation failed", steps, tokens_used, started);
        };

        let db_started = Instant::now();
        let (rows, executed) = match self.store.execute_query(&sql).await {
            Ok(rows) => {
                steps.push(QueryStep {
                    step_name: "execute_query".to_string(),
                    step_type: QueryStepKind::DatabaseQuery,
                    input_data: json!({ "sql": sql }),
                    output_data: json!({ "result_count": rows.len() }),
                    execution_time_ms: elapsed_ms(db_started),
                    success: true,
                    error_message: None,
                });
                (rows, true)
            }
            Err(e) => {
                warn!(%query_id, error = %e, "Generated query failed");
                steps.push(error_step("execute_query", e.to_string(), db_started));
                (Vec::new(), false)
            }
        };
        let database_query_time_ms = elapsed_ms(db_started);

        let answer = self.summarize(&request.question, &rows).await;
        steps.push(answer.step);
        tokens_used += answer.tokens;

        let total_processing_time_ms = elapsed_ms(started);
        let response = QueryResponse {
            query_id,
            question: request.question.clone(),
            answer: answer.value.unwrap_or_default(),
            confidence_score: if executed {
                CONFIDENCE_EXECUTED
            } else {
                CONFIDENCE_NOT_EXECUTED
            },
            workflow_steps: steps,
            source_policies: source_policies(&rows),
            generated_sql: Some(sql),
            result_count: rows.len(),
            total_processing_time_ms,
            database_query_time_ms,
            llm_processing_time_ms: total_processing_time_ms.saturating_sub(database_query_time_ms),
            tokens_used,
            cache_hit: false,
        };

        info!(
            %query_id,
            result_count = response.result_count,
            confidence = response.confidence_score,
            tokens = tokens_used,
            elapsed_ms = total_processing_time_ms,
            "Query complete"
        );
        response
    }

    async fn analyze(&self, question: &str) -> StepResult<Value> {
        let started = Instant::now();
        match generate_json(self.llm.as_ref(), &query_analysis_prompt(question)).await {
            Ok((analysis, tokens)) => {
                self.count_llm_call(tokens);
                debug!(analysis = %analysis, "Query analyzed");
                StepResult {
                    step: QueryStep {
                        step_name: "analyze_query".to_string(),
                        step_type: QueryStepKind::Analysis,
                        input_data: json!({ "question": question }),
                        output_data: analysis.clone(),
                        execution_time_ms: elapsed_ms(started),
                        success: true,
                        error_message: None,
                    },
                    value: Some(analysis),
                    tokens,
                }
            }
            Err(e) => {
                error!(error = %e, "Query analysis failed");
                StepResult {
                    value: None,
                    step: error_step("analyze_query", e.to_string(), started),
                    tokens: 0,
                }
            }
        }
    }

    async fn generate_sql(&self, question: &str, analysis: &Value, max_results: u32) -> StepResult<String> {
        let started = Instant::now();
        let prompt = sql_generation_prompt(question, analysis, max_results);
        match self.llm.generate(&prompt).await {
            Ok(response) => {
                self.count_llm_call(response.tokens_used);
                let guarded = guard_sql(&response.content, max_results);
                if guarded.used_fallback {
                    warn!(output = %response.content, "Model SQL rejected, using fallback query");
                }
                StepResult {
                    step: QueryStep {
                        step_name: "generate_sql".to_string(),
                        step_type: QueryStepKind::QueryGeneration,
                        input_data: json!({ "analysis": analysis }),
                        output_data: json!({ "sql": guarded.sql, "fallback": guarded.used_fallback }),
                        execution_time_ms: elapsed_ms(started),
                        success: true,
                        error_message: None,
                    },
                    value: Some(guarded.sql),
                    tokens: response.tokens_used,
                }
            }
            Err(e) => {
                error!(error = %e, "SQL generation failed");
                StepResult {
                    value: None,
                    step: error_step("generate_sql", e.to_string(), started),
                    tokens: 0,
                }
            }
        }
    }

    async fn summarize(&self, question: &str, rows: &[Map<String, Value>]) -> StepResult<String> {
        let started = Instant::now();
        match self.llm.generate(&answer_generation_prompt(question, rows)).await {
            Ok(response) => {
                self.count_llm_call(response.tokens_used);
                StepResult {
                    step: QueryStep {
                        step_name: "generate_answer".to_string(),
                        step_type: QueryStepKind::ResponseGeneration,
                        input_data: json!({ "data_count": rows.len() }),
                        output_data: json!({ "answer_length": response.content.chars().count() }),
                        execution_time_ms: elapsed_ms(started),
                        success: true,
                        error_message: None,
                    },
                    value: Some(response.content),
                    tokens: response.tokens_used,
                }
            }
            Err(e) => {
                error!(error = %e, "Answer generation failed");
                StepResult {
                    value: Some(format!("Error generating answer: {}", e)),
                    step: error_step("generate_answer", e.to_string(), started),
                    tokens: 0,
                }
            }
        }
    }

    fn count_llm_call(&self, tokens: u64) {
        self.llm_requests.fetch_add(1, Ordering::Relaxed);
        self.llm_tokens_used.fetch_add(tokens, Ordering::Relaxed);
    }

    async fn record(&self, response: &QueryResponse, error_message: Option<String>) {
        let entry = QueryLogEntry {
            question: response.question.clone(),
            generated_sql: response.generated_sql.clone(),
            result_count: response.result_count,
            processing_time_ms: response.total_processing_time_ms,
            confidence_score: response.confidence_score,
            tokens_used: response.tokens_used,
            cache_hit: response.cache_hit,
            error_message,
        };
        if let Err(e) = self.audit.record_query(&entry).await {
            error!(query_id = %response.query_id, error = %e, "Failed to write query log entry");
        }
    }
}

fn finish(mut response: QueryResponse, include_reasoning: bool) -> QueryResponse {
    if !include_reasoning {
        response.workflow_steps.clear();
    }
    response
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn source_policies(rows: &[Map<String, Value>]) -> Vec<String> {
    rows.iter()
        .take(SOURCE_POLICY_COUNT)
        .filter_map(|row| row.get("policy_number"))
        .filter_map(|value| value.as_str().map(str::to_string))
        .collect()
}

fn error_step(name: &str, message: String, started: Instant) -> QueryStep {
    QueryStep {
        step_name: name.to_string(),
        step_type: QueryStepKind::Error,
        input_data: json!({}),
        output_data: json!({}),
        execution_time_ms: elapsed_ms(started),
        success: false,
        error_message: Some(message),
    }
}

fn error_response(
    query_id: Uuid,
    request: &QueryRequest,
    error: &str,
    steps: Vec<QueryStep>,
    tokens_used: u64,
    started: Instant,
) -> QueryResponse {
    let total_processing_time_ms = elapsed_ms(started);
    QueryResponse {
        query_id,
        question: request.question.clone(),
        answer: format!("I encountered an error: {}. Please try rephrasing your question.", error),
        confidence_score: 0.0,
        workflow_steps: steps,
        source_policies: Vec::new(),
        generated_sql: None,
        result_count: 0,
        total_processing_time_ms,
        database_query_time_ms: 0,
        llm_processing_time_ms: total_processing_time_ms,
        tokens_used,
        cache_hit: false,
    }
}
