//! LLM client
//!
//! [`LlmClient`] is the seam between the query workflow and the remote model.
//! [`GeminiClient`] talks to the Gemini `generateContent` REST endpoint with a
//! per-process rate limit.

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use policy_common::config::LlmConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Prefix for prompts that expect a JSON answer
pub const JSON_ONLY_PREFIX: &str = "Respond only in valid json format. No explanations.";

/// Request header carrying the API key
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Remote model failures
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("LLM API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("LLM returned no content")]
    EmptyResponse,
}

/// Text produced by one model call
#[derive(Debug, Clone, PartialEq)]
pub struct LlmResponse {
    pub content: String,
    pub tokens_used: u64,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Single-turn text generation
    async fn generate(&self, prompt: &str) -> Result<LlmResponse, LlmError>;

    fn model_name(&self) -> &str;
}

/// Generate and parse a JSON answer
///
/// Unparseable output yields an empty object rather than an error; only a failed
/// call is an error.
pub async fn generate_json(
    client: &dyn LlmClient,
    prompt: &str,
) -> Result<(Value, u64), LlmError> {
    let full_prompt = format!("{}\n\n{}", JSON_ONLY_PREFIX, prompt);
    let response = client.generate(&full_prompt).await?;
    Ok((extract_json(&response.content), response.tokens_used))
}

/// Parse JSON from model output, unwrapping a ```json fence when present
pub fn extract_json(content: &str) -> Value {
    let mut text = content.trim();
    if let Some((_, rest)) = text.split_once("```json") {
        text = rest.split("```").next().unwrap_or(rest).trim();
    }

    serde_json::from_str(text).unwrap_or_else(|e| {
        debug!(error = %e, "Model output is not valid JSON");
        Value::Object(Default::default())
    })
}

/// Rough token count for responses without usage metadata
pub fn estimate_tokens(text: &str) -> u64 {
    (text.split_whitespace().count() as f64 * 1.3) as u64
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    top_p: f32,
    top_k: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    total_token_count: Option<u64>,
}

impl GenerateResponse {
    fn into_llm_response(self) -> Result<LlmResponse, LlmError> {
        let content: String = self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        let tokens_used = self
            .usage_metadata
            .and_then(|u| u.total_token_count)
            .unwrap_or_else(|| estimate_tokens(&content));

        Ok(LlmResponse {
            content,
            tokens_used,
        })
    }
}

/// Gemini REST client
pub struct GeminiClient {
    http_client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    generation_config: GenerationConfig,
    rate_limiter: DefaultDirectRateLimiter,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, config: &LlmConfig) -> Result<Self, LlmError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            http_client,
            api_key: api_key.into(),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            generation_config: GenerationConfig {
                temperature: config.temperature,
                max_output_tokens: config.max_output_tokens,
                top_p: config.top_p,
                top_k: config.top_k,
            },
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<LlmResponse, LlmError> {
        self.rate_limiter.until_ready().await;

        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: self.generation_config.clone(),
        };

        debug!(model = %self.model, prompt_chars = prompt.len(), "Calling LLM");

        let response = self
            .http_client
            .post(self.endpoint())
            .header(API_KEY_HEADER, self.api_key.as_str())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(status.as_u16(), error_text));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.without_url().to_string()))?;

        let result = parsed.into_llm_response()?;
        debug!(tokens = result.tokens_used, "LLM call complete");
        Ok(result)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
