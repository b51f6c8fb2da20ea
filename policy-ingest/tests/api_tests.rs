//! HTTP API tests against an in-memory database

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use policy_common::config::{IngestionConfig, LlmConfig};
use policy_ingest::config::Settings;
use policy_ingest::query::{LlmClient, LlmError, LlmResponse};
use policy_ingest::{build_router, AppState};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use tower::util::ServiceExt;

const BOUNDARY: &str = "policy-test-boundary";

const POLICY_CSV: &str = "\
POLICY NUMBER,INSURED NAME,SUM INSURED,PREMIUM,OWN RETENTION %,OWN RETENTION SUM INSURED,OWN RETENTION PREMIUM,TREATY %,TREATY SUM INSURED,TREATY PREMIUM,PERIOD OF INSURANCE
P001,Acme Ltd,\"₦1,000,000\",5000,60,600000,3000,40,400000,2000,01/01/2024 - 31/12/2024
P002,Beta Plc,500000,2500,50,250000,1250,150,250000,1250,01/01/2024 - 31/12/2024
P003,,200000,900,50,100000,450,50,100000,450,01/01/2024 - 31/12/2024
";

struct CannedLlm;

#[async_trait]
impl LlmClient for CannedLlm {
    async fn generate(&self, prompt: &str) -> Result<LlmResponse, LlmError> {
        let content = if prompt.contains("Classify the query") {
            "{\"query_type\": \"aggregation\"}"
        } else if prompt.contains("Generate a SQLite query") {
            "SELECT policy_number, premium FROM insurance_policies ORDER BY premium DESC"
        } else {
            "Acme Ltd pays the highest premium."
        };
        Ok(LlmResponse {
            content: content.to_string(),
            tokens_used: 7,
        })
    }

    fn model_name(&self) -> &str {
        "canned"
    }
}

fn test_settings() -> Settings {
    Settings {
        port: 8000,
        database_path: PathBuf::from(":memory:"),
        llm: LlmConfig::default(),
        llm_api_key: None,
        ingestion: IngestionConfig::default(),
    }
}

async fn create_test_app(llm: Option<Arc<dyn LlmClient>>) -> (Router, SqlitePool) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    policy_common::db::create_schema(&pool)
        .await
        .expect("Failed to create schema");

    let state = AppState::new(pool.clone(), test_settings(), llm);
    (build_router(state), pool)
}

fn multipart_request(uri: &str, filename: &str, content: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
            BOUNDARY, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _pool) = create_test_app(None).await;

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "policy-ingest");
    assert_eq!(body["database"], "ok");
    assert_eq!(body["llm_configured"], false);
    assert!(body["uptime_seconds"].is_u64());
}

#[tokio::test]
async fn test_ingest_csv_upload() {
    let (app, pool) = create_test_app(None).await;

    let response = app
        .oneshot(multipart_request("/ingest", "policies.csv", POLICY_CSV.as_bytes()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let report = body_json(response).await;
    assert_eq!(report["status"], "partial");
    assert_eq!(report["total_rows"], 3);
    assert_eq!(report["processed_rows"], 2);
    assert_eq!(report["failed_rows"], 1);
    assert_eq!(report["requires_acknowledgement"], true);
    assert_eq!(report["validation_errors"][0]["error_kind"], "invalid_percentage");
    assert_eq!(report["validation_errors"][0]["column_name"], "treaty_ppn");

    let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM insurance_policies")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(stored, 2);

    let logged: String = sqlx::query_scalar("SELECT status FROM data_ingestion_logs")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(logged, "partial");
}

#[tokio::test]
async fn test_ingest_rejects_bad_extension() {
    let (app, _pool) = create_test_app(None).await;

    let response = app
        .oneshot(multipart_request("/ingest", "policies.txt", b"hello"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_ingest_rejects_out_of_range_batch_size() {
    let (app, _pool) = create_test_app(None).await;

    let response = app
        .oneshot(multipart_request(
            "/ingest?batch_size=50",
            "policies.csv",
            POLICY_CSV.as_bytes(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("batch_size must be between 100 and 10000"));
}

#[tokio::test]
async fn test_ingest_rejects_non_numeric_batch_size_with_json_error() {
    let (app, pool) = create_test_app(None).await;

    let response = app
        .clone()
        .oneshot(multipart_request(
            "/ingest?batch_size=lots",
            "policies.csv",
            POLICY_CSV.as_bytes(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert_eq!(
        body["error"]["message"],
        "batch_size must be a non-negative integer, got 'lots'"
    );

    let logs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM data_ingestion_logs")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(logs, 0);

    let response = app.oneshot(get("/metrics?days=week")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_ingest_missing_file_part() {
    let (app, _pool) = create_test_app(None).await;

    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"other\"\r\n\r\nvalue\r\n--{b}--\r\n",
        b = BOUNDARY
    );
    let request = Request::builder()
        .method("POST")
        .uri("/ingest")
        .header("content-type", format!("multipart/form-data; boundary={}", BOUNDARY))
        .body(Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_validate_endpoint_does_not_store() {
    let (app, pool) = create_test_app(None).await;

    let response = app
        .oneshot(multipart_request(
            "/ingest/validate",
            "policies.csv",
            POLICY_CSV.as_bytes(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let report = body_json(response).await;
    assert_eq!(report["valid"], true);
    assert_eq!(report["total_rows"], 3);
    assert_eq!(report["detected_mapping"]["treaty_ppn"], "TREATY %");

    let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM insurance_policies")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(stored, 0);
}

#[tokio::test]
async fn test_query_without_llm_is_unavailable() {
    let (app, _pool) = create_test_app(None).await;

    let response = app
        .oneshot(json_request("POST", "/query", json!({"question": "Total premium?"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_query_validation() {
    let (app, _pool) = create_test_app(Some(Arc::new(CannedLlm))).await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/query",
            json!({"question": "Total premium?", "max_results": 500}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_query_end_to_end() {
    let (app, _pool) = create_test_app(Some(Arc::new(CannedLlm))).await;

    let response = app
        .clone()
        .oneshot(multipart_request("/ingest", "policies.csv", POLICY_CSV.as_bytes()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(json_request(
            "POST",
            "/query",
            json!({"question": "Who pays the highest premium?", "max_results": 5}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["answer"], "Acme Ltd pays the highest premium.");
    assert_eq!(body["confidence_score"], 0.85);
    assert_eq!(body["result_count"], 2);
    assert_eq!(body["source_policies"], json!(["P001", "P002"]));
    assert_eq!(
        body["generated_sql"],
        "SELECT policy_number, premium FROM insurance_policies ORDER BY premium DESC LIMIT 5"
    );
    assert_eq!(body["workflow_steps"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_data_summary_and_metrics() {
    let (app, _pool) = create_test_app(Some(Arc::new(CannedLlm))).await;

    app.clone()
        .oneshot(multipart_request("/ingest", "policies.csv", POLICY_CSV.as_bytes()))
        .await
        .unwrap();

    let response = app.clone().oneshot(get("/data-summary")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let summary = body_json(response).await;
    assert_eq!(summary["financial"]["total_policies"], 2);
    assert_eq!(summary["financial"]["total_sum_insured"], 1_500_000.0);
    assert_eq!(summary["financial"]["total_premium"], 7500.0);
    assert_eq!(summary["date_range"]["earliest_start_date"], "2024-01-01");
    assert_eq!(summary["date_range"]["latest_end_date"], "2024-12-31");

    let response = app.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let metrics = body_json(response).await;
    assert_eq!(metrics["ingestion"]["total_ingestions"], 1);
    assert_eq!(metrics["ingestion"]["partial_ingestions"], 1);
    assert_eq!(metrics["ingestion"]["total_rows_processed"], 2);
    assert_eq!(metrics["workflow"]["cache_hits"], 0);
    assert_eq!(metrics["recent_ingestions"][0]["filename"], "policies.csv");

    let response = app.oneshot(get("/metrics?days=0")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_single_policy_create_and_fetch() {
    let (app, _pool) = create_test_app(None).await;

    let policy = json!({
        "policy_number": "SP-1",
        "insured_name": "Gamma Co",
        "sum_insured": 1000.0,
        "premium": 10.0,
        "own_retention_ppn": 50.0,
        "own_retention_sum_insured": 500.0,
        "own_retention_premium": 5.0,
        "treaty_ppn": 50.0,
        "treaty_sum_insured": 500.0,
        "treaty_premium": 5.0,
        "insurance_period_start_date": "2024-01-01",
        "insurance_period_end_date": "2024-12-31"
    });

    let response = app
        .clone()
        .oneshot(json_request("POST", "/policies", policy.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    assert_eq!(created["policy_number"], "SP-1");
    assert!(created["guid"].is_string());

    let response = app
        .clone()
        .oneshot(json_request("POST", "/policies", policy.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app.clone().oneshot(get("/policies/SP-1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let fetched = body_json(response).await;
    assert_eq!(fetched["insured_name"], "Gamma Co");

    let response = app.clone().oneshot(get("/policies/NOPE")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let mut invalid = policy.clone();
    invalid["policy_number"] = json!("SP-2");
    invalid["premium"] = json!(0.0);
    let response = app
        .clone()
        .oneshot(json_request("POST", "/policies", invalid))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut out_of_range = policy;
    out_of_range["policy_number"] = json!("SP-3");
    out_of_range["treaty_ppn"] = json!(500.0);
    let response = app
        .clone()
        .oneshot(json_request("POST", "/policies", out_of_range))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert!(body["error"]["message"].as_str().unwrap().contains("treaty_ppn"));

    let response = app.oneshot(get("/policies/SP-3")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
