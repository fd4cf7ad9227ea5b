// OpenAI Batch Mock Server Integration Tests
// Author: Andrew Yates (ayates@dropbox.com) - 2026 Dropbox
//
//! Integration tests for the OpenAI batch provider using a mock HTTP
//! server. These tests don't require an API key and can run without
//! external dependencies.
//!
//! Run with: cargo test -p evalbatch-openai --test openai_batch_mock_server_tests

#![allow(clippy::unwrap_used)]

use evalbatch::model::ProviderBatchStatus;
use evalbatch::provider::{BatchProvider, ProviderCredentials, RequestLine};
use serde_json::json;
use std::collections::HashMap;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Create a provider pointed at the mock server
fn create_mock_provider(mock_server_uri: &str) -> evalbatch_openai::OpenAIBatchProvider {
    evalbatch_openai::OpenAIBatchProvider::new(&ProviderCredentials {
        api_key: "test-key".to_string(),
        base_url: Some(mock_server_uri.to_string()),
        extra: HashMap::new(),
    })
    .unwrap()
}

fn request_lines(n: usize) -> Vec<RequestLine> {
    (0..n)
        .map(|i| RequestLine {
            custom_id: format!("item-{i}"),
            method: "POST".to_string(),
            url: "/v1/responses".to_string(),
            body: json!({"model": "gpt-4o", "input": format!("question {i}")}),
        })
        .collect()
}

/// Standard batch object response
fn mock_batch_response(id: &str, status: &str) -> serde_json::Value {
    json!({
        "id": id,
        "object": "batch",
        "endpoint": "/v1/responses",
        "input_file_id": "file-abc",
        "status": status,
        "completion_window": "24h"
    })
}

// ============= Batch Creation Tests =============

#[tokio::test]
async fn test_create_batch_uploads_file_then_creates_batch() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/files"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": "file-abc", "object": "file", "purpose": "batch"})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/batches"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "input_file_id": "file-abc",
            "endpoint": "/v1/responses",
            "completion_window": "24h"
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(mock_batch_response("batch_1", "validating")),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = create_mock_provider(&mock_server.uri());
    let creation = provider
        .create_batch(&request_lines(3), &HashMap::new())
        .await
        .unwrap();

    assert_eq!(creation.provider_batch_id, "batch_1");
    assert_eq!(creation.provider_file_id, "file-abc");
    assert_eq!(creation.provider_status, ProviderBatchStatus::Validating);
    assert_eq!(creation.total_items, 3);
}

#[tokio::test]
async fn test_create_batch_forwards_config_as_metadata() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "file-abc"})))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/batches"))
        .and(body_partial_json(json!({
            "metadata": {"run_id": "r-1"}
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(mock_batch_response("batch_2", "validating")),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = create_mock_provider(&mock_server.uri());
    let mut config = HashMap::new();
    config.insert("run_id".to_string(), json!("r-1"));
    let creation = provider
        .create_batch(&request_lines(1), &config)
        .await
        .unwrap();
    assert_eq!(creation.provider_batch_id, "batch_2");
}

#[tokio::test]
async fn test_create_batch_with_no_lines_fails_without_http() {
    let mock_server = MockServer::start().await;
    let provider = create_mock_provider(&mock_server.uri());

    let err = provider
        .create_batch(&[], &HashMap::new())
        .await
        .unwrap_err();
    assert!(!err.is_retryable());
    assert!(err.to_string().contains("no request lines"));
}

// ============= Status Polling Tests =============

#[tokio::test]
async fn test_get_batch_status_in_progress() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/batches/batch_1"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(mock_batch_response("batch_1", "in_progress")),
        )
        .mount(&mock_server)
        .await;

    let provider = create_mock_provider(&mock_server.uri());
    let snapshot = provider.get_batch_status("batch_1").await.unwrap();
    assert_eq!(snapshot.provider_status, ProviderBatchStatus::InProgress);
    assert!(snapshot.provider_output_file_id.is_none());
    assert!(snapshot.error_message.is_none());
}

#[tokio::test]
async fn test_get_batch_status_completed_with_output_file() {
    let mock_server = MockServer::start().await;

    let mut body = mock_batch_response("batch_1", "completed");
    body["output_file_id"] = json!("file-out");
    Mock::given(method("GET"))
        .and(path("/v1/batches/batch_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&mock_server)
        .await;

    let provider = create_mock_provider(&mock_server.uri());
    let snapshot = provider.get_batch_status("batch_1").await.unwrap();
    assert_eq!(snapshot.provider_status, ProviderBatchStatus::Completed);
    assert_eq!(snapshot.provider_output_file_id.unwrap(), "file-out");
}

#[tokio::test]
async fn test_get_batch_status_failed_with_errors() {
    let mock_server = MockServer::start().await;

    let mut body = mock_batch_response("batch_1", "failed");
    body["errors"] = json!({"data": [{"message": "invalid model on line 2"}]});
    Mock::given(method("GET"))
        .and(path("/v1/batches/batch_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&mock_server)
        .await;

    let provider = create_mock_provider(&mock_server.uri());
    let snapshot = provider.get_batch_status("batch_1").await.unwrap();
    assert_eq!(snapshot.provider_status, ProviderBatchStatus::Failed);
    assert_eq!(snapshot.error_message.unwrap(), "invalid model on line 2");
}

#[tokio::test]
async fn test_get_batch_status_unknown_status_preserved() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/batches/batch_1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(mock_batch_response("batch_1", "paused")),
        )
        .mount(&mock_server)
        .await;

    let provider = create_mock_provider(&mock_server.uri());
    let snapshot = provider.get_batch_status("batch_1").await.unwrap();
    assert_eq!(
        snapshot.provider_status,
        ProviderBatchStatus::Other("paused".to_string())
    );
    assert!(!snapshot.provider_status.is_terminal());
}

// ============= Results Download Tests =============

#[tokio::test]
async fn test_download_results_parses_jsonl() {
    let mock_server = MockServer::start().await;

    let jsonl = concat!(
        r#"{"custom_id":"item-0","response":{"body":{"output":"answer zero"}}}"#,
        "\n",
        "\n",
        r#"{"custom_id":"item-1","error":{"message":"rate limited"}}"#,
        "\n",
    );
    Mock::given(method("GET"))
        .and(path("/v1/files/file-out/content"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_string(jsonl))
        .mount(&mock_server)
        .await;

    let provider = create_mock_provider(&mock_server.uri());
    let lines = provider.download_batch_results("file-out").await.unwrap();

    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].custom_id, "item-0");
    assert_eq!(
        lines[0].response.as_ref().unwrap().body["output"],
        "answer zero"
    );
    assert!(lines[1].response.is_none());
    assert_eq!(lines[1].error.as_ref().unwrap().message, "rate limited");
}

#[tokio::test]
async fn test_download_results_malformed_line_is_parse_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/files/file-out/content"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json\n"))
        .mount(&mock_server)
        .await;

    let provider = create_mock_provider(&mock_server.uri());
    let err = provider.download_batch_results("file-out").await.unwrap_err();
    assert!(err.to_string().contains("result line 1"));
}

// ============= Error Mapping Tests =============

#[tokio::test]
async fn test_rate_limit_is_retryable() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/batches/batch_1"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"message": "Rate limit reached", "type": "rate_limit_error"}
        })))
        .mount(&mock_server)
        .await;

    let provider = create_mock_provider(&mock_server.uri());
    let err = provider.get_batch_status("batch_1").await.unwrap_err();
    assert!(err.is_retryable());
    assert!(err.to_string().contains("Rate limit reached"));
}

#[tokio::test]
async fn test_server_error_is_retryable() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/batches/batch_1"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let provider = create_mock_provider(&mock_server.uri());
    let err = provider.get_batch_status("batch_1").await.unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_bad_request_is_not_retryable() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/files"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"message": "Invalid purpose", "type": "invalid_request_error"}
        })))
        .mount(&mock_server)
        .await;

    let provider = create_mock_provider(&mock_server.uri());
    let err = provider
        .create_batch(&request_lines(1), &HashMap::new())
        .await
        .unwrap_err();
    assert!(!err.is_retryable());
    assert!(err.to_string().contains("Invalid purpose"));
}
