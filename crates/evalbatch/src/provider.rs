// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Provider capability interface.
//!
//! The pipeline never talks to a vendor API directly; it goes through
//! [`BatchProvider`], implemented per vendor (see the `evalbatch-openai`
//! crate). Credentials are tenant-scoped, so the sweeper resolves them per
//! group through [`CredentialResolver`] and builds one client per group
//! through [`ProviderFactory`].

use crate::error::Result;
use crate::model::{ProviderBatchStatus, TenantScope};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// One provider-native request line, serialized as newline-delimited JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestLine {
    /// Caller-assigned id correlating this line to its result line
    pub custom_id: String,
    /// HTTP method, always "POST" for batch endpoints
    pub method: String,
    /// Target endpoint path (e.g. "/v1/responses", "/v1/embeddings")
    pub url: String,
    /// Endpoint-specific request body
    pub body: serde_json::Value,
}

/// Provider response to batch creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchCreation {
    /// Provider-assigned batch id
    pub provider_batch_id: String,
    /// Provider-assigned input file id
    pub provider_file_id: String,
    /// Initial provider status
    pub provider_status: ProviderBatchStatus,
    /// Number of request lines accepted
    pub total_items: usize,
}

/// Snapshot of a batch's remote state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStatusSnapshot {
    /// Current provider status
    pub provider_status: ProviderBatchStatus,
    /// Output file id, present once the batch completes
    pub provider_output_file_id: Option<String>,
    /// Provider failure description, present for failed batches
    pub error_message: Option<String>,
}

/// Provider error object attached to a failed result line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultLineError {
    /// Failure description
    pub message: String,
}

/// Successful response portion of a result line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultLineResponse {
    /// Endpoint-specific response body
    pub body: serde_json::Value,
}

/// One raw batch-result line, returned verbatim by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResultLine {
    /// Echo of the request line's custom id
    pub custom_id: String,
    /// Response payload, absent when the request failed
    pub response: Option<ResultLineResponse>,
    /// Error payload, absent when the request succeeded
    pub error: Option<ResultLineError>,
}

/// Capability interface for one LLM vendor's batch API.
#[async_trait]
pub trait BatchProvider: Send + Sync {
    /// Vendor name recorded on batch-job rows.
    fn name(&self) -> &str;

    /// Upload `lines` and create a batch. `config` is forwarded opaquely.
    async fn create_batch(
        &self,
        lines: &[RequestLine],
        config: &HashMap<String, serde_json::Value>,
    ) -> Result<BatchCreation>;

    /// Query the current status of a batch.
    async fn get_batch_status(&self, provider_batch_id: &str) -> Result<BatchStatusSnapshot>;

    /// Download the raw result lines of a completed batch. No
    /// transformation is performed here; the parser interprets the lines.
    async fn download_batch_results(
        &self,
        provider_output_file_id: &str,
    ) -> Result<Vec<RawResultLine>>;
}

/// Tenant-scoped provider credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCredentials {
    /// API key for the vendor
    pub api_key: String,
    /// Override for the vendor's base URL (tests, proxies)
    pub base_url: Option<String>,
    /// Vendor-specific extras (org id, region, ...)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, String>,
}

/// Resolves credentials for a tenant scope. Implemented by the excluded
/// credential-storage layer.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Look up the credentials for `tenant`.
    async fn resolve(&self, tenant: &TenantScope) -> Result<ProviderCredentials>;
}

/// Builds a provider client from resolved credentials. One client is built
/// per tenant group per sweep.
pub trait ProviderFactory: Send + Sync {
    /// Construct a client, failing if the credentials are unusable.
    fn build(&self, credentials: &ProviderCredentials) -> Result<Arc<dyn BatchProvider>>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_request_line_wire_shape() {
        let line = RequestLine {
            custom_id: "item-1".to_string(),
            method: "POST".to_string(),
            url: "/v1/responses".to_string(),
            body: serde_json::json!({"model": "gpt-4o", "input": "hi"}),
        };
        let json = serde_json::to_value(&line).unwrap();
        assert_eq!(json["custom_id"], "item-1");
        assert_eq!(json["method"], "POST");
        assert_eq!(json["body"]["model"], "gpt-4o");
    }

    #[test]
    fn test_raw_result_line_error_variant() {
        let raw: RawResultLine = serde_json::from_str(
            r#"{"custom_id":"x","response":null,"error":{"message":"rate limited"}}"#,
        )
        .unwrap();
        assert!(raw.response.is_none());
        assert_eq!(raw.error.unwrap().message, "rate limited");
    }

    #[test]
    fn test_raw_result_line_omitted_fields_are_none() {
        // some providers omit null fields entirely
        let raw: RawResultLine = serde_json::from_str(r#"{"custom_id":"x"}"#).unwrap();
        assert_eq!(raw.custom_id, "x");
        assert!(raw.response.is_none());
        assert!(raw.error.is_none());
    }
}
