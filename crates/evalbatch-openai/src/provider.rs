// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! OpenAI Files + Batches client.
//!
//! Batch creation is two HTTP calls: upload the request lines as a JSONL
//! file (`POST /v1/files`, purpose `batch`), then create the batch over
//! that file (`POST /v1/batches`). Results come back as another file
//! downloaded from `GET /v1/files/{id}/content`.

use async_trait::async_trait;
use evalbatch::error::{Error, Result};
use evalbatch::model::ProviderBatchStatus;
use evalbatch::provider::{
    BatchCreation, BatchProvider, BatchStatusSnapshot, ProviderCredentials, ProviderFactory,
    RawResultLine, RequestLine,
};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const COMPLETION_WINDOW: &str = "24h";

#[derive(Debug, Deserialize)]
struct FileObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct BatchObject {
    id: String,
    status: String,
    #[serde(default)]
    output_file_id: Option<String>,
    #[serde(default)]
    errors: Option<BatchErrors>,
}

#[derive(Debug, Deserialize)]
struct BatchErrors {
    #[serde(default)]
    data: Vec<BatchErrorDatum>,
}

#[derive(Debug, Deserialize)]
struct BatchErrorDatum {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl BatchObject {
    fn error_message(&self) -> Option<String> {
        let messages: Vec<String> = self
            .errors
            .as_ref()?
            .data
            .iter()
            .filter_map(|d| d.message.clone())
            .collect();
        if messages.is_empty() {
            None
        } else {
            Some(messages.join("; "))
        }
    }
}

/// [`BatchProvider`] over the OpenAI Files and Batches endpoints.
#[derive(Debug, Clone)]
pub struct OpenAIBatchProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAIBatchProvider {
    /// Build a client from tenant credentials. The base URL defaults to
    /// the public OpenAI endpoint and can be overridden for proxies and
    /// tests.
    pub fn new(credentials: &ProviderCredentials) -> Result<Self> {
        if credentials.api_key.trim().is_empty() {
            return Err(Error::InvalidConfig("OpenAI API key is empty".to_string()));
        }
        let base_url = credentials
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Ok(Self {
            client: reqwest::Client::new(),
            api_key: credentials.api_key.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Map a transport-level failure. Timeouts and connection refusals
    /// are worth retrying; anything else is not.
    fn transport_error(e: reqwest::Error) -> Error {
        Error::Provider {
            message: format!("http transport error: {e}"),
            retryable: e.is_timeout() || e.is_connect(),
        }
    }

    /// Turn a non-2xx response into a provider error. 429 and 5xx are
    /// retryable; 4xx are not.
    async fn response_error(response: reqwest::Response) -> Error {
        let status = response.status();
        let retryable = status.as_u16() == 429 || status.is_server_error();
        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ApiErrorEnvelope>(&body) {
            Ok(envelope) => envelope.error.message,
            Err(_) if body.is_empty() => status.to_string(),
            Err(_) => format!("{status}: {body}"),
        };
        Error::Provider { message, retryable }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(Self::response_error(response).await)
        }
    }

    async fn upload_jsonl(&self, lines: &[RequestLine]) -> Result<String> {
        let mut jsonl = String::new();
        for line in lines {
            jsonl.push_str(&serde_json::to_string(line)?);
            jsonl.push('\n');
        }
        let part = Part::bytes(jsonl.into_bytes())
            .file_name("batch.jsonl")
            .mime_str("application/jsonl")
            .map_err(|e| Error::InvalidConfig(format!("invalid upload part: {e}")))?;
        let form = Form::new().text("purpose", "batch").part("file", part);

        let response = self
            .client
            .post(self.url("/v1/files"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(Self::transport_error)?;
        let file: FileObject = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::Parse(format!("malformed file object: {e}")))?;
        Ok(file.id)
    }
}

#[async_trait]
impl BatchProvider for OpenAIBatchProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn create_batch(
        &self,
        lines: &[RequestLine],
        config: &HashMap<String, serde_json::Value>,
    ) -> Result<BatchCreation> {
        let endpoint = lines
            .first()
            .map(|l| l.url.clone())
            .ok_or_else(|| Error::provider("cannot create a batch with no request lines"))?;

        let file_id = self.upload_jsonl(lines).await?;
        debug!(%file_id, items = lines.len(), "request file uploaded");

        // OpenAI metadata values must be strings
        let metadata: HashMap<String, String> = config
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect();
        let mut body = serde_json::json!({
            "input_file_id": file_id,
            "endpoint": endpoint,
            "completion_window": COMPLETION_WINDOW,
        });
        if !metadata.is_empty() {
            body["metadata"] = serde_json::to_value(metadata)?;
        }

        let response = self
            .client
            .post(self.url("/v1/batches"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(Self::transport_error)?;
        let batch: BatchObject = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::Parse(format!("malformed batch object: {e}")))?;
        debug!(batch_id = %batch.id, status = %batch.status, "batch created");

        Ok(BatchCreation {
            provider_batch_id: batch.id,
            provider_file_id: file_id,
            provider_status: ProviderBatchStatus::parse(&batch.status),
            total_items: lines.len(),
        })
    }

    async fn get_batch_status(&self, provider_batch_id: &str) -> Result<BatchStatusSnapshot> {
        let response = self
            .client
            .get(self.url(&format!("/v1/batches/{provider_batch_id}")))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(Self::transport_error)?;
        let batch: BatchObject = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::Parse(format!("malformed batch object: {e}")))?;

        Ok(BatchStatusSnapshot {
            provider_status: ProviderBatchStatus::parse(&batch.status),
            provider_output_file_id: batch.output_file_id.clone(),
            error_message: batch.error_message(),
        })
    }

    async fn download_batch_results(
        &self,
        provider_output_file_id: &str,
    ) -> Result<Vec<RawResultLine>> {
        let response = self
            .client
            .get(self.url(&format!("/v1/files/{provider_output_file_id}/content")))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(Self::transport_error)?;
        let text = Self::check(response)
            .await?
            .text()
            .await
            .map_err(|e| Error::Parse(format!("unreadable results file: {e}")))?;

        let mut lines = Vec::new();
        for (number, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let raw: RawResultLine = serde_json::from_str(line).map_err(|e| {
                Error::Parse(format!("malformed result line {}: {e}", number + 1))
            })?;
            lines.push(raw);
        }
        debug!(
            file_id = %provider_output_file_id,
            lines = lines.len(),
            "results downloaded"
        );
        Ok(lines)
    }
}

/// [`ProviderFactory`] producing [`OpenAIBatchProvider`] clients. The
/// sweeper builds one client per tenant group per sweep.
#[derive(Debug, Clone, Default)]
pub struct OpenAIProviderFactory;

impl OpenAIProviderFactory {
    /// Create the factory.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ProviderFactory for OpenAIProviderFactory {
    fn build(&self, credentials: &ProviderCredentials) -> Result<Arc<dyn BatchProvider>> {
        Ok(Arc::new(OpenAIBatchProvider::new(credentials)?))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn credentials(key: &str) -> ProviderCredentials {
        ProviderCredentials {
            api_key: key.to_string(),
            base_url: None,
            extra: HashMap::new(),
        }
    }

    #[test]
    fn test_empty_api_key_rejected() {
        let err = OpenAIBatchProvider::new(&credentials("  ")).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_base_url_trailing_slash_stripped() {
        let mut creds = credentials("sk-test");
        creds.base_url = Some("http://localhost:9999/".to_string());
        let provider = OpenAIBatchProvider::new(&creds).unwrap();
        assert_eq!(provider.url("/v1/files"), "http://localhost:9999/v1/files");
    }

    #[test]
    fn test_factory_builds_client() {
        let factory = OpenAIProviderFactory::new();
        let provider = factory.build(&credentials("sk-test")).unwrap();
        assert_eq!(provider.name(), "openai");
    }

    #[test]
    fn test_batch_object_error_message_joined() {
        let batch: BatchObject = serde_json::from_str(
            r#"{"id":"b","status":"failed","errors":{"data":[
                {"message":"line 3 invalid"},{"message":"line 9 invalid"}]}}"#,
        )
        .unwrap();
        assert_eq!(
            batch.error_message().unwrap(),
            "line 3 invalid; line 9 invalid"
        );
    }

    #[test]
    fn test_batch_object_without_errors() {
        let batch: BatchObject =
            serde_json::from_str(r#"{"id":"b","status":"in_progress"}"#).unwrap();
        assert!(batch.error_message().is_none());
        assert!(batch.output_file_id.is_none());
    }
}
