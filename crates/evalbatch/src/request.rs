// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Request building.
//!
//! Turns dataset items plus a run configuration into provider-native
//! request lines. Items without a usable question are skipped and counted,
//! never fatal on their own; the builder fails only when zero usable lines
//! remain.

use crate::config::RequestConfig;
use crate::error::{Error, Result};
use crate::model::DatasetItem;
use crate::parser::ParsedItem;
use crate::provider::RequestLine;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::debug;

/// Endpoint path for model-completion request lines.
pub const RESPONSES_URL: &str = "/v1/responses";
/// Endpoint path for embedding request lines.
pub const EMBEDDINGS_URL: &str = "/v1/embeddings";

/// Request lines plus the count of items skipped while building them.
#[derive(Debug, Clone)]
pub struct BuiltRequests {
    /// One line per usable dataset item, in input order
    pub lines: Vec<RequestLine>,
    /// Items dropped for an empty or missing question
    pub skipped: usize,
}

/// Builds provider-native request lines for one run.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    config: RequestConfig,
    trace_ids: HashMap<String, String>,
}

impl RequestBuilder {
    /// Create a builder for `config`.
    #[must_use]
    pub fn new(config: RequestConfig) -> Self {
        Self {
            config,
            trace_ids: HashMap::new(),
        }
    }

    /// Tag request lines with caller-supplied trace ids instead of item
    /// ids. Items absent from the map keep their own id.
    #[must_use]
    pub fn with_trace_ids(mut self, trace_ids: HashMap<String, String>) -> Self {
        self.trace_ids = trace_ids;
        self
    }

    /// Build one completion request line per usable item.
    ///
    /// Returns [`Error::NoUsableItems`] when every item was skipped.
    pub fn build(&self, items: &[DatasetItem]) -> Result<BuiltRequests> {
        self.config.validate()?;

        let mut lines = Vec::with_capacity(items.len());
        let mut skipped = 0usize;
        for item in items {
            let Some(question) = item.question_text() else {
                debug!(item_id = %item.id, "skipping item with empty question");
                skipped += 1;
                continue;
            };
            lines.push(RequestLine {
                custom_id: self.custom_id_for(&item.id),
                method: "POST".to_string(),
                url: RESPONSES_URL.to_string(),
                body: self.completion_body(question),
            });
        }

        if lines.is_empty() {
            return Err(Error::NoUsableItems {
                total: items.len(),
            });
        }
        Ok(BuiltRequests { lines, skipped })
    }

    /// Build one embedding request line per parsed item, pairing generated
    /// output and ground truth as a two-element input so one result line
    /// yields both vectors.
    pub fn build_embedding_lines(
        &self,
        items: &[ParsedItem],
        embedding_model: &str,
    ) -> Result<BuiltRequests> {
        if embedding_model.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "embedding model must be set".to_string(),
            ));
        }
        let lines: Vec<RequestLine> = items
            .iter()
            .map(|item| RequestLine {
                custom_id: item.custom_id.clone(),
                method: "POST".to_string(),
                url: EMBEDDINGS_URL.to_string(),
                body: json!({
                    "model": embedding_model,
                    "input": [item.generated_output, item.ground_truth],
                }),
            })
            .collect();
        if lines.is_empty() {
            return Err(Error::NoUsableItems { total: 0 });
        }
        Ok(BuiltRequests { lines, skipped: 0 })
    }

    fn custom_id_for(&self, item_id: &str) -> String {
        self.trace_ids
            .get(item_id)
            .cloned()
            .unwrap_or_else(|| item_id.to_string())
    }

    fn completion_body(&self, question: &str) -> Value {
        let mut body = Map::new();
        body.insert("model".to_string(), json!(self.config.model));
        body.insert("input".to_string(), json!(question));
        if let Some(t) = self.config.temperature {
            body.insert("temperature".to_string(), json!(t));
        }
        if let Some(instructions) = &self.config.instructions {
            body.insert("instructions".to_string(), json!(instructions));
        }

        let mut tools = self.config.tools.clone();
        if !self.config.knowledge_source_ids.is_empty() {
            tools.push(json!({
                "type": "file_search",
                "vector_store_ids": self.config.knowledge_source_ids,
            }));
        }
        if !tools.is_empty() {
            body.insert("tools".to_string(), Value::Array(tools));
        }
        if !self.config.include.is_empty() {
            body.insert("include".to_string(), json!(self.config.include));
        }
        // Provider-specific extensions go in last so deployments can
        // override recognized fields when a vendor requires it.
        for (k, v) in &self.config.extra {
            body.insert(k.clone(), v.clone());
        }
        Value::Object(body)
    }
}
