// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Result parsing.
//!
//! Converts raw batch-result lines into normalized per-item tuples. The
//! parser is deliberately forgiving: a malformed line is skipped and
//! counted, a provider error object becomes an `"ERROR: ..."` output, and
//! only a wholly unusable payload fails the parse.

use crate::error::{Error, Result};
use crate::model::DatasetItem;
use crate::provider::RawResultLine;
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

/// One successfully interpreted result tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedItem {
    /// Item or trace id echoed from the request line
    pub custom_id: String,
    /// The item's input question
    pub question: String,
    /// Model output, or `"ERROR: <message>"` for failed requests
    pub generated_output: String,
    /// Expected output from the dataset
    pub ground_truth: String,
    /// Optional model tag from item metadata, for per-model breakdowns
    pub model: Option<String>,
}

/// Parse outcome: interpreted tuples plus the count of skipped lines.
#[derive(Debug, Clone)]
pub struct ParsedResults {
    /// Successfully interpreted tuples, in payload order
    pub items: Vec<ParsedItem>,
    /// Lines dropped for unknown ids or malformed payloads
    pub skipped: usize,
}

/// One item's embedding pair from the similarity batch.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingPair {
    /// Item or trace id echoed from the request line
    pub custom_id: String,
    /// Embedding of the generated output
    pub output_embedding: Vec<f32>,
    /// Embedding of the ground truth
    pub ground_truth_embedding: Vec<f32>,
}

/// Embedding parse outcome.
#[derive(Debug, Clone)]
pub struct EmbeddingResults {
    /// Interpreted pairs, in payload order
    pub pairs: Vec<EmbeddingPair>,
    /// Lines dropped for errors or malformed payloads
    pub skipped: usize,
}

/// Interpret completion-batch result lines against the run's dataset.
///
/// Fails only when `raw` is empty or nothing usable remains.
pub fn parse_results(
    raw: &[RawResultLine],
    items_by_id: &HashMap<String, DatasetItem>,
) -> Result<ParsedResults> {
    if raw.is_empty() {
        return Err(Error::EmptyResults);
    }

    let mut items = Vec::with_capacity(raw.len());
    let mut skipped = 0usize;
    for line in raw {
        let Some(item) = items_by_id.get(&line.custom_id) else {
            warn!(custom_id = %line.custom_id, "result line has no matching dataset item");
            skipped += 1;
            continue;
        };

        let generated_output = if let Some(err) = &line.error {
            format!("ERROR: {}", err.message)
        } else if let Some(output) = line
            .response
            .as_ref()
            .and_then(|r| r.body.get("output"))
        {
            extract_output(output)
        } else {
            warn!(custom_id = %line.custom_id, "result line has neither output nor error");
            skipped += 1;
            continue;
        };

        items.push(ParsedItem {
            custom_id: line.custom_id.clone(),
            question: item.question_text().unwrap_or_default().to_string(),
            generated_output,
            ground_truth: item.expected_output.clone(),
            model: item
                .metadata
                .get("model")
                .and_then(Value::as_str)
                .map(str::to_string),
        });
    }

    if items.is_empty() {
        return Err(Error::EmptyResults);
    }
    Ok(ParsedResults { items, skipped })
}

/// Interpret embedding-batch result lines into `(output, truth)` vector
/// pairs. Each line's body carries `data[0]` for the generated output and
/// `data[1]` for the ground truth, in request-input order.
pub fn parse_embedding_results(raw: &[RawResultLine]) -> Result<EmbeddingResults> {
    if raw.is_empty() {
        return Err(Error::EmptyResults);
    }

    let mut pairs = Vec::with_capacity(raw.len());
    let mut skipped = 0usize;
    for line in raw {
        if let Some(err) = &line.error {
            warn!(custom_id = %line.custom_id, error = %err.message, "embedding request failed");
            skipped += 1;
            continue;
        }
        let data = line
            .response
            .as_ref()
            .and_then(|r| r.body.get("data"))
            .and_then(Value::as_array);
        let Some(data) = data else {
            warn!(custom_id = %line.custom_id, "embedding result has no data array");
            skipped += 1;
            continue;
        };
        match (read_embedding(data.first()), read_embedding(data.get(1))) {
            (Some(output), Some(truth)) => pairs.push(EmbeddingPair {
                custom_id: line.custom_id.clone(),
                output_embedding: output,
                ground_truth_embedding: truth,
            }),
            _ => {
                warn!(custom_id = %line.custom_id, "embedding result is missing a vector");
                skipped += 1;
            }
        }
    }

    if pairs.is_empty() {
        return Err(Error::EmptyResults);
    }
    Ok(EmbeddingResults { pairs, skipped })
}

fn read_embedding(entry: Option<&Value>) -> Option<Vec<f32>> {
    let values = entry?.get("embedding")?.as_array()?;
    let mut out = Vec::with_capacity(values.len());
    for v in values {
        out.push(v.as_f64()? as f32);
    }
    Some(out)
}

/// Extract output text following the fallback chain: a string output is
/// first attempted as JSON, then as a Python-repr literal structure, and
/// finally taken as plain text; a block list yields the first
/// `output_text` content of the first message-typed block.
fn extract_output(output: &Value) -> String {
    match output {
        Value::String(s) => match parse_structured(s) {
            Some(v) => extract_output(&v),
            None => s.clone(),
        },
        Value::Array(blocks) => extract_from_blocks(blocks)
            .unwrap_or_else(|| Value::Array(blocks.clone()).to_string()),
        other => other.to_string(),
    }
}

/// Attempt to reinterpret a string output as a structured payload. Returns
/// `None` for ordinary prose so it falls through to plain text.
fn parse_structured(s: &str) -> Option<Value> {
    let trimmed = s.trim();
    if !(trimmed.starts_with('[') || trimmed.starts_with('{')) {
        return None;
    }
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return Some(v);
    }
    // Upstream services occasionally stringify payloads with Python repr
    // quoting; a quote swap recovers the common case.
    serde_json::from_str::<Value>(&trimmed.replace('\'', "\"")).ok()
}

fn extract_from_blocks(blocks: &[Value]) -> Option<String> {
    let message = blocks
        .iter()
        .find(|b| b.get("type").and_then(Value::as_str) == Some("message"))?;
    let content = message.get("content")?.as_array()?;
    content
        .iter()
        .find(|c| c.get("type").and_then(Value::as_str) == Some("output_text"))
        .and_then(|c| c.get("text"))
        .and_then(Value::as_str)
        .map(str::to_string)
}
