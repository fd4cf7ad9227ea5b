// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Configuration for runs, scoring, and sweeps.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Request configuration for one evaluation run.
///
/// A closed set of recognized fields plus a pass-through map for
/// provider-specific extensions. Validated at request-building time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Model name submitted with every request line
    pub model: String,
    /// Sampling temperature, forwarded when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// System instructions, forwarded when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// Knowledge-source ids, translated into a retrieval-tool directive
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub knowledge_source_ids: Vec<String>,
    /// Raw tool directives appended to the request body
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<serde_json::Value>,
    /// Provider `include` directives
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,
    /// Provider-specific extensions merged into the request body verbatim
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, serde_json::Value>,
}

impl RequestConfig {
    /// Create a config for `model` with everything else defaulted.
    #[must_use]
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    /// Set the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set system instructions.
    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Attach knowledge-source ids for retrieval.
    #[must_use]
    pub fn with_knowledge_sources(mut self, ids: Vec<String>) -> Self {
        self.knowledge_source_ids = ids;
        self
    }

    /// Reject configs that cannot produce valid request lines.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(Error::InvalidConfig("model must be set".to_string()));
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(Error::InvalidConfig(format!(
                    "temperature {t} outside [0.0, 2.0]"
                )));
            }
        }
        Ok(())
    }
}

/// Which scorers run for a run's results, and their tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Compute strict/lenient WER over parsed results
    pub wer: bool,
    /// Submit a second embedding batch and compute cosine similarity
    pub embedding: bool,
    /// Embedding model for the similarity batch
    pub embedding_model: String,
    /// Bound on concurrent per-item WER workers
    pub wer_concurrency: usize,
    /// Curated lenient-equivalence pairs, overriding the built-in defaults
    /// when non-empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lenient_pairs: Vec<(String, String)>,
    /// Curated semantic-error pairs, overriding the built-in defaults when
    /// non-empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub semantic_error_pairs: Vec<(String, String)>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            wer: true,
            embedding: false,
            embedding_model: "text-embedding-3-small".to_string(),
            wer_concurrency: 8,
            lenient_pairs: Vec::new(),
            semantic_error_pairs: Vec::new(),
        }
    }
}

/// Combined per-run configuration persisted on the run row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    /// Request construction settings
    pub request: RequestConfig,
    /// Scoring settings
    #[serde(default)]
    pub scoring: ScoringConfig,
}

/// Sweep-level settings shared across tenant groups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Maximum tenant groups processed concurrently
    pub max_concurrent_groups: usize,
    /// Per provider-call deadline
    #[serde(with = "duration_secs")]
    pub provider_timeout: Duration,
    /// Retry attempts for retryable provider failures at the batch-manager
    /// boundary
    pub max_retries: u32,
    /// Base backoff, doubled per attempt
    #[serde(with = "duration_secs")]
    pub retry_backoff: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            max_concurrent_groups: 4,
            provider_timeout: Duration::from_secs(60),
            max_retries: 2,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
