// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Tracing-collaborator capability.
//!
//! After a run completes, per-item scores can be attached to the external
//! observability backend, keyed by the trace id used as the batch
//! `custom_id`. Upload failures are logged and never fail the run; the run
//! is already terminal by the time scores are uploaded.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// One score attached to one trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceScore {
    /// Trace identifier (the batch `custom_id`)
    pub trace_id: String,
    /// Score name ("wer_strict", "cosine_similarity", ...)
    pub name: String,
    /// Score value
    pub value: f64,
}

/// Capability interface for the observability backend.
#[async_trait]
pub trait TraceSink: Send + Sync {
    /// Attach `scores` to their traces.
    async fn upload_scores(&self, scores: &[TraceScore]) -> Result<()>;
}

/// Sink that discards all scores. The default when no observability
/// backend is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTraceSink;

#[async_trait]
impl TraceSink for NoopTraceSink {
    async fn upload_scores(&self, _scores: &[TraceScore]) -> Result<()> {
        Ok(())
    }
}

/// Sink that records every uploaded score, for tests and local debugging.
#[derive(Debug, Default)]
pub struct RecordingTraceSink {
    scores: Mutex<Vec<TraceScore>>,
}

impl RecordingTraceSink {
    /// Create an empty recording sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All scores uploaded so far.
    pub async fn uploaded(&self) -> Vec<TraceScore> {
        self.scores.lock().await.clone()
    }
}

#[async_trait]
impl TraceSink for RecordingTraceSink {
    async fn upload_scores(&self, scores: &[TraceScore]) -> Result<()> {
        self.scores.lock().await.extend_from_slice(scores);
        Ok(())
    }
}
