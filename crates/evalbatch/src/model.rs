// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Data model for the evaluation pipeline.
//!
//! Two records drive the pipeline: [`EvaluationRun`] (one user-requested
//! evaluation over a dataset) and [`BatchJob`] (one provider-side batch
//! submission). Runs move `pending -> processing -> {completed, failed}`
//! and never backwards; batch jobs record provider-native status and are
//! kept forever as an audit trail.

use crate::config::RunConfig;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Tenant scope for a run or batch job. Provider credentials are resolved
/// per scope, so the sweeper groups work by this key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantScope {
    /// Owning organization
    pub organization_id: Uuid,
    /// Owning project within the organization
    pub project_id: Uuid,
}

impl fmt::Display for TenantScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.organization_id, self.project_id)
    }
}

/// Lifecycle status of an [`EvaluationRun`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created, not yet submitted to a provider
    Pending,
    /// A batch is in flight; completion is discovered by later sweeps
    Processing,
    /// Scoring finished and the score is persisted (terminal)
    Completed,
    /// A fatal error was recorded (terminal)
    Failed,
}

impl RunStatus {
    /// Terminal states never transition again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `self -> next` is a legal forward move.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Pending, Self::Processing | Self::Failed) => true,
            (Self::Processing, Self::Completed | Self::Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Provider-native batch status, normalized across vendors.
///
/// The sequence only moves forward and ends in exactly one of the four
/// terminal variants. Unrecognized provider strings are preserved in
/// [`ProviderBatchStatus::Other`] and treated as non-terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderBatchStatus {
    /// Input file accepted, batch being validated
    Validating,
    /// Requests are executing
    InProgress,
    /// Provider is assembling the output file
    Finalizing,
    /// Output file is ready (terminal)
    Completed,
    /// The batch failed (terminal)
    Failed,
    /// The provider's completion window elapsed (terminal)
    Expired,
    /// Cancellation requested but not yet effective
    Cancelling,
    /// The batch was cancelled (terminal)
    Cancelled,
    /// Provider-specific status with no normalized equivalent
    #[serde(untagged)]
    Other(String),
}

impl ProviderBatchStatus {
    /// Terminal provider statuses; once reached the stored status is
    /// immutable.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Expired | Self::Cancelled
        )
    }

    /// Terminal statuses that fail the owning run.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Expired | Self::Cancelled)
    }

    /// Parse a provider-native status string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "validating" => Self::Validating,
            "in_progress" => Self::InProgress,
            "finalizing" => Self::Finalizing,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "expired" => Self::Expired,
            "cancelling" => Self::Cancelling,
            "cancelled" => Self::Cancelled,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ProviderBatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validating => "validating",
            Self::InProgress => "in_progress",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Expired => "expired",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
            Self::Other(s) => s,
        };
        f.write_str(s)
    }
}

/// One provider-side batch submission. Created when a run starts, updated
/// only by the batch manager's poll path, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJob {
    /// Local id
    pub id: Uuid,
    /// Provider name ("openai", ...)
    pub provider: String,
    /// Free-form tag distinguishing batch purposes ("evaluation",
    /// "embedding")
    pub job_type: String,
    /// Opaque key/value map forwarded to the provider at creation
    pub config: HashMap<String, serde_json::Value>,
    /// Provider-assigned batch id
    pub provider_batch_id: Option<String>,
    /// Provider-assigned input file id
    pub provider_file_id: Option<String>,
    /// Provider-assigned output file id, set once the batch completes
    pub provider_output_file_id: Option<String>,
    /// Last observed provider status
    pub provider_status: ProviderBatchStatus,
    /// Object-store pointer to the downloaded raw output, if any
    pub raw_output_url: Option<String>,
    /// Number of request lines submitted
    pub total_items: usize,
    /// Provider or pipeline failure description
    pub error_message: Option<String>,
    /// Owning tenant
    pub tenant: TenantScope,
    /// Row creation time
    pub inserted_at: DateTime<Utc>,
    /// Last write time
    pub updated_at: DateTime<Utc>,
}

impl BatchJob {
    /// Create a new job row in `validating` state for `tenant`.
    #[must_use]
    pub fn new(provider: impl Into<String>, job_type: impl Into<String>, tenant: TenantScope) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            provider: provider.into(),
            job_type: job_type.into(),
            config: HashMap::new(),
            provider_batch_id: None,
            provider_file_id: None,
            provider_output_file_id: None,
            provider_status: ProviderBatchStatus::Validating,
            raw_output_url: None,
            total_items: 0,
            error_message: None,
            tenant,
            inserted_at: now,
            updated_at: now,
        }
    }

    /// Attach provider creation config.
    #[must_use]
    pub fn with_config(mut self, config: HashMap<String, serde_json::Value>) -> Self {
        self.config = config;
        self
    }
}

/// One user-requested evaluation execution over a dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRun {
    /// Local id
    pub id: Uuid,
    /// Human-readable run name
    pub run_name: String,
    /// Dataset reference (name or id understood by the dataset
    /// collaborator)
    pub dataset: String,
    /// Request and scoring configuration for this run
    pub config: RunConfig,
    /// Lifecycle status
    pub status: RunStatus,
    /// Main evaluation batch, set atomically with `status = processing`
    pub batch_job_id: Option<Uuid>,
    /// Second batch for embedding similarity scoring, if configured
    pub embedding_batch_job_id: Option<Uuid>,
    /// Computed score document, persisted by the orchestrator
    pub score: Option<serde_json::Value>,
    /// Object-store pointer to raw batch output
    pub object_store_url: Option<String>,
    /// Failure description for `failed` runs
    pub error_message: Option<String>,
    /// Owning tenant
    pub tenant: TenantScope,
    /// Row creation time
    pub inserted_at: DateTime<Utc>,
    /// Last write time
    pub updated_at: DateTime<Utc>,
}

impl EvaluationRun {
    /// Create a new `pending` run.
    #[must_use]
    pub fn new(
        run_name: impl Into<String>,
        dataset: impl Into<String>,
        config: RunConfig,
        tenant: TenantScope,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            run_name: run_name.into(),
            dataset: dataset.into(),
            config,
            status: RunStatus::Pending,
            batch_job_id: None,
            embedding_batch_job_id: None,
            score: None,
            object_store_url: None,
            error_message: None,
            tenant,
            inserted_at: now,
            updated_at: now,
        }
    }

    /// Move the run forward, rejecting backward or terminal-escaping moves.
    pub fn transition_to(&mut self, next: RunStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// One evaluation example, immutable once fetched for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetItem {
    /// Item id, used as the batch `custom_id`
    pub id: String,
    /// Input question; items with a missing or blank question are skipped
    /// at request-building time
    pub question: Option<String>,
    /// Expected output (ground truth)
    pub expected_output: String,
    /// Arbitrary metadata; a "model" key enables per-model WER breakdowns
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl DatasetItem {
    /// Create an item with just id, question, and ground truth.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        question: impl Into<String>,
        expected_output: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            question: Some(question.into()),
            expected_output: expected_output.into(),
            metadata: HashMap::new(),
        }
    }

    /// The item's usable question text, if present and non-blank.
    #[must_use]
    pub fn question_text(&self) -> Option<&str> {
        self.question
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn tenant() -> TenantScope {
        TenantScope {
            organization_id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_run_status_transitions_forward_only() {
        assert!(RunStatus::Pending.can_transition_to(RunStatus::Processing));
        assert!(RunStatus::Pending.can_transition_to(RunStatus::Failed));
        assert!(RunStatus::Processing.can_transition_to(RunStatus::Completed));
        assert!(RunStatus::Processing.can_transition_to(RunStatus::Failed));

        assert!(!RunStatus::Processing.can_transition_to(RunStatus::Pending));
        assert!(!RunStatus::Completed.can_transition_to(RunStatus::Processing));
        assert!(!RunStatus::Failed.can_transition_to(RunStatus::Processing));
        assert!(!RunStatus::Failed.can_transition_to(RunStatus::Completed));
    }

    #[test]
    fn test_run_transition_rejects_backward_move() {
        let mut run = EvaluationRun::new("r", "ds", RunConfig::default(), tenant());
        run.transition_to(RunStatus::Processing).unwrap();
        run.transition_to(RunStatus::Failed).unwrap();

        let err = run.transition_to(RunStatus::Processing).unwrap_err();
        assert!(err.to_string().contains("failed -> processing"));
    }

    #[test]
    fn test_pending_cannot_complete_directly() {
        let mut run = EvaluationRun::new("r", "ds", RunConfig::default(), tenant());
        assert!(run.transition_to(RunStatus::Completed).is_err());
        assert_eq!(run.status, RunStatus::Pending);
    }

    #[test]
    fn test_provider_status_terminal_set() {
        for s in ["completed", "failed", "expired", "cancelled"] {
            assert!(ProviderBatchStatus::parse(s).is_terminal(), "{s}");
        }
        for s in ["validating", "in_progress", "finalizing", "cancelling"] {
            assert!(!ProviderBatchStatus::parse(s).is_terminal(), "{s}");
        }
    }

    #[test]
    fn test_provider_status_failure_set_excludes_completed() {
        assert!(!ProviderBatchStatus::Completed.is_failure());
        assert!(ProviderBatchStatus::Failed.is_failure());
        assert!(ProviderBatchStatus::Expired.is_failure());
        assert!(ProviderBatchStatus::Cancelled.is_failure());
    }

    #[test]
    fn test_provider_status_unknown_string_is_non_terminal() {
        let s = ProviderBatchStatus::parse("queued");
        assert_eq!(s, ProviderBatchStatus::Other("queued".to_string()));
        assert!(!s.is_terminal());
        assert_eq!(s.to_string(), "queued");
    }

    #[test]
    fn test_question_text_blank_is_missing() {
        let mut item = DatasetItem::new("1", "  ", "truth");
        assert_eq!(item.question_text(), None);
        item.question = None;
        assert_eq!(item.question_text(), None);
        item.question = Some("what?".to_string());
        assert_eq!(item.question_text(), Some("what?"));
    }

    #[test]
    fn test_batch_job_starts_validating() {
        let job = BatchJob::new("openai", "evaluation", tenant());
        assert_eq!(job.provider_status, ProviderBatchStatus::Validating);
        assert!(job.provider_batch_id.is_none());
        assert!(job.error_message.is_none());
    }
}
