// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Error types for the evaluation pipeline.
//!
//! The taxonomy mirrors how failures propagate through the pipeline:
//! validation errors are terminal for a run and never retried, provider
//! errors are terminal unless they represent a still-processing status,
//! parse errors are recovered per line, and persistence errors propagate
//! to the sweeper unswallowed.

use thiserror::Error;
use uuid::Uuid;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the evaluation pipeline.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    /// Every dataset item was skipped during request building. Terminal for
    /// the run; the orchestrator marks the run failed without submitting.
    #[error("no usable request lines: all {total} dataset items were empty or invalid")]
    NoUsableItems {
        /// Number of items inspected before giving up
        total: usize,
    },

    /// The dataset collaborator returned no items at all.
    #[error("dataset '{dataset}' contains no items")]
    EmptyDataset {
        /// Name or id of the dataset as referenced by the run
        dataset: String,
    },

    /// The provider returned an empty raw-results payload for a completed
    /// batch, or every line was malformed.
    #[error("batch produced no usable results")]
    EmptyResults,

    /// Results were requested before the provider assigned an output file.
    #[error("batch job {job_id} has no provider output file id")]
    MissingOutputFile {
        /// Local batch job id
        job_id: Uuid,
    },

    /// A provider call failed. `retryable` drives the manager's bounded
    /// retry loop; anything else surfaces to the orchestrator as terminal.
    #[error("provider error: {message}")]
    Provider {
        /// Provider-supplied or transport-level failure description
        message: String,
        /// Whether the batch manager may retry the call
        retryable: bool,
    },

    /// A provider call exceeded its per-call deadline. The sweep treats a
    /// timed-out poll as still-processing, not as a failure.
    #[error("provider call timed out after {seconds}s")]
    ProviderTimeout {
        /// Configured deadline that elapsed
        seconds: u64,
    },

    /// A payload could not be interpreted. Per-line parse failures are
    /// recovered locally; this surfaces only for whole-payload failures.
    #[error("parse error: {0}")]
    Parse(String),

    /// A record-store read or write failed. Fatal for the current sweep of
    /// the affected run; the run's state is re-read on the next sweep.
    #[error("record store error: {0}")]
    Persistence(String),

    /// A referenced row does not exist in the record store.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Row kind ("run" or "batch job")
        kind: &'static str,
        /// Row id
        id: Uuid,
    },

    /// A run or request configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An operation would move a run backwards through its lifecycle.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status
        from: String,
        /// Requested status
        to: String,
    },
}

impl Error {
    /// Construct a non-retryable provider error.
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
            retryable: false,
        }
    }

    /// Construct a retryable provider error (transport failures, 429/5xx).
    pub fn provider_retryable(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
            retryable: true,
        }
    }

    /// Whether the batch manager's retry loop may re-attempt the call.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Provider {
                retryable: true,
                ..
            } | Self::ProviderTimeout { .. }
        )
    }

    /// Whether this error must terminate the run when it reaches the
    /// orchestrator.
    #[must_use]
    pub fn is_terminal_for_run(&self) -> bool {
        !matches!(self, Self::ProviderTimeout { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_retryable_flag() {
        assert!(!Error::provider("bad request").is_retryable());
        assert!(Error::provider_retryable("rate limited").is_retryable());
    }

    #[test]
    fn test_timeout_is_retryable_but_not_terminal() {
        let e = Error::ProviderTimeout { seconds: 30 };
        assert!(e.is_retryable());
        assert!(!e.is_terminal_for_run());
    }

    #[test]
    fn test_validation_errors_are_terminal() {
        assert!(Error::NoUsableItems { total: 3 }.is_terminal_for_run());
        assert!(Error::EmptyResults.is_terminal_for_run());
    }

    #[test]
    fn test_display_messages() {
        let e = Error::NoUsableItems { total: 5 };
        assert!(e.to_string().contains("all 5 dataset items"));

        let e = Error::MissingOutputFile {
            job_id: Uuid::nil(),
        };
        assert!(e.to_string().contains("no provider output file"));
    }

    #[test]
    fn test_serde_json_conversion() {
        let bad: std::result::Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: Error = bad.unwrap_err().into();
        assert!(matches!(err, Error::Parse(_)));
    }
}
