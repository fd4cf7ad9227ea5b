// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Batch job lifecycle management.
//!
//! Provider-agnostic submit / poll / download over the [`BatchProvider`]
//! capability. This is the only layer that retries provider calls:
//! bounded attempts with exponential backoff, each attempt under the
//! configured per-call deadline. A poll that exhausts its deadline reports
//! the job unchanged; the sweep picks it up again later.

use crate::config::SweepConfig;
use crate::error::{Error, Result};
use crate::model::{BatchJob, ProviderBatchStatus, TenantScope};
use crate::provider::{BatchProvider, RawResultLine, RequestLine};
use crate::store::RecordStore;
use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Drives one provider's batches through their lifecycle.
pub struct BatchJobManager {
    store: Arc<dyn RecordStore>,
    provider: Arc<dyn BatchProvider>,
    config: SweepConfig,
}

impl BatchJobManager {
    /// Create a manager over `provider`, persisting through `store`.
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        provider: Arc<dyn BatchProvider>,
        config: SweepConfig,
    ) -> Self {
        Self {
            store,
            provider,
            config,
        }
    }

    /// Upload `lines` and create a provider batch, persisting a new
    /// [`BatchJob`] row. On provider failure the row is marked failed with
    /// the error message and the error surfaces to the caller; submission
    /// is not retried beyond the bounded attempts here.
    pub async fn start_batch(
        &self,
        lines: &[RequestLine],
        job_type: &str,
        config: HashMap<String, serde_json::Value>,
        tenant: TenantScope,
    ) -> Result<BatchJob> {
        let mut job = BatchJob::new(self.provider.name(), job_type, tenant).with_config(config);
        // Persist before submitting so a crash mid-submission leaves an
        // auditable row.
        self.store.create_batch_job(&job).await?;

        let created = self
            .call_with_retry(|| self.provider.create_batch(lines, &job.config))
            .await;
        match created {
            Ok(creation) => {
                job.provider_batch_id = Some(creation.provider_batch_id);
                job.provider_file_id = Some(creation.provider_file_id);
                job.provider_status = creation.provider_status;
                job.total_items = creation.total_items;
                job.updated_at = Utc::now();
                self.store.update_batch_job(&job).await?;
                info!(
                    job_id = %job.id,
                    provider_batch_id = ?job.provider_batch_id,
                    total_items = job.total_items,
                    job_type,
                    "batch submitted"
                );
                Ok(job)
            }
            Err(e) => {
                job.provider_status = ProviderBatchStatus::Failed;
                job.error_message = Some(e.to_string());
                job.updated_at = Utc::now();
                self.store.update_batch_job(&job).await?;
                Err(e)
            }
        }
    }

    /// Query the provider for the batch's current status, writing the row
    /// only when the remote status differs from the stored one. Terminal
    /// jobs are returned as-is without a provider call; re-polling an
    /// unchanged status alters nothing.
    pub async fn poll_status(&self, job: &BatchJob) -> Result<BatchJob> {
        if job.provider_status.is_terminal() {
            return Ok(job.clone());
        }
        let Some(provider_batch_id) = job.provider_batch_id.as_deref() else {
            return Err(Error::provider(format!(
                "batch job {} was never submitted",
                job.id
            )));
        };

        let snapshot = match self
            .call_with_retry(|| self.provider.get_batch_status(provider_batch_id))
            .await
        {
            Ok(snapshot) => snapshot,
            Err(Error::ProviderTimeout { seconds }) => {
                // Still processing as far as this sweep is concerned.
                warn!(job_id = %job.id, seconds, "status poll timed out, will retry next sweep");
                return Ok(job.clone());
            }
            Err(e) => return Err(e),
        };

        if snapshot.provider_status == job.provider_status
            && snapshot.provider_output_file_id == job.provider_output_file_id
        {
            debug!(job_id = %job.id, status = %job.provider_status, "status unchanged");
            return Ok(job.clone());
        }

        let mut updated = job.clone();
        info!(
            job_id = %job.id,
            from = %job.provider_status,
            to = %snapshot.provider_status,
            "batch status changed"
        );
        updated.provider_status = snapshot.provider_status;
        if snapshot.provider_output_file_id.is_some() {
            updated.provider_output_file_id = snapshot.provider_output_file_id;
        }
        if snapshot.error_message.is_some() {
            updated.error_message = snapshot.error_message;
        }
        updated.updated_at = Utc::now();
        self.store.update_batch_job(&updated).await?;
        Ok(updated)
    }

    /// Download the raw result lines of a completed batch, verbatim.
    pub async fn download_results(&self, job: &BatchJob) -> Result<Vec<RawResultLine>> {
        let Some(output_file_id) = job.provider_output_file_id.as_deref() else {
            return Err(Error::MissingOutputFile { job_id: job.id });
        };
        self.call_with_retry(|| self.provider.download_batch_results(output_file_id))
            .await
    }

    /// Bounded retry with exponential backoff for retryable provider
    /// failures; every attempt runs under the configured deadline.
    async fn call_with_retry<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_error = Error::ProviderTimeout {
            seconds: self.config.provider_timeout.as_secs(),
        };
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff = backoff_for(self.config.retry_backoff, attempt);
                debug!(attempt, backoff_ms = backoff.as_millis() as u64, "retrying provider call");
                tokio::time::sleep(backoff).await;
            }
            match tokio::time::timeout(self.config.provider_timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) if e.is_retryable() => last_error = e,
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    last_error = Error::ProviderTimeout {
                        seconds: self.config.provider_timeout.as_secs(),
                    };
                }
            }
        }
        Err(last_error)
    }
}

fn backoff_for(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}
