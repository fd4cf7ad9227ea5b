// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Test-only shared helpers.
//!
//! A scriptable [`BatchProvider`] used by the batch-manager, orchestrator,
//! and sweeper tests. Calls succeed by default; individual calls can be
//! scripted to fail, and call counts are recorded for assertions.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::error::{Error, Result};
use crate::model::ProviderBatchStatus;
use crate::provider::{
    BatchCreation, BatchProvider, BatchStatusSnapshot, RawResultLine, RequestLine,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Outcome scripted for one provider call.
#[derive(Debug, Clone)]
pub(crate) enum ScriptedCall {
    /// Behave normally
    Succeed,
    /// Fail with a non-retryable provider error
    Fail(String),
    /// Fail with a retryable provider error
    FailRetryable(String),
    /// Sleep far past any test deadline, forcing the caller's timeout
    Stall,
}

struct Inner {
    create_script: Mutex<VecDeque<ScriptedCall>>,
    status_script: Mutex<VecDeque<ScriptedCall>>,
    status: Mutex<BatchStatusSnapshot>,
    results: Mutex<Vec<RawResultLine>>,
    create_calls: AtomicUsize,
    status_calls: AtomicUsize,
    download_calls: AtomicUsize,
    batches_created: AtomicUsize,
}

/// Scriptable in-memory provider.
#[derive(Clone)]
pub(crate) struct MockProvider {
    inner: Arc<Inner>,
}

impl MockProvider {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                create_script: Mutex::new(VecDeque::new()),
                status_script: Mutex::new(VecDeque::new()),
                status: Mutex::new(BatchStatusSnapshot {
                    provider_status: ProviderBatchStatus::InProgress,
                    provider_output_file_id: None,
                    error_message: None,
                }),
                results: Mutex::new(Vec::new()),
                create_calls: AtomicUsize::new(0),
                status_calls: AtomicUsize::new(0),
                download_calls: AtomicUsize::new(0),
                batches_created: AtomicUsize::new(0),
            }),
        }
    }

    /// Queue an outcome for the next `create_batch` call. An empty queue
    /// means success.
    pub(crate) fn script_create(&self, call: ScriptedCall) {
        self.inner.create_script.lock().unwrap().push_back(call);
    }

    /// Queue an outcome for the next `get_batch_status` call.
    pub(crate) fn script_status(&self, call: ScriptedCall) {
        self.inner.status_script.lock().unwrap().push_back(call);
    }

    /// Set the snapshot returned by successful status polls.
    pub(crate) fn set_status(
        &self,
        provider_status: ProviderBatchStatus,
        provider_output_file_id: Option<String>,
        error_message: Option<String>,
    ) {
        *self.inner.status.lock().unwrap() = BatchStatusSnapshot {
            provider_status,
            provider_output_file_id,
            error_message,
        };
    }

    /// Set the lines returned by successful downloads.
    pub(crate) fn set_results(&self, lines: Vec<RawResultLine>) {
        *self.inner.results.lock().unwrap() = lines;
    }

    pub(crate) fn create_calls(&self) -> usize {
        self.inner.create_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn status_calls(&self) -> usize {
        self.inner.status_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn download_calls(&self) -> usize {
        self.inner.download_calls.load(Ordering::SeqCst)
    }

    fn pop(script: &Mutex<VecDeque<ScriptedCall>>) -> ScriptedCall {
        script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ScriptedCall::Succeed)
    }
}

#[async_trait]
impl BatchProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn create_batch(
        &self,
        lines: &[RequestLine],
        _config: &HashMap<String, serde_json::Value>,
    ) -> Result<BatchCreation> {
        self.inner.create_calls.fetch_add(1, Ordering::SeqCst);
        match Self::pop(&self.inner.create_script) {
            ScriptedCall::Fail(msg) => Err(Error::provider(msg)),
            ScriptedCall::FailRetryable(msg) => Err(Error::provider_retryable(msg)),
            ScriptedCall::Stall => {
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                Err(Error::provider("stalled call resumed"))
            }
            ScriptedCall::Succeed => {
                let n = self.inner.batches_created.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(BatchCreation {
                    provider_batch_id: format!("batch-{n}"),
                    provider_file_id: format!("file-{n}"),
                    provider_status: ProviderBatchStatus::Validating,
                    total_items: lines.len(),
                })
            }
        }
    }

    async fn get_batch_status(&self, _provider_batch_id: &str) -> Result<BatchStatusSnapshot> {
        self.inner.status_calls.fetch_add(1, Ordering::SeqCst);
        match Self::pop(&self.inner.status_script) {
            ScriptedCall::Fail(msg) => Err(Error::provider(msg)),
            ScriptedCall::FailRetryable(msg) => Err(Error::provider_retryable(msg)),
            ScriptedCall::Stall => {
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                Err(Error::provider("stalled call resumed"))
            }
            ScriptedCall::Succeed => Ok(self.inner.status.lock().unwrap().clone()),
        }
    }

    async fn download_batch_results(
        &self,
        _provider_output_file_id: &str,
    ) -> Result<Vec<RawResultLine>> {
        self.inner.download_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.inner.results.lock().unwrap().clone())
    }
}
