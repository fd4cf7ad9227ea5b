// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Record-store capability.
//!
//! The pipeline needs exactly this much persistence: create/read/update
//! run and batch-job rows, list processing runs for sweep discovery, and a
//! conditional run update that acts as the optimistic lock between
//! concurrent sweeps. Production deployments back this with their own
//! database; [`InMemoryRecordStore`] serves tests and local runs.

use crate::error::{Error, Result};
use crate::model::{BatchJob, EvaluationRun, RunStatus};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Transactional row storage for runs and batch jobs.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new run row. Fails if the id already exists.
    async fn create_run(&self, run: &EvaluationRun) -> Result<()>;

    /// Read one run row.
    async fn get_run(&self, id: Uuid) -> Result<EvaluationRun>;

    /// Overwrite one run row.
    async fn update_run(&self, run: &EvaluationRun) -> Result<()>;

    /// Overwrite one run row only if the stored row is still in
    /// `processing`. Returns whether the write was applied. A sweep whose
    /// write is rejected discards its result; another sweep already moved
    /// the run.
    async fn update_run_if_processing(&self, run: &EvaluationRun) -> Result<bool>;

    /// All runs currently in `status`, across every tenant.
    async fn list_runs_in_status(&self, status: RunStatus) -> Result<Vec<EvaluationRun>>;

    /// Insert a new batch-job row. Fails if the id already exists.
    async fn create_batch_job(&self, job: &BatchJob) -> Result<()>;

    /// Read one batch-job row.
    async fn get_batch_job(&self, id: Uuid) -> Result<BatchJob>;

    /// Overwrite one batch-job row. Batch jobs are never deleted.
    async fn update_batch_job(&self, job: &BatchJob) -> Result<()>;
}

/// In-memory [`RecordStore`] over tokio `RwLock` maps.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    runs: RwLock<HashMap<Uuid, EvaluationRun>>,
    jobs: RwLock<HashMap<Uuid, BatchJob>>,
}

impl InMemoryRecordStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every batch-job row, in no particular order. Inspection helper for
    /// tests and local debugging; not part of [`RecordStore`].
    pub async fn all_batch_jobs(&self) -> Vec<BatchJob> {
        self.jobs.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn create_run(&self, run: &EvaluationRun) -> Result<()> {
        let mut runs = self.runs.write().await;
        if runs.contains_key(&run.id) {
            return Err(Error::Persistence(format!("run {} already exists", run.id)));
        }
        runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn get_run(&self, id: Uuid) -> Result<EvaluationRun> {
        self.runs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound { kind: "run", id })
    }

    async fn update_run(&self, run: &EvaluationRun) -> Result<()> {
        let mut runs = self.runs.write().await;
        if !runs.contains_key(&run.id) {
            return Err(Error::NotFound {
                kind: "run",
                id: run.id,
            });
        }
        runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn update_run_if_processing(&self, run: &EvaluationRun) -> Result<bool> {
        let mut runs = self.runs.write().await;
        match runs.get(&run.id) {
            None => Err(Error::NotFound {
                kind: "run",
                id: run.id,
            }),
            Some(stored) if stored.status == RunStatus::Processing => {
                runs.insert(run.id, run.clone());
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    async fn list_runs_in_status(&self, status: RunStatus) -> Result<Vec<EvaluationRun>> {
        Ok(self
            .runs
            .read()
            .await
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect())
    }

    async fn create_batch_job(&self, job: &BatchJob) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(Error::Persistence(format!(
                "batch job {} already exists",
                job.id
            )));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get_batch_job(&self, id: Uuid) -> Result<BatchJob> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound {
                kind: "batch job",
                id,
            })
    }

    async fn update_batch_job(&self, job: &BatchJob) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        if !jobs.contains_key(&job.id) {
            return Err(Error::NotFound {
                kind: "batch job",
                id: job.id,
            });
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }
}
