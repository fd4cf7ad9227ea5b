// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Sweep discovery and tenant-group processing.
//!
//! A sweep finds every `processing` run, groups them by tenant scope
//! (provider credentials are tenant-scoped), and drives each group
//! through the orchestrator with its own provider client. One group's
//! credential or client failure marks that group's runs failed and
//! touches nothing else; per-run errors are recorded and do not stop the
//! group. The sweep is invoked by an external scheduler, not a spinning
//! loop.

use crate::batch::BatchJobManager;
use crate::config::SweepConfig;
use crate::dataset::DatasetSource;
use crate::error::Result;
use crate::model::{EvaluationRun, RunStatus, TenantScope};
use crate::orchestrator::EvaluationOrchestrator;
use crate::provider::{CredentialResolver, ProviderFactory};
use crate::store::RecordStore;
use crate::trace::TraceSink;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Summary of one sweep execution, returned to the scheduler.
#[derive(Debug, Default, Clone)]
pub struct SweepOutcome {
    /// Tenant groups discovered
    pub groups: usize,
    /// Runs polled across all groups
    pub runs_polled: usize,
    /// Runs that reached `completed` during this sweep
    pub completed: usize,
    /// Runs that reached `failed` during this sweep
    pub failed: usize,
    /// Runs still `processing` after this sweep
    pub still_processing: usize,
    /// Per-run errors that could not be recorded on the run itself
    /// (persistence failures and the like); never silently swallowed
    pub errors: Vec<String>,
}

impl SweepOutcome {
    fn absorb(&mut self, other: SweepOutcome) {
        self.runs_polled += other.runs_polled;
        self.completed += other.completed;
        self.failed += other.failed;
        self.still_processing += other.still_processing;
        self.errors.extend(other.errors);
    }

    fn count(&mut self, status: RunStatus) {
        self.runs_polled += 1;
        match status {
            RunStatus::Completed => self.completed += 1,
            RunStatus::Failed => self.failed += 1,
            _ => self.still_processing += 1,
        }
    }
}

/// Discovers processing runs and drives them to completion, one tenant
/// group at a time.
pub struct Sweeper {
    store: Arc<dyn RecordStore>,
    datasets: Arc<dyn DatasetSource>,
    credentials: Arc<dyn CredentialResolver>,
    providers: Arc<dyn ProviderFactory>,
    trace_sink: Arc<dyn TraceSink>,
    config: SweepConfig,
}

impl Sweeper {
    /// Create a sweeper over the injected collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        datasets: Arc<dyn DatasetSource>,
        credentials: Arc<dyn CredentialResolver>,
        providers: Arc<dyn ProviderFactory>,
        trace_sink: Arc<dyn TraceSink>,
        config: SweepConfig,
    ) -> Self {
        Self {
            store,
            datasets,
            credentials,
            providers,
            trace_sink,
            config,
        }
    }

    /// Run one sweep over every `processing` run.
    ///
    /// Groups execute concurrently up to the configured bound; they hold
    /// independent credentials and clients. A failure to even list the
    /// runs propagates; everything below that is isolated.
    pub async fn sweep(&self) -> Result<SweepOutcome> {
        let runs = self.store.list_runs_in_status(RunStatus::Processing).await?;
        if runs.is_empty() {
            return Ok(SweepOutcome::default());
        }

        let mut groups: HashMap<TenantScope, Vec<EvaluationRun>> = HashMap::new();
        for run in runs {
            groups.entry(run.tenant).or_default().push(run);
        }
        let mut outcome = SweepOutcome {
            groups: groups.len(),
            ..SweepOutcome::default()
        };
        info!(groups = outcome.groups, "sweep starting");

        let group_outcomes: Vec<SweepOutcome> = stream::iter(
            groups
                .into_iter()
                .map(|(tenant, runs)| self.process_group(tenant, runs)),
        )
        .buffer_unordered(self.config.max_concurrent_groups.max(1))
        .collect()
        .await;

        for group in group_outcomes {
            outcome.absorb(group);
        }
        info!(
            runs = outcome.runs_polled,
            completed = outcome.completed,
            failed = outcome.failed,
            still_processing = outcome.still_processing,
            errors = outcome.errors.len(),
            "sweep finished"
        );
        Ok(outcome)
    }

    async fn process_group(
        &self,
        tenant: TenantScope,
        runs: Vec<EvaluationRun>,
    ) -> SweepOutcome {
        let mut outcome = SweepOutcome::default();

        let credentials = match self.credentials.resolve(&tenant).await {
            Ok(credentials) => credentials,
            Err(e) => {
                warn!(%tenant, error = %e, "credential resolution failed for group");
                self.fail_group(&runs, &format!("credential resolution failed: {e}"), &mut outcome)
                    .await;
                return outcome;
            }
        };
        let provider = match self.providers.build(&credentials) {
            Ok(provider) => provider,
            Err(e) => {
                warn!(%tenant, error = %e, "provider construction failed for group");
                self.fail_group(&runs, &format!("provider construction failed: {e}"), &mut outcome)
                    .await;
                return outcome;
            }
        };

        let manager = BatchJobManager::new(self.store.clone(), provider, self.config.clone());
        let orchestrator = EvaluationOrchestrator::new(
            self.store.clone(),
            self.datasets.clone(),
            manager,
            self.trace_sink.clone(),
        );

        for run in &runs {
            match orchestrator.poll_and_process(run.id).await {
                Ok(status) => outcome.count(status),
                Err(e) => {
                    // Could not record the failure on the run itself;
                    // surface it to the scheduler and keep going.
                    error!(run_id = %run.id, error = %e, "run poll failed");
                    outcome.runs_polled += 1;
                    outcome.errors.push(format!("run {}: {e}", run.id));
                }
            }
        }
        outcome
    }

    /// Mark every run of a group failed with `reason`. Uses the
    /// conditional write so a concurrently-finished run keeps its state.
    async fn fail_group(
        &self,
        runs: &[EvaluationRun],
        reason: &str,
        outcome: &mut SweepOutcome,
    ) {
        for run in runs {
            let mut failed = run.clone();
            failed.error_message = Some(reason.to_string());
            let applied = match failed.transition_to(RunStatus::Failed) {
                Ok(()) => self.store.update_run_if_processing(&failed).await,
                Err(e) => Err(e),
            };
            match applied {
                Ok(true) => outcome.count(RunStatus::Failed),
                Ok(false) => {
                    // another sweep finished this run in the meantime
                    outcome.runs_polled += 1;
                }
                Err(e) => {
                    error!(run_id = %run.id, error = %e, "failed to mark run failed");
                    outcome.runs_polled += 1;
                    outcome.errors.push(format!("run {}: {e}", run.id));
                }
            }
        }
    }
}
