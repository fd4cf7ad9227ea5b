// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Run-level state machine.
//!
//! Composes the request builder, batch manager, result parser, and the two
//! scoring engines, and owns every run-status transition. Runs move
//! `pending -> processing -> {completed, failed}`; whatever goes wrong on
//! the completion path, the run ends up `failed` with a reason rather than
//! stuck in `processing`. Persistence failures are the one exception:
//! they propagate to the sweeper and the run is re-read next sweep.

use crate::batch::BatchJobManager;
use crate::dataset::DatasetSource;
use crate::error::{Error, Result};
use crate::model::{BatchJob, EvaluationRun, RunStatus};
use crate::parser::{parse_embedding_results, parse_results, ParsedResults};
use crate::request::RequestBuilder;
use crate::scoring::{embedding, wer::WerScorer};
use crate::store::RecordStore;
use crate::trace::{TraceScore, TraceSink};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Drives evaluation runs through their lifecycle.
pub struct EvaluationOrchestrator {
    store: Arc<dyn RecordStore>,
    datasets: Arc<dyn DatasetSource>,
    manager: BatchJobManager,
    trace_sink: Arc<dyn TraceSink>,
}

impl EvaluationOrchestrator {
    /// Create an orchestrator. `manager` is already bound to the tenant's
    /// provider client.
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        datasets: Arc<dyn DatasetSource>,
        manager: BatchJobManager,
        trace_sink: Arc<dyn TraceSink>,
    ) -> Self {
        Self {
            store,
            datasets,
            manager,
            trace_sink,
        }
    }

    /// Submit the run's evaluation batch.
    ///
    /// On success the run is `processing` with `batch_job_id` set. On any
    /// validation or provider failure the run is `failed` with the reason
    /// recorded; the returned run reflects the outcome either way. Only
    /// persistence failures surface as `Err`.
    pub async fn start_evaluation_batch(&self, run_id: Uuid) -> Result<EvaluationRun> {
        let mut run = self.store.get_run(run_id).await?;
        if run.status != RunStatus::Pending {
            return Err(Error::InvalidTransition {
                from: run.status.to_string(),
                to: RunStatus::Processing.to_string(),
            });
        }

        let items = match self.datasets.fetch_items(&run.dataset).await {
            Ok(items) => items,
            Err(e) => return self.fail_run(run, e.to_string()).await,
        };

        let builder = RequestBuilder::new(run.config.request.clone());
        let built = match builder.build(&items) {
            Ok(built) => built,
            // Zero usable lines: fail the run without touching the
            // provider at all.
            Err(e) => return self.fail_run(run, e.to_string()).await,
        };
        if built.skipped > 0 {
            info!(run_id = %run.id, skipped = built.skipped, "items skipped during request building");
        }

        let job_config = HashMap::from([("run_id".to_string(), json!(run.id))]);
        match self
            .manager
            .start_batch(&built.lines, "evaluation", job_config, run.tenant)
            .await
        {
            Ok(job) => {
                run.batch_job_id = Some(job.id);
                run.transition_to(RunStatus::Processing)?;
                self.store.update_run(&run).await?;
                info!(run_id = %run.id, batch_job_id = %job.id, "run processing");
                Ok(run)
            }
            Err(e) => self.fail_run(run, e.to_string()).await,
        }
    }

    /// Poll the run's active batch and, when it has reached a terminal
    /// provider status, finish the run: download, parse, score, persist.
    ///
    /// Terminal runs are a no-op returning the current status. All
    /// completion-path failures mark the run `failed` rather than leaving
    /// it `processing`; persistence failures propagate instead.
    pub async fn poll_and_process(&self, run_id: Uuid) -> Result<RunStatus> {
        let run = self.store.get_run(run_id).await?;
        if run.status != RunStatus::Processing {
            return Ok(run.status);
        }

        // The embedding batch, when present, is the active one; the main
        // batch already completed.
        let active_job_id = run.embedding_batch_job_id.or(run.batch_job_id);
        let Some(job_id) = active_job_id else {
            let run = self
                .fail_run(run, "processing run has no batch job attached".to_string())
                .await?;
            return Ok(run.status);
        };

        let job = self.store.get_batch_job(job_id).await?;
        let polled = match self.manager.poll_status(&job).await {
            Ok(polled) => polled,
            Err(e @ Error::Persistence(_)) => return Err(e),
            Err(e) => {
                let run = self.fail_run(run, e.to_string()).await?;
                return Ok(run.status);
            }
        };

        if !polled.provider_status.is_terminal() {
            return Ok(RunStatus::Processing);
        }
        if polled.provider_status.is_failure() {
            let reason = polled.error_message.clone().unwrap_or_else(|| {
                format!("provider batch ended as {}", polled.provider_status)
            });
            let run = self.fail_run(run, reason).await?;
            return Ok(run.status);
        }

        // Completed: anything that goes wrong from here on fails the run
        // instead of leaving it stuck.
        let is_embedding_phase = run.embedding_batch_job_id == Some(polled.id);
        let outcome = if is_embedding_phase {
            self.finish_embedding_phase(run.clone(), &polled).await
        } else {
            self.finish_main_phase(run.clone(), &polled).await
        };
        match outcome {
            Ok(status) => Ok(status),
            Err(e @ Error::Persistence(_)) | Err(e @ Error::NotFound { .. }) => Err(e),
            Err(e) => {
                error!(run_id = %run.id, error = %e, "completion path failed");
                let run = self.fail_run(self.store.get_run(run_id).await?, e.to_string()).await?;
                Ok(run.status)
            }
        }
    }

    /// Main-batch completion: parse and WER-score the results, then either
    /// finish the run or submit the embedding batch and stay `processing`.
    async fn finish_main_phase(
        &self,
        mut run: EvaluationRun,
        job: &BatchJob,
    ) -> Result<RunStatus> {
        let (parsed, raw_output_url) = self.download_and_parse(&run, job).await?;

        let mut score = match run.score.take() {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        let mut trace_scores = Vec::new();
        if run.config.scoring.wer {
            let scorer = WerScorer::from_config(&run.config.scoring);
            let report = scorer.score_batch(&parsed.items).await;
            for item in &report.items {
                trace_scores.push(TraceScore {
                    trace_id: item.custom_id.clone(),
                    name: "wer_strict".to_string(),
                    value: item.strict.wer,
                });
                trace_scores.push(TraceScore {
                    trace_id: item.custom_id.clone(),
                    name: "wer_lenient".to_string(),
                    value: item.lenient.wer,
                });
            }
            score.insert("wer".to_string(), serde_json::to_value(&report)?);
        }

        run.object_store_url = Some(raw_output_url);
        if run.config.scoring.embedding {
            let builder = RequestBuilder::new(run.config.request.clone());
            let built =
                builder.build_embedding_lines(&parsed.items, &run.config.scoring.embedding_model)?;
            let job_config = HashMap::from([("run_id".to_string(), json!(run.id))]);
            let embedding_job = self
                .manager
                .start_batch(&built.lines, "embedding", job_config, run.tenant)
                .await?;
            run.embedding_batch_job_id = Some(embedding_job.id);
            run.score = Some(Value::Object(score));
            if !self.store.update_run_if_processing(&run).await? {
                // Losing this write orphans the embedding batch just
                // submitted: the provider batch keeps running and its job
                // row stays without a pointer from the run. The job row is
                // the audit trail for it.
                info!(
                    run_id = %run.id,
                    orphaned_batch_job_id = %embedding_job.id,
                    "run no longer processing, discarding sweep result"
                );
                return Ok(self.store.get_run(run.id).await?.status);
            }
            self.upload_trace_scores(&trace_scores).await;
            info!(run_id = %run.id, embedding_batch_job_id = %embedding_job.id, "embedding batch submitted");
            return Ok(RunStatus::Processing);
        }

        run.score = Some(Value::Object(score));
        run.transition_to(RunStatus::Completed)?;
        if !self.store.update_run_if_processing(&run).await? {
            info!(run_id = %run.id, "run no longer processing, discarding sweep result");
            return Ok(self.store.get_run(run.id).await?.status);
        }
        self.upload_trace_scores(&trace_scores).await;
        info!(run_id = %run.id, "run completed");
        Ok(RunStatus::Completed)
    }

    /// Embedding-batch completion: pair the vectors, compute similarity,
    /// merge into the persisted score, and finish the run.
    async fn finish_embedding_phase(
        &self,
        mut run: EvaluationRun,
        job: &BatchJob,
    ) -> Result<RunStatus> {
        let raw = self.manager.download_results(job).await?;
        let parsed = parse_embedding_results(&raw)?;
        if parsed.skipped > 0 {
            warn!(run_id = %run.id, skipped = parsed.skipped, "embedding lines skipped");
        }
        let report = embedding::score_pairs(&parsed.pairs);

        let trace_scores: Vec<TraceScore> = report
            .per_item_scores
            .iter()
            .map(|s| TraceScore {
                trace_id: s.trace_id.clone(),
                name: "cosine_similarity".to_string(),
                value: f64::from(s.cosine_similarity),
            })
            .collect();

        let mut score = match run.score.take() {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        score.insert("embedding".to_string(), serde_json::to_value(&report)?);
        run.score = Some(Value::Object(score));
        run.transition_to(RunStatus::Completed)?;
        if !self.store.update_run_if_processing(&run).await? {
            info!(run_id = %run.id, "run no longer processing, discarding sweep result");
            return Ok(self.store.get_run(run.id).await?.status);
        }
        self.upload_trace_scores(&trace_scores).await;
        info!(run_id = %run.id, "run completed");
        Ok(RunStatus::Completed)
    }

    async fn download_and_parse(
        &self,
        run: &EvaluationRun,
        job: &BatchJob,
    ) -> Result<(ParsedResults, String)> {
        let raw = self.manager.download_results(job).await?;
        let raw_output_url = format!(
            "{}://files/{}",
            job.provider,
            job.provider_output_file_id.as_deref().unwrap_or_default()
        );

        // Record the pointer on the job row once the payload is in hand.
        if job.raw_output_url.is_none() {
            let mut job = job.clone();
            job.raw_output_url = Some(raw_output_url.clone());
            job.updated_at = chrono::Utc::now();
            self.store.update_batch_job(&job).await?;
        }

        let items = self.datasets.fetch_items(&run.dataset).await?;
        let items_by_id: HashMap<String, _> =
            items.into_iter().map(|i| (i.id.clone(), i)).collect();
        let parsed = parse_results(&raw, &items_by_id)?;
        if parsed.skipped > 0 {
            warn!(run_id = %run.id, skipped = parsed.skipped, "result lines skipped");
        }
        Ok((parsed, raw_output_url))
    }

    /// The single mark-failed path. Pending runs are written
    /// unconditionally; processing runs go through the conditional update
    /// so a concurrent sweep's terminal write wins.
    async fn fail_run(&self, mut run: EvaluationRun, reason: String) -> Result<EvaluationRun> {
        warn!(run_id = %run.id, reason = %reason, "marking run failed");
        let was_processing = run.status == RunStatus::Processing;
        run.error_message = Some(reason);
        run.transition_to(RunStatus::Failed)?;
        if was_processing {
            if !self.store.update_run_if_processing(&run).await? {
                return self.store.get_run(run.id).await;
            }
        } else {
            self.store.update_run(&run).await?;
        }
        Ok(run)
    }

    /// Score upload is best-effort; the run is already terminal.
    async fn upload_trace_scores(&self, scores: &[TraceScore]) {
        if scores.is_empty() {
            return;
        }
        if let Err(e) = self.trace_sink.upload_scores(scores).await {
            warn!(error = %e, count = scores.len(), "trace score upload failed");
        }
    }
}
