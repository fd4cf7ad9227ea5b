// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Asynchronous batch evaluation of AI-generated answers.
//!
//! This crate runs evaluation datasets through an LLM vendor's batch API
//! and scores the generated answers against ground truth. Submission and
//! scoring are decoupled: a run is submitted once, then a periodic sweep
//! polls the vendor until the batch lands and scoring can happen.
//!
//! # Pipeline
//!
//! - [`EvaluationOrchestrator`] drives one run through its state machine
//!   (`pending` → `processing` → `completed`/`failed`)
//! - [`Sweeper`] discovers in-flight runs, groups them by tenant, and
//!   polls each group with its own vendor client
//! - [`RequestBuilder`] turns dataset items into provider request lines
//! - [`parser`] extracts generated answers from raw batch results
//! - [`scoring::wer`] computes word-error-rate with strict and lenient
//!   matching; [`scoring::embedding`] computes cosine similarity over
//!   embedding pairs
//!
//! Vendor access, persistence, datasets, and trace reporting are all
//! capability traits ([`BatchProvider`], [`RecordStore`],
//! [`DatasetSource`], [`TraceSink`]); the `evalbatch-openai` crate
//! provides the OpenAI [`BatchProvider`].
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use evalbatch::{
//!     EvaluationOrchestrator, EvaluationRun, InMemoryRecordStore,
//!     RequestConfig, RunConfig, Sweeper,
//! };
//!
//! // Submit a run, then let a scheduled sweep carry it to completion.
//! let run = EvaluationRun::new("nightly-asr", "asr-hindi-v2", config, tenant);
//! store.create_run(&run).await?;
//! orchestrator.start_evaluation_batch(run.id).await?;
//!
//! // From the scheduler:
//! let outcome = sweeper.sweep().await?;
//! tracing::info!(completed = outcome.completed, "sweep done");
//! ```

pub mod batch;
pub mod config;
pub mod dataset;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod parser;
pub mod provider;
pub mod request;
pub mod scoring;
pub mod store;
pub mod sweeper;
pub mod trace;

#[cfg(test)]
mod test_support;

pub use batch::BatchJobManager;
pub use config::{RequestConfig, RunConfig, ScoringConfig, SweepConfig};
pub use dataset::{DatasetSource, InMemoryDatasetSource};
pub use error::{Error, Result};
pub use model::{
    BatchJob, DatasetItem, EvaluationRun, ProviderBatchStatus, RunStatus, TenantScope,
};
pub use orchestrator::EvaluationOrchestrator;
pub use parser::{ParsedItem, ParsedResults};
pub use provider::{
    BatchCreation, BatchProvider, BatchStatusSnapshot, CredentialResolver, ProviderCredentials,
    ProviderFactory, RawResultLine, RequestLine,
};
pub use request::RequestBuilder;
pub use scoring::embedding::{cosine_similarity, EmbeddingReport};
pub use scoring::wer::{MatchMode, MatchRules, WerReport, WerResult, WerScorer};
pub use store::{InMemoryRecordStore, RecordStore};
pub use sweeper::{SweepOutcome, Sweeper};
pub use trace::{NoopTraceSink, TraceScore, TraceSink};
