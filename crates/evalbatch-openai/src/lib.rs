// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! OpenAI provider for evalbatch.
//!
//! Implements the [`evalbatch::provider::BatchProvider`] capability over
//! the OpenAI Files and Batches HTTP endpoints:
//!
//! - `POST /v1/files` (purpose `batch`) uploads the JSONL request file
//! - `POST /v1/batches` creates the batch over the uploaded file
//! - `GET /v1/batches/{id}` polls batch status
//! - `GET /v1/files/{id}/content` downloads the JSONL result file
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use evalbatch::provider::ProviderCredentials;
//! use evalbatch_openai::OpenAIBatchProvider;
//!
//! let provider = OpenAIBatchProvider::new(&ProviderCredentials {
//!     api_key: std::env::var("OPENAI_API_KEY")?,
//!     base_url: None,
//!     extra: Default::default(),
//! })?;
//! let creation = provider.create_batch(&lines, &config).await?;
//! ```

mod provider;

pub use provider::{OpenAIBatchProvider, OpenAIProviderFactory};
