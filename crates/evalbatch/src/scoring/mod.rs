// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Scoring engines: string-alignment WER and embedding cosine similarity.

pub mod embedding;
pub mod wer;

#[cfg(test)]
mod wer_proptest;
