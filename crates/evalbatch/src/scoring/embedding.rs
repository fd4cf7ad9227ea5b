// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Embedding similarity scoring.
//!
//! Cosine similarity between the embedding of each item's generated
//! output and the embedding of its ground truth, aggregated into a mean
//! and population standard deviation. Zero-norm vectors score exactly 0.0
//! so aggregation stays well-defined.

use crate::parser::EmbeddingPair;
use serde::{Deserialize, Serialize};

/// Cosine similarity in `[-1.0, 1.0]`, or 0.0 for zero-norm or
/// unequal-length inputs.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot_product / (norm_a * norm_b)).clamp(-1.0, 1.0)
    }
}

/// One item's similarity, keyed by the trace id used as `custom_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSimilarity {
    /// Item or trace id
    pub trace_id: String,
    /// Cosine similarity of the item's output/truth embeddings
    pub cosine_similarity: f32,
}

/// Aggregate similarity outcome for a batch of pairs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingReport {
    /// Arithmetic mean of similarities
    pub cosine_similarity_avg: f64,
    /// Population standard deviation of similarities
    pub cosine_similarity_std: f64,
    /// Per-item similarities, in input order
    pub per_item_scores: Vec<ItemSimilarity>,
}

/// Score a batch of embedding pairs. Empty input yields a zeroed report,
/// never an error.
#[must_use]
pub fn score_pairs(pairs: &[EmbeddingPair]) -> EmbeddingReport {
    let per_item_scores: Vec<ItemSimilarity> = pairs
        .iter()
        .map(|p| ItemSimilarity {
            trace_id: p.custom_id.clone(),
            cosine_similarity: cosine_similarity(&p.output_embedding, &p.ground_truth_embedding),
        })
        .collect();

    if per_item_scores.is_empty() {
        return EmbeddingReport::default();
    }

    let n = per_item_scores.len() as f64;
    let mean = per_item_scores
        .iter()
        .map(|s| f64::from(s.cosine_similarity))
        .sum::<f64>()
        / n;
    let variance = per_item_scores
        .iter()
        .map(|s| {
            let d = f64::from(s.cosine_similarity) - mean;
            d * d
        })
        .sum::<f64>()
        / n;

    EmbeddingReport {
        cosine_similarity_avg: mean,
        cosine_similarity_std: variance.sqrt(),
        per_item_scores,
    }
}
