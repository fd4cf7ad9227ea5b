// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Word Error Rate scoring.
//!
//! Classic edit-distance alignment over reference and hypothesis tokens,
//! computed twice per item: once with exact token equality (strict) and
//! once with a broadened predicate (lenient) that accepts
//! normalization-equal tokens and curated equivalence pairs. A curated
//! semantic-error set always overrides lenient equivalence; substitutions
//! hitting it are additionally counted as semantic errors.

use crate::config::ScoringConfig;
use crate::parser::ParsedItem;
use futures::stream::{self, StreamExt};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, LazyLock};
use tracing::warn;

static ASIDE_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\[[^\]]*\]").expect("aside pattern is valid")
});

/// Punctuation stripped from tokens before alignment. Includes the
/// Devanagari danda marks alongside the Latin set.
const PUNCTUATION: &[char] = &[
    '.', ',', '!', '?', ';', ':', '"', '\'', '(', ')', '{', '}', '\u{0964}', '\u{0965}',
];

/// Token equality mode for the alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Exact token equality
    Strict,
    /// Normalization- and curated-pair-broadened equality
    Lenient,
}

/// Curated equivalence and semantic-error pair sets.
///
/// Pairs are stored symmetrically. The built-in defaults are small; the
/// pair content is a per-language curation concern and deployments supply
/// their own lists through [`ScoringConfig`].
#[derive(Debug, Clone)]
pub struct MatchRules {
    lenient: HashSet<(String, String)>,
    semantic: HashSet<(String, String)>,
}

impl MatchRules {
    /// Build rules from explicit pair lists.
    #[must_use]
    pub fn new(lenient_pairs: &[(String, String)], semantic_pairs: &[(String, String)]) -> Self {
        Self {
            lenient: symmetric_set(lenient_pairs),
            semantic: symmetric_set(semantic_pairs),
        }
    }

    /// Build rules from a scoring config, falling back to the built-in
    /// defaults for any empty list.
    #[must_use]
    pub fn from_config(config: &ScoringConfig) -> Self {
        let defaults = Self::default();
        Self {
            lenient: if config.lenient_pairs.is_empty() {
                defaults.lenient
            } else {
                symmetric_set(&config.lenient_pairs)
            },
            semantic: if config.semantic_error_pairs.is_empty() {
                defaults.semantic
            } else {
                symmetric_set(&config.semantic_error_pairs)
            },
        }
    }

    /// Whether `(a, b)` is a curated lenient-equivalence pair.
    #[must_use]
    pub fn is_lenient_pair(&self, a: &str, b: &str) -> bool {
        self.lenient.contains(&(a.to_string(), b.to_string()))
    }

    /// Whether `(a, b)` is a curated semantic-error pair.
    #[must_use]
    pub fn is_semantic_error(&self, a: &str, b: &str) -> bool {
        self.semantic.contains(&(a.to_string(), b.to_string()))
    }
}

impl Default for MatchRules {
    fn default() -> Self {
        let lenient = [
            ("\u{0939}\u{0948}\u{0902}", "\u{0939}\u{0948}"), // hain / hai
            ("okay", "ok"),
            ("colour", "color"),
        ];
        let semantic = [
            ("\u{0926}\u{093F}\u{0928}", "\u{0930}\u{093E}\u{0924}"), // din / raat
            ("yes", "no"),
            ("hot", "cold"),
        ];
        let own = |pairs: &[(&str, &str)]| {
            pairs
                .iter()
                .map(|(a, b)| ((*a).to_string(), (*b).to_string()))
                .collect::<Vec<_>>()
        };
        Self::new(&own(&lenient), &own(&semantic))
    }
}

fn symmetric_set(pairs: &[(String, String)]) -> HashSet<(String, String)> {
    let mut set = HashSet::with_capacity(pairs.len() * 2);
    for (a, b) in pairs {
        set.insert((a.clone(), b.clone()));
        set.insert((b.clone(), a.clone()));
    }
    set
}

/// Tokenize for alignment: strip bracketed asides, strip punctuation,
/// split on whitespace.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    let stripped = ASIDE_RE.replace_all(text, " ");
    stripped
        .split_whitespace()
        .map(|t| t.chars().filter(|c| !PUNCTUATION.contains(c)).collect::<String>())
        .filter(|t: &String| !t.is_empty())
        .collect()
}

/// Deterministic per-token normalization used by the lenient predicate:
/// drops nasalization and nukta marks and canonicalizes the chandra
/// vowel-sign variants.
#[must_use]
pub fn normalize_token(token: &str) -> String {
    token
        .chars()
        .filter_map(|c| match c {
            '\u{0901}' | '\u{0902}' | '\u{093C}' => None, // candrabindu, anusvara, nukta
            '\u{0945}' => Some('\u{0947}'),               // chandra e -> e sign
            '\u{0949}' => Some('\u{094B}'),               // chandra o -> o sign
            c => Some(c),
        })
        .collect()
}

/// Per-comparison outcome for one mode. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WerResult {
    /// (substitutions + deletions + insertions) / reference length;
    /// non-negative and unbounded above
    pub wer: f64,
    /// Substitution count from the backtrace
    pub substitutions: usize,
    /// Deletion count from the backtrace
    pub deletions: usize,
    /// Insertion count from the backtrace
    pub insertions: usize,
    /// Substitutions whose token pair is in the semantic-error set
    pub semantic_errors: usize,
    /// Reference token count
    pub reference_word_count: usize,
    /// Hypothesis token count
    pub hypothesis_word_count: usize,
}

/// Strict and lenient results for one item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemWer {
    /// Item or trace id
    pub custom_id: String,
    /// Exact-equality alignment
    pub strict: WerResult,
    /// Broadened-equality alignment
    pub lenient: WerResult,
    /// Optional model tag for per-model breakdowns
    pub model: Option<String>,
}

/// Per-mode summary statistics over a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WerSummaryStats {
    /// Number of items scored
    pub count: usize,
    /// Mean WER
    pub avg_wer: f64,
    /// Minimum WER
    pub min_wer: f64,
    /// Maximum WER
    pub max_wer: f64,
    /// Mean substitutions per item
    pub avg_substitutions: f64,
    /// Mean deletions per item
    pub avg_deletions: f64,
    /// Mean insertions per item
    pub avg_insertions: f64,
    /// Mean semantic errors per item
    pub avg_semantic_errors: f64,
    /// Total reference tokens across items
    pub total_reference_words: usize,
    /// Total hypothesis tokens across items
    pub total_hypothesis_words: usize,
}

/// Per-model breakdown entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelWerStats {
    /// Model tag
    pub model: String,
    /// Strict-mode summary for this model's items
    pub strict: WerSummaryStats,
    /// Lenient-mode summary for this model's items
    pub lenient: WerSummaryStats,
}

/// Batch scoring outcome: summaries plus the per-item results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WerReport {
    /// Strict-mode summary over all items
    pub strict: WerSummaryStats,
    /// Lenient-mode summary over all items
    pub lenient: WerSummaryStats,
    /// Per-model breakdowns, sorted by model name; empty when no item
    /// carries a model tag
    pub by_model: Vec<ModelWerStats>,
    /// Per-item results, in input order
    #[serde(skip)]
    pub items: Vec<ItemWer>,
}

/// WER scoring engine.
#[derive(Debug, Clone)]
pub struct WerScorer {
    rules: Arc<MatchRules>,
    concurrency: usize,
}

impl WerScorer {
    /// Create a scorer with explicit rules and worker bound.
    #[must_use]
    pub fn new(rules: MatchRules, concurrency: usize) -> Self {
        Self {
            rules: Arc::new(rules),
            concurrency: concurrency.max(1),
        }
    }

    /// Create a scorer from a run's scoring config.
    #[must_use]
    pub fn from_config(config: &ScoringConfig) -> Self {
        Self::new(MatchRules::from_config(config), config.wer_concurrency)
    }

    /// Score one reference/hypothesis pair in one mode.
    #[must_use]
    pub fn score_pair(&self, reference: &str, hypothesis: &str, mode: MatchMode) -> WerResult {
        align(
            &tokenize(reference),
            &tokenize(hypothesis),
            mode,
            &self.rules,
        )
    }

    /// Score a batch of parsed items, both modes per item, with a bounded
    /// worker pool. Per-item scoring shares no mutable state; results are
    /// collected and re-ordered by input index.
    pub async fn score_batch(&self, items: &[ParsedItem]) -> WerReport {
        let tasks = items.iter().cloned().enumerate().map(|(idx, item)| {
            let rules = Arc::clone(&self.rules);
            async move {
                let handle = tokio::task::spawn_blocking(move || {
                    let reference = tokenize(&item.ground_truth);
                    let hypothesis = tokenize(&item.generated_output);
                    ItemWer {
                        custom_id: item.custom_id,
                        strict: align(&reference, &hypothesis, MatchMode::Strict, &rules),
                        lenient: align(&reference, &hypothesis, MatchMode::Lenient, &rules),
                        model: item.model,
                    }
                });
                (idx, handle.await)
            }
        });

        let mut indexed: Vec<(usize, ItemWer)> = stream::iter(tasks)
            .buffer_unordered(self.concurrency)
            .filter_map(|(idx, joined)| async move {
                match joined {
                    Ok(item) => Some((idx, item)),
                    Err(e) => {
                        warn!(error = %e, "wer worker task failed");
                        None
                    }
                }
            })
            .collect()
            .await;
        indexed.sort_by_key(|(idx, _)| *idx);
        let scored: Vec<ItemWer> = indexed.into_iter().map(|(_, item)| item).collect();

        let strict = summarize(scored.iter().map(|i| &i.strict));
        let lenient = summarize(scored.iter().map(|i| &i.lenient));
        let by_model = summarize_by_model(&scored);
        WerReport {
            strict,
            lenient,
            by_model,
            items: scored,
        }
    }
}

fn tokens_equal(a: &str, b: &str, mode: MatchMode, rules: &MatchRules) -> bool {
    if a == b {
        return true;
    }
    match mode {
        MatchMode::Strict => false,
        MatchMode::Lenient => {
            if rules.is_semantic_error(a, b) {
                return false;
            }
            normalize_token(a) == normalize_token(b) || rules.is_lenient_pair(a, b)
        }
    }
}

/// Edit-distance DP plus backtrace over pre-tokenized sequences.
fn align(reference: &[String], hypothesis: &[String], mode: MatchMode, rules: &MatchRules) -> WerResult {
    let n = reference.len();
    let m = hypothesis.len();

    // Degenerate sequences bypass the DP entirely.
    if n == 0 && m == 0 {
        return WerResult {
            wer: 0.0,
            substitutions: 0,
            deletions: 0,
            insertions: 0,
            semantic_errors: 0,
            reference_word_count: 0,
            hypothesis_word_count: 0,
        };
    }
    if n == 0 {
        return WerResult {
            wer: 1.0,
            substitutions: 0,
            deletions: 0,
            insertions: m,
            semantic_errors: 0,
            reference_word_count: 0,
            hypothesis_word_count: m,
        };
    }
    if m == 0 {
        return WerResult {
            wer: 1.0,
            substitutions: 0,
            deletions: n,
            insertions: 0,
            semantic_errors: 0,
            reference_word_count: n,
            hypothesis_word_count: 0,
        };
    }

    let mut d = vec![vec![0usize; m + 1]; n + 1];
    for (i, row) in d.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=m {
        d[0][j] = j;
    }
    for i in 1..=n {
        for j in 1..=m {
            if tokens_equal(&reference[i - 1], &hypothesis[j - 1], mode, rules) {
                d[i][j] = d[i - 1][j - 1];
            } else {
                let substitution = d[i - 1][j - 1] + 1;
                let deletion = d[i - 1][j] + 1;
                let insertion = d[i][j - 1] + 1;
                d[i][j] = substitution.min(deletion).min(insertion);
            }
        }
    }

    // Backtrace from (n, m), preferring a diagonal match whenever the cell
    // equals its diagonal neighbor under the equality predicate.
    let mut substitutions = 0usize;
    let mut deletions = 0usize;
    let mut insertions = 0usize;
    let mut semantic_errors = 0usize;
    let (mut i, mut j) = (n, m);
    while i > 0 || j > 0 {
        if i > 0
            && j > 0
            && d[i][j] == d[i - 1][j - 1]
            && tokens_equal(&reference[i - 1], &hypothesis[j - 1], mode, rules)
        {
            i -= 1;
            j -= 1;
        } else if i > 0 && j > 0 && d[i][j] == d[i - 1][j - 1] + 1 {
            substitutions += 1;
            if rules.is_semantic_error(&reference[i - 1], &hypothesis[j - 1]) {
                semantic_errors += 1;
            }
            i -= 1;
            j -= 1;
        } else if j > 0 && d[i][j] == d[i][j - 1] + 1 {
            insertions += 1;
            j -= 1;
        } else {
            deletions += 1;
            i -= 1;
        }
    }

    let errors = substitutions + deletions + insertions;
    WerResult {
        wer: errors as f64 / n as f64,
        substitutions,
        deletions,
        insertions,
        semantic_errors,
        reference_word_count: n,
        hypothesis_word_count: m,
    }
}

fn summarize<'a>(results: impl Iterator<Item = &'a WerResult>) -> WerSummaryStats {
    let results: Vec<&WerResult> = results.collect();
    if results.is_empty() {
        return WerSummaryStats::default();
    }
    let count = results.len();
    let denom = count as f64;
    let mut stats = WerSummaryStats {
        count,
        min_wer: f64::INFINITY,
        max_wer: f64::NEG_INFINITY,
        ..WerSummaryStats::default()
    };
    for r in &results {
        stats.avg_wer += r.wer;
        stats.min_wer = stats.min_wer.min(r.wer);
        stats.max_wer = stats.max_wer.max(r.wer);
        stats.avg_substitutions += r.substitutions as f64;
        stats.avg_deletions += r.deletions as f64;
        stats.avg_insertions += r.insertions as f64;
        stats.avg_semantic_errors += r.semantic_errors as f64;
        stats.total_reference_words += r.reference_word_count;
        stats.total_hypothesis_words += r.hypothesis_word_count;
    }
    stats.avg_wer /= denom;
    stats.avg_substitutions /= denom;
    stats.avg_deletions /= denom;
    stats.avg_insertions /= denom;
    stats.avg_semantic_errors /= denom;
    stats
}

fn summarize_by_model(items: &[ItemWer]) -> Vec<ModelWerStats> {
    let mut grouped: BTreeMap<&str, Vec<&ItemWer>> = BTreeMap::new();
    for item in items {
        if let Some(model) = &item.model {
            grouped.entry(model.as_str()).or_default().push(item);
        }
    }
    grouped
        .into_iter()
        .map(|(model, items)| ModelWerStats {
            model: model.to_string(),
            strict: summarize(items.iter().map(|i| &i.strict)),
            lenient: summarize(items.iter().map(|i| &i.lenient)),
        })
        .collect()
}
