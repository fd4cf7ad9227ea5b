// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Property-based tests for the WER alignment.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::wer::{MatchMode, MatchRules, WerScorer};
use proptest::prelude::*;

fn token_seq() -> impl Strategy<Value = String> {
    proptest::collection::vec("[abcd]{1,3}", 0..8).prop_map(|tokens| tokens.join(" "))
}

fn scorer_without_semantic_pairs() -> WerScorer {
    WerScorer::new(MatchRules::new(&[], &[]), 1)
}

proptest! {
    #[test]
    fn prop_wer_is_non_negative(reference in token_seq(), hypothesis in token_seq()) {
        let scorer = WerScorer::new(MatchRules::default(), 1);
        for mode in [MatchMode::Strict, MatchMode::Lenient] {
            let r = scorer.score_pair(&reference, &hypothesis, mode);
            prop_assert!(r.wer >= 0.0);
        }
    }

    #[test]
    fn prop_identical_input_has_zero_wer(reference in token_seq()) {
        let scorer = WerScorer::new(MatchRules::default(), 1);
        let r = scorer.score_pair(&reference, &reference, MatchMode::Strict);
        prop_assert_eq!(r.wer, 0.0);
        prop_assert_eq!(r.substitutions + r.deletions + r.insertions, 0);
    }

    #[test]
    fn prop_zero_wer_implies_token_equality(
        reference in token_seq(),
        hypothesis in token_seq(),
    ) {
        let scorer = scorer_without_semantic_pairs();
        let r = scorer.score_pair(&reference, &hypothesis, MatchMode::Strict);
        if r.wer == 0.0 && r.reference_word_count > 0 {
            prop_assert_eq!(
                super::wer::tokenize(&reference),
                super::wer::tokenize(&hypothesis)
            );
        }
    }

    #[test]
    fn prop_lenient_never_exceeds_strict_without_semantic_pairs(
        reference in token_seq(),
        hypothesis in token_seq(),
    ) {
        let scorer = scorer_without_semantic_pairs();
        let strict = scorer.score_pair(&reference, &hypothesis, MatchMode::Strict);
        let lenient = scorer.score_pair(&reference, &hypothesis, MatchMode::Lenient);
        prop_assert!(lenient.wer <= strict.wer);
    }

    #[test]
    fn prop_error_counts_account_for_both_lengths(
        reference in token_seq(),
        hypothesis in token_seq(),
    ) {
        let scorer = scorer_without_semantic_pairs();
        let r = scorer.score_pair(&reference, &hypothesis, MatchMode::Strict);
        let n = r.reference_word_count;
        let m = r.hypothesis_word_count;
        // match count derived from either side must agree
        prop_assert_eq!(
            n - r.substitutions - r.deletions,
            m - r.substitutions - r.insertions
        );
    }
}
