// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Greedy budget-constrained candidate selection.
//!
//! Required-source candidates are seated first regardless of score;
//! everything else is accepted in descending composite-score order
//! until the budget runs out. Every decision is recorded on the
//! candidate for observability.

use tracing::debug;

use crate::candidate::{rank, ContextCandidate, ContextSource, Disposition, ExclusionReason};

/// Selection result: every candidate, each carrying its disposition.
#[derive(Debug)]
pub struct Selection {
    /// All candidates in processing order (accepted and excluded).
    pub candidates: Vec<ContextCandidate>,
    /// Token cost of the accepted set, before compression.
    pub accepted_tokens: usize,
    /// Fraction of total candidate score mass that was accepted.
    pub retained_score_share: f64,
}

/// Below this many tokens a compressed fragment degenerates into
/// little more than its elision marker.
const MIN_COMPRESSED_TOKENS: usize = 8;

/// Selects candidates under `budget` tokens.
///
/// Candidates from `required_sources` are accepted even when the
/// budget cannot fit them whole; such a candidate is flagged for
/// compression rather than dropped, unless the remaining headroom is
/// too small to hold a legible fragment. Non-required candidates that
/// do not fit are excluded with reason `budget`.
pub fn optimize(
    mut candidates: Vec<ContextCandidate>,
    budget: usize,
    required_sources: &[ContextSource],
) -> Selection {
    // Required-source candidates first (best score among them first),
    // then the rest by composite score.
    candidates.sort_by(|a, b| {
        let a_required = required_sources.contains(&a.source);
        let b_required = required_sources.contains(&b.source);
        b_required.cmp(&a_required).then_with(|| rank(a, b))
    });

    let total_score: f64 = candidates.iter().map(ContextCandidate::score).sum();
    let mut retained_score = 0.0;
    let mut remaining = budget;
    let mut accepted_tokens = 0;

    for candidate in &mut candidates {
        let required = required_sources.contains(&candidate.source);
        if candidate.tokens <= remaining {
            remaining -= candidate.tokens;
            accepted_tokens += candidate.tokens;
            retained_score += candidate.score();
            candidate.disposition = Disposition::Accepted {
                required,
                compressed: false,
            };
        } else if required && remaining >= MIN_COMPRESSED_TOKENS {
            // Not dropped; the compressor shrinks it into whatever
            // budget is left.
            let fitted = remaining;
            accepted_tokens += fitted;
            retained_score += if candidate.tokens > 0 {
                candidate.score() * fitted as f64 / candidate.tokens as f64
            } else {
                candidate.score()
            };
            remaining = 0;
            candidate.disposition = Disposition::Accepted {
                required,
                compressed: true,
            };
        } else {
            candidate.disposition = Disposition::Excluded {
                reason: ExclusionReason::Budget,
            };
        }
    }

    let retained_score_share = if total_score > 0.0 {
        retained_score / total_score
    } else {
        1.0
    };
    debug!(
        accepted_tokens,
        budget, retained_score_share, "optimizer pass complete"
    );

    Selection {
        candidates,
        accepted_tokens,
        retained_score_share,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(relevance: f64, content: &str) -> ContextCandidate {
        let mut c = ContextCandidate::new(
            ContextSource::Episodic,
            content.to_string(),
            relevance,
            0.5,
            None,
        );
        // Pin the token cost so assertions do not depend on tokenizer
        // details.
        c.tokens = 200;
        c
    }

    #[test]
    fn fifty_uniform_candidates_into_a_thousand_token_budget() {
        let candidates: Vec<ContextCandidate> = (0..50)
            .map(|i| candidate(1.0 - i as f64 / 100.0, &format!("fragment {i}")))
            .collect();

        let selection = optimize(candidates, 1_000, &[]);

        let accepted: Vec<&ContextCandidate> = selection
            .candidates
            .iter()
            .filter(|c| c.is_accepted())
            .collect();
        assert_eq!(accepted.len(), 5);
        assert_eq!(selection.accepted_tokens, 1_000);

        // Highest composite scores are first.
        assert!(accepted[0].relevance > accepted[4].relevance);
        assert!(selection.retained_score_share < 1.0);

        // Everything else is excluded for budget, including the five
        // worst candidates.
        let excluded: Vec<&ContextCandidate> = selection
            .candidates
            .iter()
            .filter(|c| !c.is_accepted())
            .collect();
        assert_eq!(excluded.len(), 45);
        for c in &excluded {
            assert_eq!(
                c.disposition,
                Disposition::Excluded {
                    reason: ExclusionReason::Budget
                }
            );
        }
        let worst_scores: Vec<f64> = excluded.iter().map(|c| c.score()).collect();
        let best_excluded = worst_scores.iter().cloned().fold(f64::MIN, f64::max);
        let worst_accepted = accepted.iter().map(|c| c.score()).fold(f64::MAX, f64::min);
        assert!(worst_accepted > best_excluded);
    }

    #[test]
    fn required_source_beats_higher_scored_candidates() {
        let mut low = ContextCandidate::new(
            ContextSource::External,
            "required but weak".into(),
            0.1,
            0.1,
            None,
        );
        low.tokens = 80;
        let mut high = ContextCandidate::new(
            ContextSource::History,
            "strong but optional".into(),
            1.0,
            1.0,
            None,
        );
        high.tokens = 80;

        let selection = optimize(vec![high, low], 100, &[ContextSource::External]);
        let accepted: Vec<&ContextCandidate> = selection
            .candidates
            .iter()
            .filter(|c| c.is_accepted())
            .collect();
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].source, ContextSource::External);
        assert_eq!(
            accepted[0].disposition,
            Disposition::Accepted {
                required: true,
                compressed: false
            }
        );
    }

    #[test]
    fn oversized_required_candidate_is_compressed_not_dropped() {
        let mut huge = ContextCandidate::new(
            ContextSource::History,
            "enormous required fragment".into(),
            0.9,
            0.9,
            None,
        );
        huge.tokens = 5_000;

        let selection = optimize(vec![huge], 1_000, &[ContextSource::History]);
        assert_eq!(
            selection.candidates[0].disposition,
            Disposition::Accepted {
                required: true,
                compressed: true
            }
        );
        assert_eq!(selection.accepted_tokens, 1_000);
    }

    #[test]
    fn second_required_candidate_without_headroom_is_excluded() {
        // Two oversized required fragments against one budget: the
        // first consumes every remaining token, so the second would be
        // squeezed to nothing. It must be excluded, never rendered as
        // an empty snippet.
        let mut first = ContextCandidate::new(
            ContextSource::History,
            "first required".into(),
            0.9,
            0.9,
            None,
        );
        first.tokens = 5_000;
        let mut second = ContextCandidate::new(
            ContextSource::History,
            "second required".into(),
            0.8,
            0.8,
            None,
        );
        second.tokens = 5_000;

        let selection = optimize(vec![first, second], 1_000, &[ContextSource::History]);
        assert_eq!(
            selection.candidates[0].disposition,
            Disposition::Accepted {
                required: true,
                compressed: true
            }
        );
        assert_eq!(
            selection.candidates[1].disposition,
            Disposition::Excluded {
                reason: ExclusionReason::Budget
            }
        );
        assert_eq!(selection.accepted_tokens, 1_000);
    }

    #[test]
    fn required_candidate_is_excluded_when_headroom_is_sub_minimal() {
        let mut big = ContextCandidate::new(
            ContextSource::History,
            "strong required".into(),
            1.0,
            1.0,
            None,
        );
        big.tokens = 995;
        let mut squeezed = ContextCandidate::new(
            ContextSource::External,
            "required but squeezed".into(),
            0.1,
            0.1,
            None,
        );
        squeezed.tokens = 200;

        // 5 tokens of headroom cannot hold a legible fragment.
        let selection = optimize(
            vec![big, squeezed],
            1_000,
            &[ContextSource::History, ContextSource::External],
        );
        let squeezed = selection
            .candidates
            .iter()
            .find(|c| c.source == ContextSource::External)
            .unwrap();
        assert_eq!(
            squeezed.disposition,
            Disposition::Excluded {
                reason: ExclusionReason::Budget
            }
        );
    }

    #[test]
    fn empty_candidate_set_retains_full_score_share() {
        let selection = optimize(Vec::new(), 1_000, &[]);
        assert!(selection.candidates.is_empty());
        assert_eq!(selection.retained_score_share, 1.0);
    }

    #[test]
    fn smaller_candidate_fills_leftover_budget() {
        let mut big = candidate(1.0, "big");
        big.tokens = 180;
        let mut small = candidate(0.5, "small");
        small.tokens = 20;
        let mut medium = candidate(0.8, "medium");
        medium.tokens = 100;

        // Budget 200: big (180) accepted, medium (100) does not fit,
        // small (20) does.
        let selection = optimize(vec![big, small, medium], 200, &[]);
        let accepted: Vec<String> = selection
            .candidates
            .iter()
            .filter(|c| c.is_accepted())
            .map(|c| c.content.clone())
            .collect();
        assert_eq!(accepted, vec!["big".to_string(), "small".to_string()]);
    }
}
