// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Salience-preserving truncation for overlong fragments.
//!
//! Keeps the head and tail of a fragment and elides the middle, on the
//! observation that conversational fragments carry most of their
//! salience at the start (topic) and end (latest development). Purely
//! mechanical; no model call is made.

use parley_core::tokens::estimate_tokens;
use tracing::debug;

use crate::candidate::{ContextCandidate, Disposition};

const ELLIPSIS: &str = " [...] ";

/// Shrinks flagged candidates until each fits its token allowance.
///
/// Candidates already marked `compressed` by the optimizer are shrunk
/// into `remaining_budget`; additionally any accepted candidate larger
/// than `max_candidate_tokens` is shrunk to that cap. Returns true if
/// any candidate was altered.
pub fn compress_accepted(
    candidates: &mut [ContextCandidate],
    budget: usize,
    max_candidate_tokens: usize,
) -> bool {
    let mut applied = false;
    let mut used: usize = candidates
        .iter()
        .filter(|c| c.is_accepted())
        .map(|c| c.tokens)
        .sum();

    for candidate in candidates.iter_mut() {
        let Disposition::Accepted {
            required,
            compressed,
        } = candidate.disposition
        else {
            continue;
        };
        let headroom = budget.saturating_sub(used.saturating_sub(candidate.tokens));
        let target = if compressed {
            headroom.min(max_candidate_tokens)
        } else if candidate.tokens > max_candidate_tokens {
            max_candidate_tokens.min(headroom)
        } else {
            continue;
        };
        if candidate.tokens <= target {
            continue;
        }

        let before = candidate.tokens;
        candidate.content = truncate_to_tokens(&candidate.content, target);
        candidate.tokens = estimate_tokens(&candidate.content);
        used = used - before + candidate.tokens;
        candidate.disposition = Disposition::Accepted {
            required,
            compressed: true,
        };
        applied = true;
        debug!(
            before,
            after = candidate.tokens,
            target,
            source = %candidate.source,
            "compressed candidate"
        );
    }
    applied
}

/// Truncates `text` to at most `target` estimated tokens, keeping the
/// head and tail around an elision marker. A target of zero empties
/// the fragment.
pub fn truncate_to_tokens(text: &str, target: usize) -> String {
    if target == 0 {
        return String::new();
    }
    if estimate_tokens(text) <= target {
        return text.to_string();
    }

    let chars: Vec<char> = text.chars().collect();
    // Keep roughly two thirds head, one third tail; binary search the
    // kept share until the estimate fits.
    let mut low = 0usize;
    let mut high = chars.len();
    let mut best = String::new();
    while low < high {
        let keep = low + (high - low) / 2;
        let head: String = chars[..keep * 2 / 3].iter().collect();
        let tail: String = chars[chars.len() - keep / 3..].iter().collect();
        let rendered = if keep >= chars.len() {
            text.to_string()
        } else {
            format!("{head}{ELLIPSIS}{tail}")
        };
        if estimate_tokens(&rendered) <= target {
            best = rendered;
            low = keep + 1;
        } else {
            high = keep;
        }
    }
    best
}
