// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token estimation for budget accounting.
//!
//! Uses the cl100k BPE from tiktoken, initialized once per process. If
//! the BPE tables cannot be loaded the estimator falls back to a
//! chars/4 heuristic; only budget-respecting behavior is contractual,
//! not exact counts.

use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;
use tracing::warn;

static BPE: OnceLock<Option<CoreBPE>> = OnceLock::new();

fn bpe() -> Option<&'static CoreBPE> {
    BPE.get_or_init(|| match tiktoken_rs::cl100k_base() {
        Ok(bpe) => Some(bpe),
        Err(e) => {
            warn!(error = %e, "tokenizer init failed, using chars/4 estimate");
            None
        }
    })
    .as_ref()
}

/// Estimates the token cost of a text fragment.
pub fn estimate_tokens(text: &str) -> usize {
    match bpe() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len(),
        None => text.chars().count().div_ceil(4),
    }
}

/// Estimates the total token cost of several fragments.
pub fn estimate_tokens_all<'a, I: IntoIterator<Item = &'a str>>(texts: I) -> usize {
    texts.into_iter().map(estimate_tokens).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_costs_nothing() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn estimate_grows_with_text() {
        let short = estimate_tokens("hello");
        let long = estimate_tokens("hello world, this is a longer sentence with more words");
        assert!(long > short);
        assert!(short >= 1);
    }

    #[test]
    fn estimate_all_sums_fragments() {
        let parts = ["alpha beta", "gamma delta epsilon"];
        let total: usize = parts.iter().map(|p| estimate_tokens(p)).sum();
        assert_eq!(estimate_tokens_all(parts.iter().copied()), total);
    }
}
