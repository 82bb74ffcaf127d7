// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Final context window assembly.
//!
//! Groups accepted fragments by source in priority order, keeps
//! conversation history oldest to newest, and computes the window's
//! totals and quality score.

use serde::{Deserialize, Serialize};

use crate::candidate::{ContextCandidate, ContextSource, Disposition};
use crate::optimizer::Selection;

/// One rendered fragment of the final context window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextFragment {
    pub source: ContextSource,
    pub text: String,
    pub tokens: usize,
}

/// Per-candidate decision record, kept for `processing_details`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionRecord {
    pub source: ContextSource,
    pub tokens: usize,
    pub score: f64,
    pub disposition: Disposition,
}

/// The context engine's output: an ordered, budget-respecting window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizedContext {
    /// Fragments in final order: history oldest to newest, then
    /// episodic, semantic, and external groups.
    pub fragments: Vec<ContextFragment>,
    pub total_tokens: usize,
    /// Sources that contributed at least one fragment.
    pub sources_used: Vec<ContextSource>,
    /// Fraction of candidate score mass retained, in [0, 1].
    pub quality_score: f64,
    pub compression_applied: bool,
    /// Sources that timed out or failed during retrieval.
    pub degraded_sources: Vec<ContextSource>,
    /// Every candidate's fate, for observability.
    pub decisions: Vec<SelectionRecord>,
}

impl OptimizedContext {
    /// An empty window, used when there is nothing to retrieve.
    pub fn empty() -> Self {
        Self {
            fragments: Vec::new(),
            total_tokens: 0,
            sources_used: Vec::new(),
            quality_score: 1.0,
            compression_applied: false,
            degraded_sources: Vec::new(),
            decisions: Vec::new(),
        }
    }

    /// Renders the window as one prompt block, one fragment per line,
    /// with a heading per source group.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut current: Option<ContextSource> = None;
        for fragment in &self.fragments {
            if current != Some(fragment.source) {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(&heading(fragment.source));
                out.push('\n');
                current = Some(fragment.source);
            }
            out.push_str(&fragment.text);
            out.push('\n');
        }
        out
    }
}

fn heading(source: ContextSource) -> String {
    match source {
        ContextSource::History => "## Conversation history".to_string(),
        ContextSource::Episodic => "## Recent memory".to_string(),
        ContextSource::Semantic => "## Long-term memory".to_string(),
        ContextSource::External => "## Reference material".to_string(),
    }
}

/// Builds the final window from an optimizer/compressor selection.
pub fn structure(
    selection: Selection,
    compression_applied: bool,
    degraded_sources: Vec<ContextSource>,
) -> OptimizedContext {
    let decisions = selection
        .candidates
        .iter()
        .map(|c| SelectionRecord {
            source: c.source,
            tokens: c.tokens,
            score: c.score(),
            disposition: c.disposition,
        })
        .collect();

    let mut accepted: Vec<&ContextCandidate> = selection
        .candidates
        .iter()
        .filter(|c| c.is_accepted() && !c.content.is_empty())
        .collect();

    // Group by source priority; within history keep chronological
    // order, within the other groups keep score order (highest first).
    accepted.sort_by(|a, b| {
        a.source.cmp(&b.source).then_with(|| {
            if a.source == ContextSource::History {
                a.created_at.cmp(&b.created_at)
            } else {
                crate::candidate::rank(a, b)
            }
        })
    });

    let fragments: Vec<ContextFragment> = accepted
        .iter()
        .map(|c| ContextFragment {
            source: c.source,
            text: c.content.clone(),
            tokens: c.tokens,
        })
        .collect();
    let total_tokens = fragments.iter().map(|f| f.tokens).sum();

    let mut sources_used: Vec<ContextSource> = Vec::new();
    for fragment in &fragments {
        if !sources_used.contains(&fragment.source) {
            sources_used.push(fragment.source);
        }
    }

    OptimizedContext {
        fragments,
        total_tokens,
        sources_used,
        quality_score: selection.retained_score_share.clamp(0.0, 1.0),
        compression_applied,
        degraded_sources,
        decisions,
    }
}
