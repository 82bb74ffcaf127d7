// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Similarity-search adapter trait for semantic memory retrieval.

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::SimilarityHit;

/// Adapter for the vector/graph similarity backend behind semantic
/// memory.
///
/// A failing backend must not fail the pipeline: callers treat errors
/// from [`search`](SimilarityAdapter::search) as a degraded-mode signal
/// and continue without memory candidates.
#[async_trait]
pub trait SimilarityAdapter: PluginAdapter {
    /// Indexes a memory item's content under its embedding reference key.
    async fn index(&self, scope: &str, key: &str, content: &str) -> Result<(), ParleyError>;

    /// Returns the most similar indexed items for the query, scored in
    /// [0, 1], best first, capped at `max_results`.
    async fn search(
        &self,
        scope: &str,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SimilarityHit>, ParleyError>;

    /// Removes an item from the index.
    async fn remove(&self, scope: &str, key: &str) -> Result<(), ParleyError>;
}
