// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory lifecycle: retrieval, explicit writes, consolidation,
//! decay, promotion, and pruning.
//!
//! Retrieval is best-effort: when the similarity backend is
//! unavailable the manager returns an empty, degraded result instead
//! of an error, so the calling pipeline can still answer from history
//! alone.

use std::sync::Arc;

use metrics::{counter, histogram};
use parley_config::model::MemoryConfig;
use parley_core::error::ParleyError;
use parley_core::traits::provider::ProviderAdapter;
use parley_core::traits::similarity::SimilarityAdapter;
use parley_core::traits::storage::StorageAdapter;
use parley_core::types::{
    uuid_v4, MemoryItem, MemoryKind, ProviderMessage, ProviderRequest, Role, TokenUsage,
};
use tracing::{debug, warn};

use crate::consolidation::{build_consolidation_prompt, parse_consolidation_response};

/// Importance boost applied to a memory each time retrieval returns it.
const ACCESS_BOOST: f64 = 0.05;

/// Completion budget for the consolidation model.
const CONSOLIDATION_MAX_TOKENS: u32 = 1024;

/// How many messages beyond the consolidation interval to include in
/// the summarization window, so facts spanning interval boundaries are
/// not lost.
const WINDOW_MULTIPLIER: i64 = 2;

/// A memory item with its retrieval relevance score.
#[derive(Debug, Clone)]
pub struct RetrievedMemory {
    pub item: MemoryItem,
    /// Similarity score from the backend, in [0, 1].
    pub relevance: f64,
}

/// Result of a retrieval pass.
///
/// `degraded` is true when the similarity backend (or storage lookup)
/// failed and the result is empty for that reason rather than because
/// nothing matched.
#[derive(Debug, Clone, Default)]
pub struct RetrievalOutcome {
    pub items: Vec<RetrievedMemory>,
    pub degraded: bool,
}

/// Result of a consolidation pass.
#[derive(Debug, Clone, Default)]
pub struct ConsolidationOutcome {
    /// Newly created episodic memories.
    pub created: Vec<MemoryItem>,
    /// Episodic items promoted to semantic this pass.
    pub promoted: usize,
    /// Items removed for falling below the prune threshold.
    pub pruned: u64,
    /// Token usage of the consolidation model call, if one was made.
    pub usage: Option<TokenUsage>,
}

/// Manages episodic and semantic memory for conversation scopes.
pub struct MemoryManager {
    storage: Arc<dyn StorageAdapter>,
    similarity: Arc<dyn SimilarityAdapter>,
    provider: Arc<dyn ProviderAdapter>,
    config: MemoryConfig,
}

impl MemoryManager {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        similarity: Arc<dyn SimilarityAdapter>,
        provider: Arc<dyn ProviderAdapter>,
        config: MemoryConfig,
    ) -> Self {
        Self {
            storage,
            similarity,
            provider,
            config,
        }
    }

    /// Retrieve memories relevant to `query` within `scope`.
    ///
    /// Results are filtered to `kinds` (empty slice means all kinds)
    /// and to relevance at or above `min_relevance`, capped at
    /// `max_results`, ordered by relevance descending with newer items
    /// winning ties. Never fails: backend errors produce an empty
    /// outcome with `degraded` set.
    pub async fn retrieve(
        &self,
        scope: &str,
        query: &str,
        kinds: &[MemoryKind],
        max_results: usize,
        min_relevance: f64,
    ) -> RetrievalOutcome {
        if !self.config.enabled || max_results == 0 {
            return RetrievalOutcome::default();
        }

        // Oversample before kind and relevance filtering.
        let hits = match self.similarity.search(scope, query, max_results * 4).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(scope, error = %e, "similarity backend unavailable, memory retrieval degraded");
                counter!("parley_memory_retrieval_degraded_total").increment(1);
                return RetrievalOutcome {
                    items: Vec::new(),
                    degraded: true,
                };
            }
        };

        let ids: Vec<String> = hits.iter().map(|h| h.memory_id.clone()).collect();
        let items = match self.storage.get_memories_by_ids(&ids).await {
            Ok(items) => items,
            Err(e) => {
                warn!(scope, error = %e, "memory lookup failed, retrieval degraded");
                counter!("parley_memory_retrieval_degraded_total").increment(1);
                return RetrievalOutcome {
                    items: Vec::new(),
                    degraded: true,
                };
            }
        };

        let mut scored: Vec<RetrievedMemory> = items
            .into_iter()
            .filter(|item| kinds.is_empty() || kinds.contains(&item.kind))
            .filter_map(|item| {
                let relevance = hits
                    .iter()
                    .find(|h| h.memory_id == item.id)
                    .map(|h| h.score)?;
                (relevance >= min_relevance).then_some(RetrievedMemory { item, relevance })
            })
            .collect();

        // Relevance descending; ties go to the newer item, then id for
        // full determinism.
        scored.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.item.created_at.cmp(&a.item.created_at))
                .then_with(|| a.item.id.cmp(&b.item.id))
        });
        scored.truncate(max_results);

        self.record_access(&scored).await;
        counter!("parley_memory_retrievals_total").increment(1);
        histogram!("parley_memory_retrieval_results").record(scored.len() as f64);

        RetrievalOutcome {
            items: scored,
            degraded: false,
        }
    }

    /// Bump importance and access time for returned items, best effort.
    async fn record_access(&self, retrieved: &[RetrievedMemory]) {
        let now = chrono::Utc::now().to_rfc3339();
        for entry in retrieved {
            let importance = (entry.item.importance + ACCESS_BOOST).min(1.0);
            if let Err(e) = self
                .storage
                .update_memory_access(&entry.item.id, importance, &now)
                .await
            {
                debug!(id = %entry.item.id, error = %e, "failed to update memory access");
            }
        }
    }

    /// Store an explicit memory and index it for retrieval.
    pub async fn remember(
        &self,
        scope: &str,
        kind: MemoryKind,
        content: &str,
        importance: f64,
    ) -> Result<MemoryItem, ParleyError> {
        let now = chrono::Utc::now().to_rfc3339();
        let id = uuid_v4();
        let item = MemoryItem {
            id: id.clone(),
            scope: scope.to_string(),
            kind,
            content: content.to_string(),
            embedding_ref: id,
            importance: importance.clamp(0.0, 1.0),
            created_at: now.clone(),
            last_accessed_at: now,
        };
        self.storage.upsert_memory(&item).await?;
        self.similarity
            .index(scope, &item.embedding_ref, &item.content)
            .await?;
        counter!("parley_memory_items_created_total").increment(1);
        Ok(item)
    }

    /// Whether `scope` has accumulated enough turns for a
    /// consolidation pass.
    pub async fn should_consolidate(&self, scope: &str) -> Result<bool, ParleyError> {
        if !self.config.enabled || self.config.consolidation_interval_turns <= 0 {
            return Ok(false);
        }
        let count = self.storage.count_messages(scope).await?;
        Ok(count > 0 && count % self.config.consolidation_interval_turns == 0)
    }

    /// Run a full consolidation pass over `scope`.
    ///
    /// Summarizes the recent window into new episodic memories, decays
    /// the importance of existing items, promotes episodic items that
    /// stayed above the promotion threshold into semantic memory, and
    /// prunes items that fell below the prune threshold.
    pub async fn consolidate(&self, scope: &str) -> Result<ConsolidationOutcome, ParleyError> {
        let window = self.config.consolidation_interval_turns * WINDOW_MULTIPLIER;
        let messages = self.storage.get_messages(scope, Some(window)).await?;

        let mut outcome = ConsolidationOutcome::default();
        if messages.len() >= 2 {
            let request = ProviderRequest {
                model: self.config.consolidation_model.clone(),
                system_prompt: None,
                messages: vec![ProviderMessage {
                    role: Role::User,
                    content: build_consolidation_prompt(&messages),
                }],
                max_tokens: CONSOLIDATION_MAX_TOKENS,
                stream: false,
            };
            let response = self.provider.complete(request).await?;
            outcome.usage = Some(response.usage.clone());

            for fact in parse_consolidation_response(&response.content) {
                let item = self
                    .remember(scope, MemoryKind::Episodic, &fact.content, fact.importance)
                    .await?;
                outcome.created.push(item);
            }
        }

        self.maintain(scope, &mut outcome).await?;

        counter!("parley_memory_consolidations_total").increment(1);
        debug!(
            scope,
            created = outcome.created.len(),
            promoted = outcome.promoted,
            pruned = outcome.pruned,
            "consolidation pass complete"
        );
        Ok(outcome)
    }

    /// Decay, promote, and prune existing memories in `scope`.
    async fn maintain(
        &self,
        scope: &str,
        outcome: &mut ConsolidationOutcome,
    ) -> Result<(), ParleyError> {
        let created_ids: Vec<&str> = outcome.created.iter().map(|m| m.id.as_str()).collect();
        let existing = self.storage.list_memories(scope, None).await?;

        for mut item in existing {
            if created_ids.contains(&item.id.as_str()) {
                continue;
            }
            item.importance *= self.config.decay_factor;

            if item.kind == MemoryKind::Episodic
                && item.importance >= self.config.promotion_threshold
            {
                item.kind = MemoryKind::Semantic;
                outcome.promoted += 1;
                self.storage.upsert_memory(&item).await?;
            } else {
                self.storage
                    .update_memory_access(&item.id, item.importance, &item.last_accessed_at)
                    .await?;
            }
        }

        // Capture the doomed ids first so the similarity index can be
        // cleaned up alongside storage.
        let doomed: Vec<MemoryItem> = self
            .storage
            .list_memories(scope, None)
            .await?
            .into_iter()
            .filter(|m| m.importance < self.config.prune_threshold)
            .collect();
        outcome.pruned = self
            .storage
            .prune_memories(scope, self.config.prune_threshold)
            .await?;
        for item in doomed {
            if let Err(e) = self.similarity.remove(scope, &item.embedding_ref).await {
                debug!(id = %item.id, error = %e, "failed to drop pruned memory from index");
            }
        }
        Ok(())
    }
}
