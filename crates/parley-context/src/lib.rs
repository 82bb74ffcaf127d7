// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token-budgeted context assembly for Parley.
//!
//! The [`ContextEngine`] turns a query plus stored history, memory,
//! and external knowledge into a bounded, ranked context window:
//! - **Retriever**: queries each enabled source concurrently, under a
//!   per-source timeout; slow or failing sources degrade, never block.
//! - **Optimizer**: greedy budget fill in composite-score order, with
//!   required sources seated first.
//! - **Compressor**: salience-preserving truncation for fragments that
//!   would otherwise blow the budget.
//! - **Structurer**: renders the final ordered window and computes its
//!   totals and quality score.

pub mod candidate;
pub mod compressor;
pub mod optimizer;
pub mod retriever;
pub mod structurer;

use std::sync::Arc;

use metrics::histogram;
use parley_config::model::ContextConfig;
use parley_core::error::ParleyError;
use parley_core::traits::storage::StorageAdapter;
use parley_core::types::MemoryKind;
use parley_memory::MemoryManager;
use tracing::debug;

pub use candidate::{ContextCandidate, ContextSource, Disposition, ExclusionReason};
pub use retriever::{KnowledgeSnippet, KnowledgeSource};
pub use structurer::{ContextFragment, OptimizedContext, SelectionRecord};

use retriever::Retriever;

/// One context-building request.
#[derive(Debug, Clone)]
pub struct ContextQuery {
    /// Conversation/agent scope the context is built for.
    pub scope: String,
    /// The query text driving relevance ranking.
    pub query: String,
    /// Maximum tokens the final window may occupy.
    pub token_budget: usize,
    /// Sources that must appear in the window regardless of score.
    pub required_sources: Vec<ContextSource>,
    /// Sources to skip entirely (required sources override this).
    pub excluded_sources: Vec<ContextSource>,
    pub memory_enabled: bool,
    /// Memory kinds to consult; empty means all.
    pub memory_kinds: Vec<MemoryKind>,
    pub memory_max_results: usize,
    pub memory_min_relevance: f64,
}

impl ContextQuery {
    pub fn new(scope: impl Into<String>, query: impl Into<String>, token_budget: usize) -> Self {
        Self {
            scope: scope.into(),
            query: query.into(),
            token_budget,
            required_sources: Vec::new(),
            excluded_sources: Vec::new(),
            memory_enabled: true,
            memory_kinds: Vec::new(),
            memory_max_results: 10,
            memory_min_relevance: 0.3,
        }
    }
}

/// Orchestrates retrieval, optimization, compression, and structuring.
pub struct ContextEngine {
    retriever: Retriever,
    config: ContextConfig,
}

impl ContextEngine {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        memory: Arc<MemoryManager>,
        config: ContextConfig,
    ) -> Self {
        Self {
            retriever: Retriever::new(storage, memory, Vec::new(), config.clone()),
            config,
        }
    }

    /// Like [`ContextEngine::new`], with external knowledge sources
    /// registered. Sources are queried in registration order.
    pub fn with_knowledge(
        storage: Arc<dyn StorageAdapter>,
        memory: Arc<MemoryManager>,
        knowledge: Vec<Arc<dyn KnowledgeSource>>,
        config: ContextConfig,
    ) -> Self {
        Self {
            retriever: Retriever::new(storage, memory, knowledge, config.clone()),
            config,
        }
    }

    /// Builds a bounded, ranked context window for `query`.
    ///
    /// The returned window always respects `token_budget`. Unavailable
    /// sources are reported in `degraded_sources`; they never fail the
    /// build.
    pub async fn build_context(
        &self,
        query: &ContextQuery,
    ) -> Result<OptimizedContext, ParleyError> {
        let retrieved = self.retriever.retrieve(query).await;
        if retrieved.candidates.is_empty() {
            let mut context = OptimizedContext::empty();
            context.degraded_sources = retrieved.degraded_sources;
            return Ok(context);
        }

        let selection = optimizer::optimize(
            retrieved.candidates,
            query.token_budget,
            &query.required_sources,
        );

        let max_candidate_tokens =
            (query.token_budget as f64 * self.config.max_candidate_share) as usize;
        let mut candidates = selection.candidates;
        let compression_applied = compressor::compress_accepted(
            &mut candidates,
            query.token_budget,
            max_candidate_tokens.max(1),
        );
        let selection = optimizer::Selection {
            candidates,
            accepted_tokens: selection.accepted_tokens,
            retained_score_share: selection.retained_score_share,
        };

        let context = structurer::structure(selection, compression_applied, retrieved.degraded_sources);
        histogram!("parley_context_total_tokens").record(context.total_tokens as f64);
        histogram!("parley_context_quality_score").record(context.quality_score);
        debug!(
            total_tokens = context.total_tokens,
            budget = query.token_budget,
            quality = context.quality_score,
            sources = ?context.sources_used,
            "context window built"
        );
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parley_config::model::MemoryConfig;
    use parley_core::types::{Message, MessageContent, Role};
    use parley_test_utils::{MemoryStorage, MockProvider, MockSimilarity};

    struct Harness {
        storage: Arc<MemoryStorage>,
        similarity: Arc<MockSimilarity>,
        memory: Arc<MemoryManager>,
    }

    fn harness() -> Harness {
        let storage = Arc::new(MemoryStorage::new());
        let similarity = Arc::new(MockSimilarity::new());
        let memory = Arc::new(MemoryManager::new(
            storage.clone(),
            similarity.clone(),
            Arc::new(MockProvider::new()),
            MemoryConfig {
                enabled: true,
                max_results: 10,
                min_relevance: 0.3,
                consolidation_interval_turns: 10,
                consolidation_model: "m".into(),
                promotion_threshold: 0.7,
                decay_factor: 0.9,
                prune_threshold: 0.05,
            },
        ));
        Harness {
            storage,
            similarity,
            memory,
        }
    }

    fn engine(h: &Harness) -> ContextEngine {
        ContextEngine::new(h.storage.clone(), h.memory.clone(), ContextConfig::default())
    }

    async fn seed_history(h: &Harness, scope: &str, turns: usize) {
        for n in 0..turns {
            h.storage
                .insert_message(&Message {
                    id: format!("m{n}"),
                    session_id: scope.to_string(),
                    role: if n % 2 == 0 { Role::User } else { Role::Assistant },
                    content: MessageContent::Text {
                        text: format!("turn number {n}"),
                    },
                    created_at: format!("2026-01-01T00:00:{n:02}+00:00"),
                    metadata: None,
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn empty_history_and_memory_yield_empty_window() {
        let h = harness();
        let context = engine(&h)
            .build_context(&ContextQuery::new("s1", "hello", 1_000))
            .await
            .unwrap();
        assert!(context.sources_used.is_empty());
        assert!(context.fragments.is_empty());
        assert_eq!(context.total_tokens, 0);
        assert!(context.degraded_sources.is_empty());
    }

    #[tokio::test]
    async fn window_respects_budget_and_orders_history_chronologically() {
        let h = harness();
        seed_history(&h, "s1", 6).await;
        let context = engine(&h)
            .build_context(&ContextQuery::new("s1", "turn", 1_000))
            .await
            .unwrap();

        assert!(context.total_tokens <= 1_000);
        assert_eq!(context.sources_used, vec![ContextSource::History]);
        let texts: Vec<&str> = context.fragments.iter().map(|f| f.text.as_str()).collect();
        assert!(texts[0].contains("turn number 0"));
        assert!(texts[5].contains("turn number 5"));
    }

    #[tokio::test]
    async fn memory_candidates_join_the_window() {
        let h = harness();
        seed_history(&h, "s1", 2).await;
        h.memory
            .remember("s1", parley_core::types::MemoryKind::Semantic, "the project deadline is friday", 0.8)
            .await
            .unwrap();

        let context = engine(&h)
            .build_context(&ContextQuery::new("s1", "project deadline", 1_000))
            .await
            .unwrap();
        assert!(context.sources_used.contains(&ContextSource::Semantic));
        assert!(context
            .fragments
            .iter()
            .any(|f| f.text.contains("deadline is friday")));
    }

    #[tokio::test]
    async fn failing_memory_backend_degrades_instead_of_failing() {
        let h = harness();
        seed_history(&h, "s1", 2).await;
        h.similarity.set_failing(true);

        let context = engine(&h)
            .build_context(&ContextQuery::new("s1", "hello", 1_000))
            .await
            .unwrap();
        assert!(context.degraded_sources.contains(&ContextSource::Episodic));
        assert!(context.degraded_sources.contains(&ContextSource::Semantic));
        // History still contributes.
        assert_eq!(context.sources_used, vec![ContextSource::History]);
    }

    #[tokio::test]
    async fn excluded_source_is_skipped_without_degrading() {
        let h = harness();
        seed_history(&h, "s1", 3).await;
        let mut query = ContextQuery::new("s1", "turn", 1_000);
        query.excluded_sources = vec![ContextSource::History];

        let context = engine(&h).build_context(&query).await.unwrap();
        assert!(context.sources_used.is_empty());
        assert!(context.degraded_sources.is_empty());
    }

    #[tokio::test]
    async fn disabled_memory_skips_memory_sources() {
        let h = harness();
        h.memory
            .remember("s1", parley_core::types::MemoryKind::Episodic, "a memory", 0.8)
            .await
            .unwrap();
        let mut query = ContextQuery::new("s1", "memory", 1_000);
        query.memory_enabled = false;

        let context = engine(&h).build_context(&query).await.unwrap();
        assert!(!context.sources_used.contains(&ContextSource::Episodic));
    }

    struct SlowKnowledge;

    #[async_trait]
    impl KnowledgeSource for SlowKnowledge {
        fn name(&self) -> &str {
            "slow"
        }

        async fn lookup(
            &self,
            _query: &str,
            _max_results: usize,
        ) -> Result<Vec<KnowledgeSnippet>, ParleyError> {
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_knowledge_source_times_out_with_degraded_marker() {
        let h = harness();
        seed_history(&h, "s1", 2).await;
        let engine = ContextEngine::with_knowledge(
            h.storage.clone(),
            h.memory.clone(),
            vec![Arc::new(SlowKnowledge)],
            ContextConfig::default(),
        );

        let context = engine
            .build_context(&ContextQuery::new("s1", "hello", 1_000))
            .await
            .unwrap();
        assert!(context.degraded_sources.contains(&ContextSource::External));
        assert_eq!(context.sources_used, vec![ContextSource::History]);
    }

    struct StaticKnowledge;

    #[async_trait]
    impl KnowledgeSource for StaticKnowledge {
        fn name(&self) -> &str {
            "static"
        }

        async fn lookup(
            &self,
            _query: &str,
            _max_results: usize,
        ) -> Result<Vec<KnowledgeSnippet>, ParleyError> {
            Ok(vec![KnowledgeSnippet {
                content: "reference snippet".into(),
                relevance: 0.9,
                created_at: None,
            }])
        }
    }

    #[tokio::test]
    async fn required_external_source_appears_even_under_tight_budget() {
        let h = harness();
        seed_history(&h, "s1", 20).await;
        let engine = ContextEngine::with_knowledge(
            h.storage.clone(),
            h.memory.clone(),
            vec![Arc::new(StaticKnowledge)],
            ContextConfig::default(),
        );

        let mut query = ContextQuery::new("s1", "turn", 30);
        query.required_sources = vec![ContextSource::External];
        let context = engine.build_context(&query).await.unwrap();

        assert!(context.sources_used.contains(&ContextSource::External));
        assert!(context.total_tokens <= 30);
    }
}
