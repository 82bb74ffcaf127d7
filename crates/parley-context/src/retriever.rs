// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Candidate retrieval across context sources.
//!
//! Sources are queried concurrently, each under its own timeout. A
//! source that times out or errors contributes no candidates and a
//! degraded-mode marker; it never blocks or fails the request.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use parley_config::model::ContextConfig;
use parley_core::error::ParleyError;
use parley_core::traits::storage::StorageAdapter;
use parley_core::types::MemoryKind;
use parley_memory::MemoryManager;
use tracing::{debug, warn};

use crate::candidate::{ContextCandidate, ContextSource};
use crate::ContextQuery;

/// An external knowledge source queried during retrieval.
///
/// Implementations wrap whatever backend holds non-conversational
/// knowledge (documents, graphs, search indexes). Registered on the
/// engine at startup; an empty registry simply yields no external
/// candidates.
#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    fn name(&self) -> &str;

    async fn lookup(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<KnowledgeSnippet>, ParleyError>;
}

/// One fragment returned by a [`KnowledgeSource`].
#[derive(Debug, Clone)]
pub struct KnowledgeSnippet {
    pub content: String,
    /// Source-native relevance in [0, 1].
    pub relevance: f64,
    /// RFC 3339 timestamp, if the backend tracks one.
    pub created_at: Option<String>,
}

/// Result of one retrieval pass over all enabled sources.
#[derive(Debug, Default)]
pub struct RetrievedCandidates {
    pub candidates: Vec<ContextCandidate>,
    /// Sources that timed out or failed this pass.
    pub degraded_sources: Vec<ContextSource>,
}

pub(crate) struct Retriever {
    storage: Arc<dyn StorageAdapter>,
    memory: Arc<MemoryManager>,
    knowledge: Vec<Arc<dyn KnowledgeSource>>,
    config: ContextConfig,
}

impl Retriever {
    pub(crate) fn new(
        storage: Arc<dyn StorageAdapter>,
        memory: Arc<MemoryManager>,
        knowledge: Vec<Arc<dyn KnowledgeSource>>,
        config: ContextConfig,
    ) -> Self {
        Self {
            storage,
            memory,
            knowledge,
            config,
        }
    }

    /// Gathers candidates from every enabled source.
    ///
    /// A source is queried unless it appears in `excluded_sources`;
    /// `required_sources` override exclusion. Memory sources are also
    /// gated on the request's memory options.
    pub(crate) async fn retrieve(&self, query: &ContextQuery) -> RetrievedCandidates {
        let timeout = Duration::from_millis(self.config.source_timeout_ms);
        let enabled = |source: ContextSource| {
            query.required_sources.contains(&source) || !query.excluded_sources.contains(&source)
        };
        let memory_enabled = |source: ContextSource, kind: MemoryKind| {
            enabled(source)
                && query.memory_enabled
                && (query.memory_kinds.is_empty() || query.memory_kinds.contains(&kind))
        };

        let (history, episodic, semantic, external) = tokio::join!(
            self.history(query, enabled(ContextSource::History), timeout),
            self.memory(
                query,
                MemoryKind::Episodic,
                ContextSource::Episodic,
                memory_enabled(ContextSource::Episodic, MemoryKind::Episodic),
                timeout,
            ),
            self.memory(
                query,
                MemoryKind::Semantic,
                ContextSource::Semantic,
                memory_enabled(ContextSource::Semantic, MemoryKind::Semantic),
                timeout,
            ),
            self.external(query, enabled(ContextSource::External), timeout),
        );

        let mut result = RetrievedCandidates::default();
        for outcome in [history, episodic, semantic, external] {
            match outcome {
                SourceOutcome::Candidates(mut batch) => result.candidates.append(&mut batch),
                SourceOutcome::Degraded(source) => {
                    counter!("parley_context_source_degraded_total").increment(1);
                    result.degraded_sources.push(source);
                }
                SourceOutcome::Skipped => {}
            }
        }
        debug!(
            candidates = result.candidates.len(),
            degraded = result.degraded_sources.len(),
            "retrieval pass complete"
        );
        result
    }

    async fn history(
        &self,
        query: &ContextQuery,
        enabled: bool,
        timeout: Duration,
    ) -> SourceOutcome {
        if !enabled {
            return SourceOutcome::Skipped;
        }
        let fetch = self
            .storage
            .get_messages(&query.scope, Some(self.config.history_window as i64));
        match tokio::time::timeout(timeout, fetch).await {
            Ok(Ok(messages)) => {
                let n = messages.len();
                let candidates = messages
                    .into_iter()
                    .enumerate()
                    .map(|(i, message)| {
                        // History ranks by recency: the newest turn is
                        // both the most relevant and the most recent.
                        let recency = (i + 1) as f64 / n as f64;
                        ContextCandidate::new(
                            ContextSource::History,
                            format!("{}: {}", message.role, message.content.as_text()),
                            recency,
                            recency,
                            Some(message.created_at),
                        )
                    })
                    .collect();
                SourceOutcome::Candidates(candidates)
            }
            Ok(Err(e)) => {
                warn!(scope = %query.scope, error = %e, "history retrieval failed");
                SourceOutcome::Degraded(ContextSource::History)
            }
            Err(_) => {
                warn!(scope = %query.scope, "history retrieval timed out");
                SourceOutcome::Degraded(ContextSource::History)
            }
        }
    }

    async fn memory(
        &self,
        query: &ContextQuery,
        kind: MemoryKind,
        source: ContextSource,
        enabled: bool,
        timeout: Duration,
    ) -> SourceOutcome {
        if !enabled {
            return SourceOutcome::Skipped;
        }
        let kinds = [kind];
        let fetch = self.memory.retrieve(
            &query.scope,
            &query.query,
            &kinds,
            query.memory_max_results,
            query.memory_min_relevance,
        );
        match tokio::time::timeout(timeout, fetch).await {
            Ok(outcome) if outcome.degraded => SourceOutcome::Degraded(source),
            Ok(outcome) => {
                let recency = rank_recency(
                    &outcome
                        .items
                        .iter()
                        .map(|r| r.item.created_at.as_str())
                        .collect::<Vec<_>>(),
                );
                let candidates = outcome
                    .items
                    .into_iter()
                    .zip(recency)
                    .map(|(retrieved, recency)| {
                        ContextCandidate::new(
                            source,
                            retrieved.item.content,
                            retrieved.relevance,
                            recency,
                            Some(retrieved.item.created_at),
                        )
                    })
                    .collect();
                SourceOutcome::Candidates(candidates)
            }
            Err(_) => {
                warn!(scope = %query.scope, %kind, "memory retrieval timed out");
                SourceOutcome::Degraded(source)
            }
        }
    }

    async fn external(
        &self,
        query: &ContextQuery,
        enabled: bool,
        timeout: Duration,
    ) -> SourceOutcome {
        if !enabled || self.knowledge.is_empty() {
            return SourceOutcome::Skipped;
        }
        let mut snippets = Vec::new();
        for source in &self.knowledge {
            let fetch = source.lookup(&query.query, query.memory_max_results);
            match tokio::time::timeout(timeout, fetch).await {
                Ok(Ok(mut batch)) => snippets.append(&mut batch),
                Ok(Err(e)) => {
                    warn!(source = source.name(), error = %e, "knowledge lookup failed");
                    return SourceOutcome::Degraded(ContextSource::External);
                }
                Err(_) => {
                    warn!(source = source.name(), "knowledge lookup timed out");
                    return SourceOutcome::Degraded(ContextSource::External);
                }
            }
        }
        let recency = rank_recency(
            &snippets
                .iter()
                .map(|s| s.created_at.as_deref().unwrap_or(""))
                .collect::<Vec<_>>(),
        );
        let candidates = snippets
            .into_iter()
            .zip(recency)
            .map(|(snippet, recency)| {
                ContextCandidate::new(
                    ContextSource::External,
                    snippet.content,
                    snippet.relevance,
                    recency,
                    snippet.created_at,
                )
            })
            .collect();
        SourceOutcome::Candidates(candidates)
    }
}

enum SourceOutcome {
    Candidates(Vec<ContextCandidate>),
    Degraded(ContextSource),
    Skipped,
}

/// Rank-normalized recency within one batch: the newest timestamp gets
/// 1.0, older entries step down evenly. Entries without a timestamp
/// rank oldest.
fn rank_recency(timestamps: &[&str]) -> Vec<f64> {
    let n = timestamps.len();
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![1.0];
    }
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| timestamps[a].cmp(timestamps[b]));
    let mut recency = vec![0.0; n];
    for (rank, &idx) in order.iter().enumerate() {
        recency[idx] = (rank + 1) as f64 / n as f64;
    }
    recency
}
