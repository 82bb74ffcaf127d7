// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock similarity backend for memory retrieval tests.
//!
//! Scores indexed content by naive token overlap with the query, which
//! is deterministic and good enough for ranking assertions. A failure
//! mode switch makes every call error, for degraded-mode tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use parley_core::error::ParleyError;
use parley_core::traits::adapter::PluginAdapter;
use parley_core::traits::similarity::SimilarityAdapter;
use parley_core::types::{AdapterKind, HealthStatus, SimilarityHit};

/// In-memory similarity backend with overlap scoring.
pub struct MockSimilarity {
    // scope -> key -> content
    index: Mutex<HashMap<String, HashMap<String, String>>>,
    failing: AtomicBool,
}

impl MockSimilarity {
    pub fn new() -> Self {
        Self {
            index: Mutex::new(HashMap::new()),
            failing: AtomicBool::new(false),
        }
    }

    /// Makes every subsequent call fail, simulating an unavailable
    /// backend.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), ParleyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ParleyError::provider_transient(
                "similarity backend unavailable",
            ));
        }
        Ok(())
    }

    /// Fraction of query tokens appearing in the content, in [0, 1].
    fn overlap_score(query: &str, content: &str) -> f64 {
        let query_tokens: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if query_tokens.is_empty() {
            return 0.0;
        }
        let content_lower = content.to_lowercase();
        let hits = query_tokens
            .iter()
            .filter(|t| content_lower.contains(t.as_str()))
            .count();
        hits as f64 / query_tokens.len() as f64
    }
}

impl Default for MockSimilarity {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockSimilarity {
    fn name(&self) -> &str {
        "mock-similarity"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::Similarity
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        if self.failing.load(Ordering::SeqCst) {
            Ok(HealthStatus::Unhealthy("forced failure".into()))
        } else {
            Ok(HealthStatus::Healthy)
        }
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}

#[async_trait]
impl SimilarityAdapter for MockSimilarity {
    async fn index(&self, scope: &str, key: &str, content: &str) -> Result<(), ParleyError> {
        self.check_available()?;
        self.index
            .lock()
            .await
            .entry(scope.to_string())
            .or_default()
            .insert(key.to_string(), content.to_string());
        Ok(())
    }

    async fn search(
        &self,
        scope: &str,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SimilarityHit>, ParleyError> {
        self.check_available()?;
        let index = self.index.lock().await;
        let mut hits: Vec<SimilarityHit> = index
            .get(scope)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(key, content)| SimilarityHit {
                        memory_id: key.clone(),
                        score: Self::overlap_score(query, content),
                    })
                    .filter(|hit| hit.score > 0.0)
                    .collect()
            })
            .unwrap_or_default();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.memory_id.cmp(&b.memory_id))
        });
        hits.truncate(max_results);
        Ok(hits)
    }

    async fn remove(&self, scope: &str, key: &str) -> Result<(), ParleyError> {
        self.check_available()?;
        if let Some(entries) = self.index.lock().await.get_mut(scope) {
            entries.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn search_ranks_by_overlap() {
        let sim = MockSimilarity::new();
        sim.index("s1", "m1", "the user's dog is named Max")
            .await
            .unwrap();
        sim.index("s1", "m2", "weather in Paris is rainy")
            .await
            .unwrap();

        let hits = sim.search("s1", "dog named max", 10).await.unwrap();
        assert_eq!(hits[0].memory_id, "m1");
        assert!(hits[0].score > 0.9);
    }

    #[tokio::test]
    async fn failing_mode_errors_every_call() {
        let sim = MockSimilarity::new();
        sim.set_failing(true);
        assert!(sim.search("s1", "anything", 10).await.is_err());
        assert!(sim.index("s1", "k", "c").await.is_err());
    }

    #[tokio::test]
    async fn scopes_are_isolated() {
        let sim = MockSimilarity::new();
        sim.index("s1", "m1", "alpha beta").await.unwrap();
        let hits = sim.search("s2", "alpha", 10).await.unwrap();
        assert!(hits.is_empty());
    }
}
