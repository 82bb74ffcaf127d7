// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock LLM provider adapter for deterministic testing.
//!
//! `MockProvider` implements `ProviderAdapter` with pre-configured
//! outcomes, enabling fast, CI-runnable tests without external API
//! calls. Outcomes are popped from a FIFO queue; an empty queue yields
//! a default "mock response" text. Failures can be scripted to exercise
//! retry and degraded-mode paths.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use tokio::sync::Mutex;

use parley_core::error::ParleyError;
use parley_core::traits::adapter::PluginAdapter;
use parley_core::traits::provider::ProviderAdapter;
use parley_core::types::{
    AdapterKind, HealthStatus, ProviderRequest, ProviderResponse, ProviderStreamChunk,
    StreamEventType, TokenUsage,
};

/// One scripted provider outcome.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// A successful completion with the given text.
    Text(String),
    /// A transient (retryable) failure.
    TransientError(String),
    /// A fatal (non-retryable) failure.
    FatalError(String),
}

/// A mock LLM provider that returns pre-configured outcomes.
pub struct MockProvider {
    outcomes: Arc<Mutex<VecDeque<MockOutcome>>>,
    /// Optional artificial latency per call, for deadline tests.
    delay: Arc<Mutex<Option<Duration>>>,
    /// Requests received, newest last, for prompt assertions.
    requests: Arc<Mutex<Vec<ProviderRequest>>>,
    calls: AtomicU32,
}

impl MockProvider {
    /// Create a new mock provider with an empty outcome queue.
    pub fn new() -> Self {
        Self {
            outcomes: Arc::new(Mutex::new(VecDeque::new())),
            delay: Arc::new(Mutex::new(None)),
            requests: Arc::new(Mutex::new(Vec::new())),
            calls: AtomicU32::new(0),
        }
    }

    /// Create a mock provider pre-loaded with successful responses.
    pub fn with_responses(responses: Vec<String>) -> Self {
        let provider = Self::new();
        {
            let outcomes = provider.outcomes.clone();
            let mut queue = outcomes.try_lock().expect("fresh mutex");
            queue.extend(responses.into_iter().map(MockOutcome::Text));
        }
        provider
    }

    /// Queue a successful response.
    pub async fn push_text(&self, text: impl Into<String>) {
        self.outcomes
            .lock()
            .await
            .push_back(MockOutcome::Text(text.into()));
    }

    /// Queue a transient failure (the pipeline should retry it).
    pub async fn push_transient_error(&self, message: impl Into<String>) {
        self.outcomes
            .lock()
            .await
            .push_back(MockOutcome::TransientError(message.into()));
    }

    /// Queue a fatal failure (the pipeline must surface it).
    pub async fn push_fatal_error(&self, message: impl Into<String>) {
        self.outcomes
            .lock()
            .await
            .push_back(MockOutcome::FatalError(message.into()));
    }

    /// Delay every call by the given duration, for deadline tests.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.lock().await = Some(delay);
    }

    /// Number of provider calls made so far.
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// All requests received so far, in call order.
    pub async fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().await.clone()
    }

    async fn next_outcome(&self, request: &ProviderRequest) -> Result<String, ParleyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().await.push(request.clone());
        if let Some(delay) = *self.delay.lock().await {
            tokio::time::sleep(delay).await;
        }
        let outcome = self
            .outcomes
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| MockOutcome::Text("mock response".to_string()));
        match outcome {
            MockOutcome::Text(text) => Ok(text),
            MockOutcome::TransientError(message) => Err(ParleyError::provider_transient(message)),
            MockOutcome::FatalError(message) => Err(ParleyError::provider(message)),
        }
    }

    fn usage_for(request: &ProviderRequest, completion: &str) -> TokenUsage {
        let prompt: usize = request
            .messages
            .iter()
            .map(|m| m.content.chars().count() / 4 + 1)
            .sum();
        TokenUsage {
            prompt_tokens: prompt as u32,
            completion_tokens: (completion.chars().count() / 4 + 1) as u32,
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock-provider"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ParleyError> {
        let text = self.next_outcome(&request).await?;
        let usage = Self::usage_for(&request, &text);
        Ok(ProviderResponse {
            id: format!("mock-resp-{}", uuid::Uuid::new_v4()),
            content: text,
            model: request.model,
            stop_reason: Some("end_turn".to_string()),
            usage,
        })
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> Result<
        Pin<Box<dyn futures_core::Stream<Item = Result<ProviderStreamChunk, ParleyError>> + Send>>,
        ParleyError,
    > {
        let text = self.next_outcome(&request).await?;
        let usage = Self::usage_for(&request, &text);

        // Realistic event sequence:
        // MessageStart -> ContentDelta -> MessageDelta (usage + stop) -> MessageStop
        let chunks = vec![
            Ok(ProviderStreamChunk {
                event_type: StreamEventType::MessageStart,
                text: None,
                usage: None,
                stop_reason: None,
            }),
            Ok(ProviderStreamChunk {
                event_type: StreamEventType::ContentDelta,
                text: Some(text),
                usage: None,
                stop_reason: None,
            }),
            Ok(ProviderStreamChunk {
                event_type: StreamEventType::MessageDelta,
                text: None,
                usage: Some(usage),
                stop_reason: Some("end_turn".to_string()),
            }),
            Ok(ProviderStreamChunk {
                event_type: StreamEventType::MessageStop,
                text: None,
                usage: None,
                stop_reason: None,
            }),
        ];
        Ok(Box::pin(stream::iter(chunks)))
    }
}
