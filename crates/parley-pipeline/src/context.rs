// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request-scoped processing state.
//!
//! A [`ProcessingContext`] is assembled per invocation, threaded
//! through every stage, and discarded when the request completes. It
//! is never persisted as a whole; durable artifacts (messages,
//! checkpoints) are written by individual stages.

use std::sync::Arc;

use parley_compat::StructuredRequest;
use parley_config::model::ParleyConfig;
use parley_context::{ContextSource, OptimizedContext, SelectionRecord};
use parley_core::types::{Message, ProcessingMetrics, RequestId, StateSnapshot, TokenUsage};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Context-engine results surfaced in `processing_details`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextOperations {
    pub sources_used: Vec<ContextSource>,
    pub total_tokens: usize,
    pub quality_score: f64,
    pub compression_applied: bool,
    /// Per-candidate inclusion/exclusion record.
    pub candidates: Vec<SelectionRecord>,
}

/// Machine-readable trace of one request's processing, attached to the
/// response when the caller asked for it. Observability only; never
/// drives control flow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingDetails {
    /// Stage names in execution order.
    pub stages: Vec<String>,
    pub context_operations: ContextOperations,
    /// True when an optional subsystem was unavailable but the request
    /// still completed.
    pub degraded_mode: bool,
    /// Sources that timed out or failed during enrichment.
    pub degraded_sources: Vec<ContextSource>,
    /// Content handler that produced the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    /// Checkpoint written during this request, if one was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<String>,
    /// Provider round-trips made by the tool-call loop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_depth: Option<u32>,
}

/// Ephemeral per-request aggregate threaded through the pipeline.
pub struct ProcessingContext {
    pub request: StructuredRequest,
    pub request_id: RequestId,
    /// The conversation scope (explicit session or agent-primary).
    pub session: String,
    /// Immutable configuration snapshot for this request's lifetime.
    pub config: Arc<ParleyConfig>,

    /// Canonical inbound message, set by Parsing.
    pub message: Option<Message>,
    /// Budget-bounded context window, set by Enriching.
    pub window: Option<OptimizedContext>,
    /// Live state variables visible to this request, set by Enriching.
    pub state: Option<StateSnapshot>,
    /// Assistant response, set by MainProcessing.
    pub assistant: Option<Message>,

    pub usage: TokenUsage,
    pub metrics: ProcessingMetrics,
    pub details: ProcessingDetails,

    /// Overall request deadline.
    pub deadline: tokio::time::Instant,
    /// Signalled when the caller disconnects.
    pub cancel: CancellationToken,
    /// Optional sink for streamed text deltas.
    pub chunks: Option<mpsc::Sender<String>>,
}

impl ProcessingContext {
    pub fn new(
        request: StructuredRequest,
        config: Arc<ParleyConfig>,
        cancel: CancellationToken,
        chunks: Option<mpsc::Sender<String>>,
    ) -> Self {
        let request_id = RequestId::generate();
        let session = request.session();
        let deadline = tokio::time::Instant::now()
            + std::time::Duration::from_secs(config.pipeline.request_timeout_secs);
        let metrics = ProcessingMetrics {
            request_id: request_id.to_string(),
            ..Default::default()
        };
        Self {
            request,
            request_id,
            session,
            config,
            message: None,
            window: None,
            state: None,
            assistant: None,
            usage: TokenUsage::default(),
            metrics,
            details: ProcessingDetails::default(),
            deadline,
            cancel,
            chunks,
        }
    }

    /// Time left before the overall deadline.
    pub fn remaining(&self) -> std::time::Duration {
        self.deadline
            .saturating_duration_since(tokio::time::Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_compat::{RequestMessage, RequestOptions, PROTOCOL_VERSION};
    use parley_core::types::{MessageContent, Role};

    fn request() -> StructuredRequest {
        StructuredRequest {
            version: PROTOCOL_VERSION.to_string(),
            agent_id: "a1".into(),
            session_id: None,
            message: RequestMessage {
                role: Role::User,
                content: MessageContent::Text { text: "hi".into() },
            },
            options: RequestOptions::default(),
        }
    }

    #[tokio::test]
    async fn context_derives_session_and_correlates_metrics() {
        let ctx = ProcessingContext::new(
            request(),
            Arc::new(ParleyConfig::default()),
            CancellationToken::new(),
            None,
        );
        assert_eq!(ctx.session, "a1-primary");
        assert_eq!(ctx.metrics.request_id, ctx.request_id.to_string());
        assert!(ctx.remaining() > std::time::Duration::from_secs(1));
    }

    #[test]
    fn details_serialize_with_snake_case_sources() {
        let details = ProcessingDetails {
            degraded_mode: true,
            degraded_sources: vec![ContextSource::Episodic],
            ..Default::default()
        };
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["degraded_mode"], serde_json::json!(true));
        assert_eq!(json["degraded_sources"][0], serde_json::json!("episodic"));
    }
}
