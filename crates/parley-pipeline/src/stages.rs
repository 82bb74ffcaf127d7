// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The bookend stages: Parsing, Validating, Enriching, Responding.
//!
//! MainProcessing, which owns handler dispatch and the provider loop,
//! lives in its own module.

use std::sync::Arc;

use async_trait::async_trait;
use parley_context::{ContextEngine, ContextQuery};
use parley_core::error::{FieldError, ParleyError};
use parley_core::traits::storage::StorageAdapter;
use parley_core::types::{uuid_v4, Message, MessageContent, Role};
use parley_state::StateManager;
use tracing::{debug, warn};

use crate::context::{ContextOperations, ProcessingContext};
use crate::stage::{
    PipelineStage, STAGE_ENRICHING, STAGE_PARSING, STAGE_RESPONDING, STAGE_VALIDATING,
};

/// Normalizes the raw request message into a canonical [`Message`].
pub struct ParsingStage;

#[async_trait]
impl PipelineStage for ParsingStage {
    fn name(&self) -> &'static str {
        STAGE_PARSING
    }

    async fn run(&self, ctx: &mut ProcessingContext) -> Result<(), ParleyError> {
        let content = match &ctx.request.message.content {
            // Transport whitespace is not part of the turn.
            MessageContent::Text { text } => MessageContent::Text {
                text: text.trim().to_string(),
            },
            other => other.clone(),
        };
        ctx.message = Some(Message {
            id: uuid_v4(),
            session_id: ctx.session.clone(),
            role: ctx.request.message.role,
            content,
            created_at: chrono::Utc::now().to_rfc3339(),
            metadata: None,
        });
        Ok(())
    }
}

/// Re-checks business invariants not covered by schema validation.
pub struct ValidatingStage;

#[async_trait]
impl PipelineStage for ValidatingStage {
    fn name(&self) -> &'static str {
        STAGE_VALIDATING
    }

    async fn run(&self, ctx: &mut ProcessingContext) -> Result<(), ParleyError> {
        let message = ctx
            .message
            .as_ref()
            .ok_or_else(|| ParleyError::Internal("validating before parsing".into()))?;
        let mut errors = Vec::new();

        // Only user turns (and tool results routed back) enter the
        // pipeline; assistant/system turns are produced, not received.
        match (message.role, &message.content) {
            (Role::User, _) => {}
            (Role::Tool, MessageContent::ToolResult { .. }) => {}
            (role, _) => {
                errors.push(FieldError::new(
                    "message.role",
                    format!("inbound messages cannot have role `{role}`"),
                ));
            }
        }

        if ctx.session.trim().is_empty() {
            errors.push(FieldError::new("session_id", "must not be empty"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ParleyError::Validation { errors })
        }
    }
}

/// Builds the context window, loads visible state, and persists the
/// inbound message.
pub struct EnrichingStage {
    engine: Arc<ContextEngine>,
    storage: Arc<dyn StorageAdapter>,
    state: Arc<StateManager>,
}

impl EnrichingStage {
    pub fn new(
        engine: Arc<ContextEngine>,
        storage: Arc<dyn StorageAdapter>,
        state: Arc<StateManager>,
    ) -> Self {
        Self {
            engine,
            storage,
            state,
        }
    }
}

#[async_trait]
impl PipelineStage for EnrichingStage {
    fn name(&self) -> &'static str {
        STAGE_ENRICHING
    }

    async fn run(&self, ctx: &mut ProcessingContext) -> Result<(), ParleyError> {
        let message = ctx
            .message
            .as_ref()
            .ok_or_else(|| ParleyError::Internal("enriching before parsing".into()))?;
        let memory = &ctx.request.options.memory;

        // Budget: the model's window minus the completion reserve.
        let mut query = ContextQuery::new(
            ctx.session.clone(),
            message.content.as_text(),
            ctx.config.provider.context_budget() as usize,
        );
        query.memory_enabled = memory.enabled && ctx.config.memory.enabled;
        query.memory_kinds = memory.kinds.clone();
        query.memory_max_results = memory.max_results;
        query.memory_min_relevance = memory.min_relevance;

        let window = self.engine.build_context(&query).await?;

        ctx.details.context_operations = ContextOperations {
            sources_used: window.sources_used.clone(),
            total_tokens: window.total_tokens,
            quality_score: window.quality_score,
            compression_applied: window.compression_applied,
            candidates: window.decisions.clone(),
        };
        if !window.degraded_sources.is_empty() {
            warn!(
                request_id = %ctx.request_id,
                degraded = ?window.degraded_sources,
                "context sources degraded"
            );
            ctx.details.degraded_mode = true;
            ctx.details.degraded_sources = window.degraded_sources.clone();
        }
        ctx.window = Some(window);

        // State visible to this request: one snapshot, optionally with
        // shared variables folded in.
        let mut snapshot = self.state.snapshot(&ctx.session).await?;
        if ctx.request.options.state.include_shared && ctx.config.state.include_shared {
            let shared = self.state.snapshot("shared").await?;
            for (key, value) in shared.variables {
                snapshot.variables.entry(key).or_insert(value);
            }
        }
        ctx.state = Some(snapshot);

        // Persist the inbound turn after context assembly so history
        // candidates cover prior turns only.
        self.storage.insert_message(message).await?;
        debug!(request_id = %ctx.request_id, session = %ctx.session, "inbound message persisted");
        Ok(())
    }
}

/// Persists the assistant response and finalizes request artifacts.
pub struct RespondingStage {
    storage: Arc<dyn StorageAdapter>,
    state: Arc<StateManager>,
}

impl RespondingStage {
    pub fn new(storage: Arc<dyn StorageAdapter>, state: Arc<StateManager>) -> Self {
        Self { storage, state }
    }
}

#[async_trait]
impl PipelineStage for RespondingStage {
    fn name(&self) -> &'static str {
        STAGE_RESPONDING
    }

    async fn run(&self, ctx: &mut ProcessingContext) -> Result<(), ParleyError> {
        let assistant = ctx
            .assistant
            .as_mut()
            .ok_or_else(|| ParleyError::Internal("responding without a response".into()))?;
        assistant.enrich_metadata(
            "request_id",
            serde_json::Value::String(ctx.request_id.to_string()),
        );
        self.storage.insert_message(assistant).await?;

        if ctx.request.options.state.save_checkpoint && ctx.config.compat.state_checkpoints {
            let checkpoint_id = self.state.checkpoint(&ctx.session).await?;
            debug!(request_id = %ctx.request_id, checkpoint_id = %checkpoint_id, "checkpoint saved");
            ctx.details.checkpoint_id = Some(checkpoint_id);
        }

        ctx.metrics.token_usage = ctx.usage;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_compat::{RequestMessage, RequestOptions, StructuredRequest, PROTOCOL_VERSION};
    use parley_config::model::ParleyConfig;
    use tokio_util::sync::CancellationToken;

    fn ctx_for(content: MessageContent, role: Role) -> ProcessingContext {
        ProcessingContext::new(
            StructuredRequest {
                version: PROTOCOL_VERSION.to_string(),
                agent_id: "a1".into(),
                session_id: Some("s1".into()),
                message: RequestMessage { role, content },
                options: RequestOptions::default(),
            },
            Arc::new(ParleyConfig::default()),
            CancellationToken::new(),
            None,
        )
    }

    #[tokio::test]
    async fn parsing_normalizes_text_and_stamps_identity() {
        let mut ctx = ctx_for(
            MessageContent::Text {
                text: "  hello there  ".into(),
            },
            Role::User,
        );
        ParsingStage.run(&mut ctx).await.unwrap();

        let message = ctx.message.unwrap();
        assert_eq!(
            message.content,
            MessageContent::Text {
                text: "hello there".into()
            }
        );
        assert_eq!(message.session_id, "s1");
        assert!(!message.id.is_empty());
    }

    #[tokio::test]
    async fn validating_rejects_assistant_role_inbound() {
        let mut ctx = ctx_for(MessageContent::Text { text: "hi".into() }, Role::Assistant);
        ParsingStage.run(&mut ctx).await.unwrap();
        let err = ValidatingStage.run(&mut ctx).await.unwrap_err();
        match err {
            ParleyError::Validation { errors } => {
                assert_eq!(errors[0].field, "message.role");
            }
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[tokio::test]
    async fn validating_allows_tool_results() {
        let mut ctx = ctx_for(
            MessageContent::ToolResult {
                name: "lookup".into(),
                output: serde_json::json!({"ok": true}),
            },
            Role::Tool,
        );
        ParsingStage.run(&mut ctx).await.unwrap();
        assert!(ValidatingStage.run(&mut ctx).await.is_ok());
    }
}
