// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Content-type handlers and the tool execution loop.
//!
//! Handlers are registered in an ordered list resolved once at
//! startup; MainProcessing picks the first whose `can_handle` matches
//! the inbound message. Provider calls go through a bounded retry
//! that backs off only on transient failures.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parley_core::error::ParleyError;
use parley_core::traits::provider::ProviderAdapter;
use parley_core::traits::storage::StorageAdapter;
use parley_core::types::{
    uuid_v4, Message, MessageContent, ProviderMessage, ProviderRequest, ProviderResponse, Role,
    StreamEventType, TokenUsage,
};
use tracing::{debug, warn};

use crate::context::ProcessingContext;

/// A callable tool exposed to the tool-call loop.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ParleyError>;
}

/// What a content handler produced: the assistant text plus accumulated
/// provider usage.
#[derive(Debug, Clone)]
pub struct HandlerOutput {
    pub text: String,
    pub usage: TokenUsage,
    /// Provider round-trips made (> 1 only for the tool loop).
    pub depth: u32,
}

/// Handles one content kind of inbound message.
#[async_trait]
pub trait ContentHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_handle(&self, message: &Message) -> bool;

    async fn handle(&self, ctx: &mut ProcessingContext) -> Result<HandlerOutput, ParleyError>;
}

/// Calls the provider, retrying transient failures with exponential
/// backoff. Attempt count and initial backoff come from config.
pub async fn complete_with_retry(
    provider: &dyn ProviderAdapter,
    request: ProviderRequest,
    max_attempts: u32,
    initial_backoff: Duration,
) -> Result<ProviderResponse, ParleyError> {
    let mut backoff = initial_backoff;
    let mut attempt = 0;
    loop {
        attempt += 1;
        match provider.complete(request.clone()).await {
            Ok(response) => return Ok(response),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                warn!(attempt, backoff_ms = backoff.as_millis() as u64, error = %e,
                    "transient provider error, retrying");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Builds the provider request for the current turn: rendered context
/// window as the system prompt, the inbound turn as the sole message.
fn provider_request(ctx: &ProcessingContext, content: String, stream: bool) -> ProviderRequest {
    let system_prompt = ctx
        .window
        .as_ref()
        .map(|w| w.render())
        .filter(|rendered| !rendered.is_empty());
    ProviderRequest {
        model: ctx.config.provider.default_model.clone(),
        system_prompt,
        messages: vec![ProviderMessage {
            role: Role::User,
            content,
        }],
        max_tokens: ctx.config.provider.completion_reserve,
        stream,
    }
}

fn assistant_message(session: &str, text: String) -> Message {
    Message {
        id: uuid_v4(),
        session_id: session.to_string(),
        role: Role::Assistant,
        content: MessageContent::Text { text },
        created_at: chrono::Utc::now().to_rfc3339(),
        metadata: None,
    }
}

/// Plain text turns: one provider call, optionally streamed.
pub struct TextHandler {
    provider: Arc<dyn ProviderAdapter>,
    storage: Arc<dyn StorageAdapter>,
}

impl TextHandler {
    pub fn new(provider: Arc<dyn ProviderAdapter>, storage: Arc<dyn StorageAdapter>) -> Self {
        Self { provider, storage }
    }

    async fn complete(&self, ctx: &mut ProcessingContext, prompt: String) -> Result<HandlerOutput, ParleyError> {
        let streaming = ctx.request.options.response.stream && ctx.config.compat.streaming;
        if streaming {
            self.stream(ctx, prompt).await
        } else {
            let request = provider_request(ctx, prompt, false);
            let response = tokio::time::timeout_at(
                ctx.deadline,
                complete_with_retry(
                    self.provider.as_ref(),
                    request,
                    ctx.config.pipeline.provider_retries,
                    Duration::from_millis(ctx.config.pipeline.retry_backoff_ms),
                ),
            )
            .await
            .map_err(|_| ParleyError::Timeout {
                duration: Duration::from_secs(ctx.config.pipeline.request_timeout_secs),
            })??;
            Ok(HandlerOutput {
                text: response.content,
                usage: response.usage,
                depth: 1,
            })
        }
    }

    /// Consumes the provider's chunk stream, forwarding text deltas to
    /// the request's chunk channel. On cancellation or deadline the
    /// partial text is persisted tagged incomplete, never as a
    /// complete message.
    async fn stream(
        &self,
        ctx: &mut ProcessingContext,
        prompt: String,
    ) -> Result<HandlerOutput, ParleyError> {
        let request = provider_request(ctx, prompt, true);
        let mut stream = self.provider.stream(request).await?;

        let cancel = ctx.cancel.clone();
        let chunk_tx = ctx.chunks.clone();
        let mut text = String::new();
        let mut usage = TokenUsage::default();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.persist_incomplete(ctx, &text).await;
                    return Err(ParleyError::Internal("request cancelled by client".into()));
                }
                _ = tokio::time::sleep_until(ctx.deadline) => {
                    self.persist_incomplete(ctx, &text).await;
                    return Err(ParleyError::Timeout {
                        duration: Duration::from_secs(ctx.config.pipeline.request_timeout_secs),
                    });
                }
                chunk = stream.next() => match chunk {
                    Some(Ok(chunk)) => {
                        if chunk.event_type == StreamEventType::ContentDelta
                            && let Some(delta) = chunk.text
                        {
                            if let Some(tx) = &chunk_tx {
                                // A gone consumer only stops forwarding.
                                let _ = tx.send(delta.clone()).await;
                            }
                            text.push_str(&delta);
                        }
                        if let Some(u) = chunk.usage {
                            usage = u;
                        }
                    }
                    Some(Err(e)) => return Err(e),
                    None => break,
                }
            }
        }

        Ok(HandlerOutput {
            text,
            usage,
            depth: 1,
        })
    }

    async fn persist_incomplete(&self, ctx: &ProcessingContext, partial: &str) {
        if partial.is_empty() {
            return;
        }
        let mut message = assistant_message(&ctx.session, partial.to_string());
        message.enrich_metadata("incomplete", serde_json::Value::Bool(true));
        if let Err(e) = self.storage.insert_message(&message).await {
            warn!(request_id = %ctx.request_id, error = %e, "failed to persist partial response");
        } else {
            debug!(request_id = %ctx.request_id, chars = partial.len(), "partial response persisted as incomplete");
        }
    }
}

#[async_trait]
impl ContentHandler for TextHandler {
    fn name(&self) -> &'static str {
        "text"
    }

    fn can_handle(&self, message: &Message) -> bool {
        matches!(message.content, MessageContent::Text { .. })
    }

    async fn handle(&self, ctx: &mut ProcessingContext) -> Result<HandlerOutput, ParleyError> {
        let prompt = ctx
            .message
            .as_ref()
            .map(|m| m.content.as_text())
            .unwrap_or_default();
        self.complete(ctx, prompt).await
    }
}

/// Structured payloads: serialized into the prompt as data the model
/// should act on.
pub struct StructuredHandler {
    provider: Arc<dyn ProviderAdapter>,
}

impl StructuredHandler {
    pub fn new(provider: Arc<dyn ProviderAdapter>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ContentHandler for StructuredHandler {
    fn name(&self) -> &'static str {
        "structured"
    }

    fn can_handle(&self, message: &Message) -> bool {
        matches!(message.content, MessageContent::Structured { .. })
    }

    async fn handle(&self, ctx: &mut ProcessingContext) -> Result<HandlerOutput, ParleyError> {
        let data = match ctx.message.as_ref().map(|m| &m.content) {
            Some(MessageContent::Structured { data }) => data.clone(),
            _ => return Err(ParleyError::Internal("structured handler misrouted".into())),
        };
        let prompt = format!(
            "The user submitted the following structured payload. Respond to it.\n\n```json\n{}\n```",
            serde_json::to_string_pretty(&data)
                .map_err(|e| ParleyError::Internal(e.to_string()))?
        );
        let request = provider_request(ctx, prompt, false);
        let response = tokio::time::timeout_at(
            ctx.deadline,
            complete_with_retry(
                self.provider.as_ref(),
                request,
                ctx.config.pipeline.provider_retries,
                Duration::from_millis(ctx.config.pipeline.retry_backoff_ms),
            ),
        )
        .await
        .map_err(|_| ParleyError::Timeout {
            duration: Duration::from_secs(ctx.config.pipeline.request_timeout_secs),
        })??;
        Ok(HandlerOutput {
            text: response.content,
            usage: response.usage,
            depth: 1,
        })
    }
}

/// Tool calls: executes the requested tool and loops provider and tool
/// until the model stops asking, bounded by the configured depth.
pub struct ToolCallHandler {
    provider: Arc<dyn ProviderAdapter>,
    tools: Arc<HashMap<String, Arc<dyn ToolExecutor>>>,
}

impl ToolCallHandler {
    pub fn new(
        provider: Arc<dyn ProviderAdapter>,
        tools: Arc<HashMap<String, Arc<dyn ToolExecutor>>>,
    ) -> Self {
        Self { provider, tools }
    }

    async fn run_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, ParleyError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ParleyError::provider(format!("unknown tool `{name}`")))?;
        tool.execute(arguments).await
    }
}

/// Recognizes a follow-up tool request in the provider's reply.
///
/// The reply must be a JSON object of the form
/// `{"tool_call": {"name": ..., "arguments": ...}}`; anything else is
/// treated as the final answer.
pub(crate) fn parse_tool_call(content: &str) -> Option<(String, serde_json::Value)> {
    let value: serde_json::Value = serde_json::from_str(content.trim()).ok()?;
    let call = value.get("tool_call")?;
    let name = call.get("name")?.as_str()?.to_string();
    let arguments = call
        .get("arguments")
        .cloned()
        .unwrap_or(serde_json::Value::Null);
    Some((name, arguments))
}

#[async_trait]
impl ContentHandler for ToolCallHandler {
    fn name(&self) -> &'static str {
        "tool_call"
    }

    fn can_handle(&self, message: &Message) -> bool {
        matches!(
            message.content,
            MessageContent::ToolCall { .. } | MessageContent::ToolResult { .. }
        )
    }

    async fn handle(&self, ctx: &mut ProcessingContext) -> Result<HandlerOutput, ParleyError> {
        let max_depth = ctx.config.pipeline.max_tool_depth;
        let retries = ctx.config.pipeline.provider_retries;
        let backoff = Duration::from_millis(ctx.config.pipeline.retry_backoff_ms);

        let (mut tool_name, mut tool_args) = match ctx.message.as_ref().map(|m| &m.content) {
            Some(MessageContent::ToolCall { name, arguments }) => {
                (name.clone(), arguments.clone())
            }
            Some(MessageContent::ToolResult { .. }) => {
                // Already-executed result: feed it straight to the
                // provider without re-running the tool.
                let transcript = ctx
                    .message
                    .as_ref()
                    .map(|m| m.content.as_text())
                    .unwrap_or_default();
                let request = provider_request(ctx, transcript, false);
                let response =
                    complete_with_retry(self.provider.as_ref(), request, retries, backoff).await?;
                return Ok(HandlerOutput {
                    text: response.content,
                    usage: response.usage,
                    depth: 1,
                });
            }
            _ => return Err(ParleyError::Internal("tool handler misrouted".into())),
        };

        let mut transcript = ctx
            .message
            .as_ref()
            .map(|m| m.content.as_text())
            .unwrap_or_default();
        let mut usage = TokenUsage::default();
        let mut depth = 0u32;

        loop {
            depth += 1;
            if depth > max_depth {
                return Err(ParleyError::provider(format!(
                    "tool-call depth limit {max_depth} exceeded"
                )));
            }

            let output = self.run_tool(&tool_name, tool_args.clone()).await?;
            debug!(request_id = %ctx.request_id, tool = %tool_name, depth, "tool executed");
            transcript.push_str(&format!("\n[tool result: {tool_name} {output}]"));

            let request = provider_request(ctx, transcript.clone(), false);
            let response = tokio::time::timeout_at(
                ctx.deadline,
                complete_with_retry(self.provider.as_ref(), request, retries, backoff),
            )
            .await
            .map_err(|_| ParleyError::Timeout {
                duration: Duration::from_secs(ctx.config.pipeline.request_timeout_secs),
            })??;
            usage.accumulate(&response.usage);

            match parse_tool_call(&response.content) {
                Some((next_name, next_args)) => {
                    transcript.push_str(&format!("\n[tool call: {next_name} {next_args}]"));
                    tool_name = next_name;
                    tool_args = next_args;
                }
                None => {
                    return Ok(HandlerOutput {
                        text: response.content,
                        usage,
                        depth,
                    });
                }
            }
        }
    }
}

/// Builds an assistant [`Message`] from a handler's output.
pub(crate) fn output_to_message(session: &str, output: &HandlerOutput) -> Message {
    assistant_message(session, output.text.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_test_utils::MockProvider;

    #[test]
    fn tool_call_parsing_accepts_only_the_expected_shape() {
        let (name, args) =
            parse_tool_call(r#"{"tool_call": {"name": "search", "arguments": {"q": "x"}}}"#)
                .unwrap();
        assert_eq!(name, "search");
        assert_eq!(args, serde_json::json!({"q": "x"}));

        assert!(parse_tool_call("plain text answer").is_none());
        assert!(parse_tool_call(r#"{"not_a_tool_call": 1}"#).is_none());
    }

    #[tokio::test]
    async fn retry_stops_after_transient_failures_resolve() {
        let provider = MockProvider::new();
        provider.push_transient_error("reset").await;
        provider.push_transient_error("reset again").await;
        provider.push_text("recovered").await;

        let request = ProviderRequest {
            model: "m".into(),
            system_prompt: None,
            messages: vec![ProviderMessage {
                role: Role::User,
                content: "hi".into(),
            }],
            max_tokens: 64,
            stream: false,
        };
        let response =
            complete_with_retry(&provider, request, 3, Duration::from_millis(1)).await.unwrap();
        assert_eq!(response.content, "recovered");
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn retry_gives_up_on_fatal_errors_immediately() {
        let provider = MockProvider::new();
        provider.push_fatal_error("model not found").await;
        provider.push_text("never reached").await;

        let request = ProviderRequest {
            model: "m".into(),
            system_prompt: None,
            messages: vec![ProviderMessage {
                role: Role::User,
                content: "hi".into(),
            }],
            max_tokens: 64,
            stream: false,
        };
        let err = complete_with_retry(&provider, request, 3, Duration::from_millis(1))
            .await
            .unwrap_err();
        assert!(!err.is_transient());
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn retry_exhausts_attempts_on_persistent_transient_errors() {
        let provider = MockProvider::new();
        for _ in 0..5 {
            provider.push_transient_error("still down").await;
        }
        let request = ProviderRequest {
            model: "m".into(),
            system_prompt: None,
            messages: vec![ProviderMessage {
                role: Role::User,
                content: "hi".into(),
            }],
            max_tokens: 64,
            stream: false,
        };
        let err = complete_with_retry(&provider, request, 3, Duration::from_millis(1))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(provider.call_count(), 3);
    }
}
