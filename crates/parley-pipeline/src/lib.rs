// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Parley message processor.
//!
//! A fixed-order stage pipeline (Parsing, Validating, Enriching,
//! MainProcessing, Responding) with a terminal failed state reachable
//! from any stage. Stages are registered in a list so new stages can
//! be inserted without changing the driver loop; each stage's timing
//! is recorded into [`ProcessingMetrics`] regardless of outcome.

pub mod context;
pub mod handlers;
pub mod main_processing;
pub mod stage;
pub mod stages;

use std::collections::HashMap;
use std::sync::Arc;

use metrics::{counter, histogram};
use parley_compat::StructuredRequest;
use parley_config::model::ParleyConfig;
use parley_context::ContextEngine;
use parley_core::error::ParleyError;
use parley_core::traits::provider::ProviderAdapter;
use parley_core::traits::storage::StorageAdapter;
use parley_core::types::{Message, ProcessingMetrics};
use parley_state::StateManager;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub use context::{ContextOperations, ProcessingContext, ProcessingDetails};
pub use handlers::{
    ContentHandler, HandlerOutput, StructuredHandler, TextHandler, ToolCallHandler, ToolExecutor,
};
pub use main_processing::MainProcessingStage;
pub use stage::PipelineStage;
pub use stages::{EnrichingStage, ParsingStage, RespondingStage, ValidatingStage};

/// Everything one request produced, success or failure.
///
/// Metrics and details are populated either way; a failed request
/// still reports the stages it executed and their timings.
pub struct PipelineOutcome {
    pub result: Result<Message, ParleyError>,
    pub metrics: ProcessingMetrics,
    pub details: ProcessingDetails,
}

/// Drives a request through the stage registry.
pub struct MessageProcessor {
    stages: Vec<Arc<dyn PipelineStage>>,
}

impl MessageProcessor {
    /// Builds the default five-stage pipeline over the given services.
    ///
    /// Content handlers are resolved once here, in match order: text,
    /// structured, tool-call.
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        provider: Arc<dyn ProviderAdapter>,
        engine: Arc<ContextEngine>,
        state: Arc<StateManager>,
        tools: HashMap<String, Arc<dyn ToolExecutor>>,
    ) -> Self {
        let tools = Arc::new(tools);
        let handlers: Vec<Arc<dyn ContentHandler>> = vec![
            Arc::new(TextHandler::new(provider.clone(), storage.clone())),
            Arc::new(StructuredHandler::new(provider.clone())),
            Arc::new(ToolCallHandler::new(provider, tools)),
        ];
        let stages: Vec<Arc<dyn PipelineStage>> = vec![
            Arc::new(ParsingStage),
            Arc::new(ValidatingStage),
            Arc::new(EnrichingStage::new(engine, storage.clone(), state.clone())),
            Arc::new(MainProcessingStage::new(handlers)),
            Arc::new(RespondingStage::new(storage, state)),
        ];
        Self { stages }
    }

    /// Inserts a stage after the named one. Unknown names append at
    /// the end.
    pub fn insert_stage_after(&mut self, after: &str, stage: Arc<dyn PipelineStage>) {
        let position = self
            .stages
            .iter()
            .position(|s| s.name() == after)
            .map(|i| i + 1)
            .unwrap_or(self.stages.len());
        self.stages.insert(position, stage);
    }

    /// Processes one request end to end.
    ///
    /// Never panics and never fails the process: any stage error puts
    /// the request into the terminal failed state and is reported in
    /// the outcome.
    pub async fn process(
        &self,
        request: StructuredRequest,
        config: Arc<ParleyConfig>,
        cancel: CancellationToken,
        chunks: Option<mpsc::Sender<String>>,
    ) -> PipelineOutcome {
        let mut ctx = ProcessingContext::new(request, config, cancel, chunks);
        let started = std::time::Instant::now();
        info!(
            request_id = %ctx.request_id,
            session = %ctx.session,
            agent_id = %ctx.request.agent_id,
            "processing request"
        );
        counter!("parley_requests_total").increment(1);

        let mut failure: Option<ParleyError> = None;
        for stage in &self.stages {
            let stage_started = std::time::Instant::now();
            let result = stage.run(&mut ctx).await;
            let duration_ms = stage_started.elapsed().as_millis() as u64;
            histogram!("parley_stage_duration_ms", "stage" => stage.name())
                .record(duration_ms as f64);
            match result {
                Ok(()) => ctx.metrics.record_stage(stage.name(), duration_ms, true),
                Err(e) => {
                    ctx.metrics.record_stage(stage.name(), duration_ms, false);
                    error!(
                        request_id = %ctx.request_id,
                        stage = stage.name(),
                        kind = e.kind(),
                        error = %e,
                        "stage failed, request enters failed state"
                    );
                    counter!("parley_requests_failed_total", "kind" => e.kind()).increment(1);
                    failure = Some(e);
                    break;
                }
            }
        }

        ctx.metrics.total_duration_ms = started.elapsed().as_millis() as u64;
        ctx.details.stages = ctx.metrics.stages_executed.clone();

        let result = match failure {
            Some(e) => Err(e),
            None => {
                counter!("parley_requests_succeeded_total").increment(1);
                ctx.assistant
                    .clone()
                    .ok_or_else(|| ParleyError::Internal("pipeline completed without a response".into()))
            }
        };
        PipelineOutcome {
            result,
            metrics: ctx.metrics,
            details: ctx.details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parley_compat::{RequestMessage, RequestOptions, PROTOCOL_VERSION};
    use parley_config::model::MemoryConfig;
    use parley_core::types::{MessageContent, Role};
    use parley_memory::MemoryManager;
    use parley_test_utils::{MemoryStorage, MockProvider, MockSimilarity};

    struct Harness {
        storage: Arc<MemoryStorage>,
        provider: Arc<MockProvider>,
        similarity: Arc<MockSimilarity>,
        processor: MessageProcessor,
        config: Arc<ParleyConfig>,
    }

    struct EchoTool;

    #[async_trait]
    impl ToolExecutor for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        async fn execute(
            &self,
            arguments: serde_json::Value,
        ) -> Result<serde_json::Value, ParleyError> {
            Ok(serde_json::json!({"echoed": arguments}))
        }
    }

    fn harness() -> Harness {
        let config = Arc::new(ParleyConfig::default());
        let storage = Arc::new(MemoryStorage::new());
        let provider = Arc::new(MockProvider::new());
        let similarity = Arc::new(MockSimilarity::new());
        let memory = Arc::new(MemoryManager::new(
            storage.clone(),
            similarity.clone(),
            provider.clone(),
            MemoryConfig::default(),
        ));
        let engine = Arc::new(ContextEngine::new(
            storage.clone(),
            memory,
            config.context.clone(),
        ));
        let state = Arc::new(StateManager::new(storage.clone()));
        let mut tools: HashMap<String, Arc<dyn ToolExecutor>> = HashMap::new();
        tools.insert("echo".into(), Arc::new(EchoTool));
        let processor = MessageProcessor::new(
            storage.clone(),
            provider.clone(),
            engine,
            state,
            tools,
        );
        Harness {
            storage,
            provider,
            similarity,
            processor,
            config,
        }
    }

    fn text_request(text: &str) -> StructuredRequest {
        StructuredRequest {
            version: PROTOCOL_VERSION.to_string(),
            agent_id: "a1".into(),
            session_id: Some("s1".into()),
            message: RequestMessage {
                role: Role::User,
                content: MessageContent::Text { text: text.into() },
            },
            options: RequestOptions::default(),
        }
    }

    async fn run(h: &Harness, request: StructuredRequest) -> PipelineOutcome {
        h.processor
            .process(request, h.config.clone(), CancellationToken::new(), None)
            .await
    }

    #[tokio::test]
    async fn fresh_session_completes_all_five_stages_with_empty_sources() {
        let h = harness();
        h.provider.push_text("Hi there!").await;

        let outcome = run(&h, text_request("Hello")).await;
        let message = outcome.result.unwrap();
        assert_eq!(message.content.as_text(), "Hi there!");
        assert_eq!(
            outcome.metrics.stages_executed,
            vec![
                "parsing",
                "validating",
                "enriching",
                "main_processing",
                "responding"
            ]
        );
        assert!(outcome.details.context_operations.sources_used.is_empty());
        assert!(!outcome.details.degraded_mode);

        // Both turns persisted: inbound user plus assistant.
        assert_eq!(h.storage.count_messages("s1").await.unwrap(), 2);
        assert!(outcome.metrics.token_usage.total() > 0);
    }

    #[tokio::test]
    async fn second_turn_sees_history_in_the_window() {
        let h = harness();
        h.provider.push_text("first answer").await;
        run(&h, text_request("first question")).await.result.unwrap();

        h.provider.push_text("second answer").await;
        let outcome = run(&h, text_request("second question")).await;
        outcome.result.unwrap();
        assert!(outcome
            .details
            .context_operations
            .sources_used
            .iter()
            .any(|s| format!("{s:?}") == "History"));

        // The provider saw the prior exchange as system context.
        let requests = h.provider.requests().await;
        let system = requests.last().unwrap().system_prompt.clone().unwrap();
        assert!(system.contains("first question"));
        assert!(system.contains("first answer"));
    }

    #[tokio::test]
    async fn failing_memory_backend_degrades_but_succeeds() {
        let h = harness();
        h.similarity.set_failing(true);
        h.provider.push_text("still fine").await;

        let outcome = run(&h, text_request("Hello")).await;
        assert!(outcome.result.is_ok());
        assert!(outcome.details.degraded_mode);
        assert!(!outcome.details.degraded_sources.is_empty());
    }

    #[tokio::test]
    async fn invalid_role_fails_in_validating_with_timings_recorded() {
        let h = harness();
        let mut request = text_request("hi");
        request.message.role = Role::Assistant;

        let outcome = run(&h, request).await;
        let err = outcome.result.unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert_eq!(outcome.metrics.stages_executed, vec!["parsing", "validating"]);
        assert!(!outcome.metrics.stage_timings[1].completed);
        // Nothing persisted for a rejected request.
        assert_eq!(h.storage.count_messages("s1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn transient_provider_failures_are_retried() {
        let h = harness();
        h.provider.push_transient_error("reset").await;
        h.provider.push_transient_error("reset").await;
        h.provider.push_text("recovered").await;

        let outcome = run(&h, text_request("hi")).await;
        assert_eq!(outcome.result.unwrap().content.as_text(), "recovered");
        assert_eq!(h.provider.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn overall_deadline_yields_timeout_error() {
        let h = harness();
        h.provider
            .set_delay(std::time::Duration::from_secs(600))
            .await;

        let outcome = run(&h, text_request("hi")).await;
        let err = outcome.result.unwrap_err();
        assert_eq!(err.kind(), "timeout");
        assert_eq!(
            outcome.metrics.stages_executed.last().map(String::as_str),
            Some("main_processing")
        );
    }

    #[tokio::test]
    async fn streaming_forwards_deltas_and_produces_final_message() {
        let h = harness();
        h.provider.push_text("streamed reply").await;
        let mut request = text_request("hi");
        request.options.response.stream = true;

        let (tx, mut rx) = mpsc::channel(16);
        let outcome = h
            .processor
            .process(request, h.config.clone(), CancellationToken::new(), Some(tx))
            .await;

        assert_eq!(outcome.result.unwrap().content.as_text(), "streamed reply");
        assert_eq!(rx.recv().await.unwrap(), "streamed reply");
        assert!(outcome.metrics.token_usage.total() > 0);
    }

    #[tokio::test]
    async fn tool_call_executes_and_feeds_result_to_provider() {
        let h = harness();
        h.provider.push_text("the echo tool returned your data").await;

        let mut request = text_request("unused");
        request.message.content = MessageContent::ToolCall {
            name: "echo".into(),
            arguments: serde_json::json!({"value": 42}),
        };

        let outcome = run(&h, request).await;
        assert_eq!(
            outcome.result.unwrap().content.as_text(),
            "the echo tool returned your data"
        );
        assert_eq!(outcome.details.handler.as_deref(), Some("tool_call"));

        let requests = h.provider.requests().await;
        assert!(requests[0].messages[0].content.contains("echoed"));
    }

    #[tokio::test]
    async fn tool_loop_is_bounded_by_max_depth() {
        let h = harness();
        // The provider keeps asking for another tool round, forever.
        for _ in 0..10 {
            h.provider
                .push_text(r#"{"tool_call": {"name": "echo", "arguments": {"again": true}}}"#)
                .await;
        }
        let mut request = text_request("unused");
        request.message.content = MessageContent::ToolCall {
            name: "echo".into(),
            arguments: serde_json::json!({}),
        };

        let outcome = run(&h, request).await;
        let err = outcome.result.unwrap_err();
        assert_eq!(err.kind(), "provider");
        assert!(err.to_string().contains("depth limit"));
        assert_eq!(h.provider.call_count(), h.config.pipeline.max_tool_depth);
    }

    #[tokio::test]
    async fn unknown_tool_fails_the_request() {
        let h = harness();
        let mut request = text_request("unused");
        request.message.content = MessageContent::ToolCall {
            name: "no-such-tool".into(),
            arguments: serde_json::json!({}),
        };

        let outcome = run(&h, request).await;
        let err = outcome.result.unwrap_err();
        assert!(err.to_string().contains("unknown tool"));
    }

    #[tokio::test]
    async fn checkpoint_saved_when_requested() {
        let h = harness();
        h.provider.push_text("ok").await;
        let mut request = text_request("hi");
        request.options.state.save_checkpoint = true;

        let outcome = run(&h, request).await;
        outcome.result.unwrap();
        assert!(outcome.details.checkpoint_id.is_some());
    }

    struct NoopStage;

    #[async_trait]
    impl PipelineStage for NoopStage {
        fn name(&self) -> &'static str {
            "auditing"
        }

        async fn run(&self, _ctx: &mut ProcessingContext) -> Result<(), ParleyError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn stages_can_be_inserted_without_touching_the_driver() {
        let mut h = harness();
        h.processor
            .insert_stage_after("validating", Arc::new(NoopStage));
        h.provider.push_text("ok").await;

        let outcome = run(&h, text_request("hi")).await;
        outcome.result.unwrap();
        assert_eq!(
            outcome.metrics.stages_executed,
            vec![
                "parsing",
                "validating",
                "auditing",
                "enriching",
                "main_processing",
                "responding"
            ]
        );
    }
}
