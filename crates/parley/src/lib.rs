// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Parley service: version adaptation, schema validation, and the
//! message processor behind one entry point.
//!
//! `ChatService` owns the immutable config snapshot (swapped atomically
//! on reload), rebuilds the pipeline wiring from that snapshot, and
//! answers raw JSON requests in whichever wire shape they arrived in.
//! Background memory consolidation is spawned here so it never blocks
//! a request.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parley_compat::{
    validate, ResponseData, ResponseError, ResponseStatus, StructuredResponse, VersionAdapter,
    WireVersion, PROTOCOL_VERSION,
};
use parley_config::ParleyConfig;
use parley_context::ContextEngine;
use parley_core::error::ParleyError;
use parley_core::traits::provider::ProviderAdapter;
use parley_core::traits::similarity::SimilarityAdapter;
use parley_core::traits::storage::StorageAdapter;
use parley_core::types::uuid_v4;
use parley_memory::MemoryManager;
use parley_pipeline::MessageProcessor;
use parley_state::StateManager;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything derived from one config snapshot.
///
/// Requests hold one `Arc<ServiceInner>` for their whole lifetime, so a
/// reload mid-request never changes behavior halfway through.
struct ServiceInner {
    config: Arc<ParleyConfig>,
    processor: MessageProcessor,
    memory: Arc<MemoryManager>,
}

/// The top-level chat service.
pub struct ChatService {
    inner: ArcSwap<ServiceInner>,
    storage: Arc<dyn StorageAdapter>,
    provider: Arc<dyn ProviderAdapter>,
    similarity: Arc<dyn SimilarityAdapter>,
    state: Arc<StateManager>,
    tools: HashMap<String, Arc<dyn ToolExecutor>>,
}

impl ChatService {
    pub fn new(
        config: ParleyConfig,
        storage: Arc<dyn StorageAdapter>,
        provider: Arc<dyn ProviderAdapter>,
        similarity: Arc<dyn SimilarityAdapter>,
        tools: HashMap<String, Arc<dyn ToolExecutor>>,
    ) -> Self {
        // State locks and subscribers survive config reloads.
        let state = Arc::new(StateManager::new(storage.clone()));
        let inner = build_inner(
            Arc::new(config),
            &storage,
            &provider,
            &similarity,
            &state,
            &tools,
        );
        Self {
            inner: ArcSwap::from_pointee(inner),
            storage,
            provider,
            similarity,
            state,
            tools,
        }
    }

    /// Swaps in a new config snapshot. In-flight requests finish on
    /// the snapshot they started with.
    pub fn reload(&self, config: ParleyConfig) {
        let inner = build_inner(
            Arc::new(config),
            &self.storage,
            &self.provider,
            &self.similarity,
            &self.state,
            &self.tools,
        );
        self.inner.store(Arc::new(inner));
        info!("configuration reloaded");
    }

    /// The shared state manager (checkpoint/restore surface).
    pub fn state(&self) -> Arc<StateManager> {
        self.state.clone()
    }

    /// Handles one raw JSON request end to end, returning the response
    /// in the wire shape the request arrived in.
    pub async fn handle(&self, raw: Value) -> Value {
        self.handle_with(raw, CancellationToken::new(), None).await
    }

    /// [`handle`](Self::handle) with explicit cancellation and an
    /// optional streaming chunk channel.
    pub async fn handle_with(
        &self,
        raw: Value,
        cancel: CancellationToken,
        chunks: Option<mpsc::Sender<String>>,
    ) -> Value {
        let inner = self.inner.load_full();
        let adapter = VersionAdapter::new(&inner.config);
        let wire = adapter.detect_version(&raw);
        let legacy_agent = legacy_agent_id(&raw);

        let request = match adapter.to_structured(raw) {
            Ok((request, _)) => request,
            Err(e) => {
                let response = error_response(&e, &uuid_v4());
                return render(&adapter, wire, &legacy_agent, response);
            }
        };

        if let Err(errors) = validate(&request) {
            let e = ParleyError::Validation { errors };
            let response = error_response(&e, &uuid_v4());
            return render(&adapter, wire, &request.agent_id, response);
        }

        let agent_id = request.agent_id.clone();
        let scope = request.session();
        let options = request.options.response.clone();
        let outcome = inner
            .processor
            .process(request, inner.config.clone(), cancel, chunks)
            .await;

        let request_id = outcome.metrics.request_id.clone();
        let include_details =
            options.include_metadata && inner.config.compat.processing_details;
        let details = include_details
            .then(|| serde_json::to_value(&outcome.details).ok())
            .flatten();

        let response = match outcome.result {
            Ok(message) => {
                self.spawn_consolidation(&inner, scope);
                StructuredResponse {
                    version: PROTOCOL_VERSION.to_string(),
                    status: ResponseStatus::Success,
                    data: Some(ResponseData { message }),
                    error: None,
                    metrics: options.include_metrics.then_some(outcome.metrics),
                    processing_details: details,
                }
            }
            Err(e) => StructuredResponse {
                version: PROTOCOL_VERSION.to_string(),
                status: ResponseStatus::Error,
                data: None,
                error: Some(to_response_error(&e, &request_id)),
                metrics: options.include_metrics.then_some(outcome.metrics),
                processing_details: details,
            },
        };

        render(&adapter, wire, &agent_id, response)
    }

    /// Runs consolidation off the request path when the turn cadence
    /// is due. Failures are logged, never surfaced.
    fn spawn_consolidation(&self, inner: &Arc<ServiceInner>, scope: String) {
        let memory = inner.memory.clone();
        tokio::spawn(async move {
            match memory.should_consolidate(&scope).await {
                Ok(true) => match memory.consolidate(&scope).await {
                    Ok(outcome) => debug!(
                        scope,
                        created = outcome.created.len(),
                        promoted = outcome.promoted,
                        pruned = outcome.pruned,
                        "memory consolidation complete"
                    ),
                    Err(e) => warn!(scope, error = %e, "memory consolidation failed"),
                },
                Ok(false) => {}
                Err(e) => warn!(scope, error = %e, "consolidation cadence check failed"),
            }
        });
    }
}

fn build_inner(
    config: Arc<ParleyConfig>,
    storage: &Arc<dyn StorageAdapter>,
    provider: &Arc<dyn ProviderAdapter>,
    similarity: &Arc<dyn SimilarityAdapter>,
    state: &Arc<StateManager>,
    tools: &HashMap<String, Arc<dyn ToolExecutor>>,
) -> ServiceInner {
    let memory = Arc::new(MemoryManager::new(
        storage.clone(),
        similarity.clone(),
        provider.clone(),
        config.memory.clone(),
    ));
    let engine = Arc::new(ContextEngine::new(
        storage.clone(),
        memory.clone(),
        config.context.clone(),
    ));
    let processor = MessageProcessor::new(
        storage.clone(),
        provider.clone(),
        engine,
        state.clone(),
        tools.clone(),
    );
    ServiceInner {
        config,
        processor,
        memory,
    }
}

fn to_response_error(e: &ParleyError, request_id: &str) -> ResponseError {
    let fields = match e {
        ParleyError::Validation { errors } => errors.clone(),
        _ => Vec::new(),
    };
    ResponseError {
        kind: e.kind().to_string(),
        message: e.to_string(),
        request_id: request_id.to_string(),
        fields,
    }
}

fn error_response(e: &ParleyError, request_id: &str) -> StructuredResponse {
    StructuredResponse {
        version: PROTOCOL_VERSION.to_string(),
        status: ResponseStatus::Error,
        data: None,
        error: Some(to_response_error(e, request_id)),
        metrics: None,
        processing_details: None,
    }
}

/// Serializes the response in the request's wire shape.
fn render(
    adapter: &VersionAdapter,
    wire: WireVersion,
    agent_id: &str,
    response: StructuredResponse,
) -> Value {
    let value = match wire {
        WireVersion::Structured => serde_json::to_value(&response),
        WireVersion::Legacy => {
            serde_json::to_value(adapter.to_legacy_response(&response, agent_id))
        }
    };
    // Response types serialize infallibly; guard anyway.
    value.unwrap_or_else(|e| {
        warn!(error = %e, "response serialization failed");
        serde_json::json!({
            "version": PROTOCOL_VERSION,
            "status": "error",
            "error": {"kind": "internal", "message": "response serialization failed"}
        })
    })
}

/// Best-effort agent id for rendering legacy-shaped failures.
fn legacy_agent_id(raw: &Value) -> String {
    raw.get("agentId")
        .or_else(|| raw.get("agent_id"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

// Re-exported for binary and integration-test wiring.
pub use parley_compat::LegacyResponse;
pub use parley_pipeline::ToolExecutor;
