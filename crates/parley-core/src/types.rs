// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the Parley pipeline crates.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Unique identifier for a conversation session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

/// Unique identifier for a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

/// Correlation identifier attached to every log line, metric, and error
/// produced on behalf of one inbound request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    /// Generates a fresh random request id.
    pub fn generate() -> Self {
        Self(uuid_v4())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The speaker of one conversation turn.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// Message payload, tagged by content kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    /// Plain conversational text.
    Text { text: String },
    /// Arbitrary structured payload (forms, cards, rich data).
    Structured { data: serde_json::Value },
    /// A request from the model to invoke a named tool.
    ToolCall {
        name: String,
        arguments: serde_json::Value,
    },
    /// The output of a tool invocation, fed back to the model.
    ToolResult {
        name: String,
        output: serde_json::Value,
    },
}

impl MessageContent {
    /// Renders the content as plain text for token estimation and
    /// provider prompts.
    pub fn as_text(&self) -> String {
        match self {
            MessageContent::Text { text } => text.clone(),
            MessageContent::Structured { data } => data.to_string(),
            MessageContent::ToolCall { name, arguments } => {
                format!("[tool call: {name} {arguments}]")
            }
            MessageContent::ToolResult { name, output } => {
                format!("[tool result: {name} {output}]")
            }
        }
    }
}

/// One turn in a conversation.
///
/// Immutable once persisted, except for append-only metadata enrichment
/// (e.g. attaching processing details after generation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub session_id: String,
    pub role: Role,
    pub content: MessageContent,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// Optional append-only metadata map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl Message {
    /// Appends a metadata entry, creating the map on first use.
    /// Existing entries are never overwritten.
    pub fn enrich_metadata(&mut self, key: &str, value: serde_json::Value) {
        let map = self.metadata.get_or_insert_with(Default::default);
        map.entry(key.to_string()).or_insert(value);
    }
}

/// Token accounting for a provider call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    /// Prompt plus completion tokens.
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }

    /// Accumulates usage from another call (e.g. tool-call loop turns).
    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }
}

/// Timing record for one executed pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: String,
    pub duration_ms: u64,
    /// `true` if the stage completed, `false` if it failed.
    pub completed: bool,
}

/// Per-request processing record attached to the response for
/// observability. Never used for control flow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingMetrics {
    pub request_id: String,
    /// Stage names in execution order.
    pub stages_executed: Vec<String>,
    pub stage_timings: Vec<StageTiming>,
    pub token_usage: TokenUsage,
    pub total_duration_ms: u64,
}

impl ProcessingMetrics {
    /// Records a stage execution, keeping `stages_executed` in order.
    pub fn record_stage(&mut self, stage: &str, duration_ms: u64, completed: bool) {
        self.stages_executed.push(stage.to_string());
        self.stage_timings.push(StageTiming {
            stage: stage.to_string(),
            duration_ms,
            completed,
        });
    }
}

// --- Adapter identity types ---

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind the plugin base trait.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterKind {
    Provider,
    Storage,
    Similarity,
    Observability,
}

// --- Provider types ---

/// One message in a provider prompt, already rendered to text by the
/// context structurer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderMessage {
    pub role: Role,
    pub content: String,
}

/// A request to an LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub messages: Vec<ProviderMessage>,
    pub max_tokens: u32,
    pub stream: bool,
}

/// A complete response from an LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub id: String,
    pub content: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    pub usage: TokenUsage,
}

/// Event kinds in a provider response stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEventType {
    MessageStart,
    ContentDelta,
    MessageDelta,
    MessageStop,
}

/// A single chunk from a streaming provider response.
#[derive(Debug, Clone)]
pub struct ProviderStreamChunk {
    pub event_type: StreamEventType,
    pub text: Option<String>,
    pub usage: Option<TokenUsage>,
    pub stop_reason: Option<String>,
}

// --- Memory types ---

/// Memory scope: conversation-local or long-term.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MemoryKind {
    /// Scoped to a single conversation's recent history, summarized for reuse.
    Episodic,
    /// Long-term, cross-conversation memory promoted from episodic by importance.
    Semantic,
}

/// A durable unit of recall.
///
/// Never mutated in place except for access-timestamp and importance
/// updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: String,
    /// Owning agent/conversation scope.
    pub scope: String,
    pub kind: MemoryKind,
    pub content: String,
    /// Reference key into the similarity backend's index.
    pub embedding_ref: String,
    /// Importance/decay weight in [0, 1].
    pub importance: f64,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 last-accessed timestamp.
    pub last_accessed_at: String,
}

/// A hit returned by the similarity backend.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityHit {
    pub memory_id: String,
    /// Relevance score in [0, 1].
    pub score: f64,
}

// --- State types ---

/// A named variable value with its monotonically increasing version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedValue {
    pub value: serde_json::Value,
    pub version: u64,
}

/// Named variables scoped to an agent/session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub scope: String,
    pub variables: std::collections::BTreeMap<String, VersionedValue>,
}

/// An immutable, timestamped copy of a [`StateSnapshot`] that can be
/// restored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub scope: String,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    pub variables: std::collections::BTreeMap<String, VersionedValue>,
}

// --- Observability types ---

/// A metric or telemetry event forwarded to an optional sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricEvent {
    pub name: String,
    pub value: f64,
    pub labels: Vec<(String, String)>,
}

/// Generates a random v4 UUID string.
pub fn uuid_v4() -> String {
    // Kept as a free function so callers do not need the uuid crate
    // directly.
    uuid::Uuid::new_v4().to_string()
}
