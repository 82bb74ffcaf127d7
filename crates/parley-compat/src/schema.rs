// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Structured request/response wire shapes and the schema validator.
//!
//! Validation is pure and side-effect-free. It fails with a list of
//! field-level errors rather than a single message so callers can
//! render per-field feedback.

use parley_core::error::FieldError;
use parley_core::types::{MemoryKind, MessageContent, ProcessingMetrics, Role};
use serde::{Deserialize, Serialize};

/// The protocol version this deployment speaks natively.
pub const PROTOCOL_VERSION: &str = "2.0.0";

/// An inbound structured request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredRequest {
    /// Semver protocol version declared by the caller.
    pub version: String,
    /// Target agent identifier.
    pub agent_id: String,
    /// Conversation session; defaults to the agent's primary session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// The message to process.
    pub message: RequestMessage,
    /// Processing options. The version adapter fills every sub-group
    /// with explicit defaults so downstream stages never branch on
    /// "was this legacy".
    #[serde(default)]
    pub options: RequestOptions,
}

impl StructuredRequest {
    /// The session this request addresses (explicit or agent-primary).
    pub fn session(&self) -> String {
        self.session_id
            .clone()
            .unwrap_or_else(|| format!("{}-primary", self.agent_id))
    }
}

/// The message portion of a structured request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMessage {
    pub role: Role,
    pub content: MessageContent,
}

/// All option groups, present with defaults after adaptation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestOptions {
    #[serde(default)]
    pub response: ResponseOptions,
    #[serde(default)]
    pub memory: MemoryOptions,
    #[serde(default)]
    pub state: StateOptions,
}

/// Response shaping options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseOptions {
    #[serde(default)]
    pub stream: bool,
    #[serde(default = "default_true")]
    pub include_metadata: bool,
    #[serde(default = "default_true")]
    pub include_metrics: bool,
}

impl Default for ResponseOptions {
    fn default() -> Self {
        Self {
            stream: false,
            include_metadata: true,
            include_metrics: true,
        }
    }
}

/// Memory enrichment options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryOptions {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Memory kinds to retrieve from; empty means both.
    #[serde(default)]
    pub kinds: Vec<MemoryKind>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_min_relevance")]
    pub min_relevance: f64,
}

impl Default for MemoryOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            kinds: Vec::new(),
            max_results: default_max_results(),
            min_relevance: default_min_relevance(),
        }
    }
}

/// State handling options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateOptions {
    #[serde(default)]
    pub save_checkpoint: bool,
    #[serde(default = "default_true")]
    pub include_shared: bool,
}

impl Default for StateOptions {
    fn default() -> Self {
        Self {
            save_checkpoint: false,
            include_shared: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_results() -> usize {
    10
}

fn default_min_relevance() -> f64 {
    0.3
}

/// Outcome status of a structured response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// An outbound structured response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredResponse {
    pub version: String,
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ProcessingMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_details: Option<serde_json::Value>,
}

/// Payload of a successful response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseData {
    pub message: parley_core::types::Message,
}

/// Machine-readable error payload, field-level where applicable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseError {
    /// Stable error kind (`validation`, `conflict`, `timeout`, ...).
    pub kind: String,
    pub message: String,
    /// Request correlation id for logs/metrics.
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
}

/// Validates a structured request against the versioned contract.
///
/// Returns the request unchanged on success, or every field-level error
/// found. Pure: no logging, no side effects.
pub fn validate(request: &StructuredRequest) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();

    match semver::Version::parse(&request.version) {
        Ok(v) => {
            let supported = semver::Version::parse(PROTOCOL_VERSION)
                .map(|s| v.major <= s.major)
                .unwrap_or(false);
            if !supported {
                errors.push(FieldError::new(
                    "version",
                    format!("unsupported major version {} (max {PROTOCOL_VERSION})", v),
                ));
            }
        }
        Err(_) => {
            errors.push(FieldError::new(
                "version",
                format!("`{}` is not a valid semver string", request.version),
            ));
        }
    }

    if request.agent_id.trim().is_empty() {
        errors.push(FieldError::new("agent_id", "is required"));
    }

    if let MessageContent::Text { text } = &request.message.content
        && text.trim().is_empty()
    {
        errors.push(FieldError::new("message.content.text", "must not be empty"));
    }

    if let MessageContent::ToolCall { name, .. } = &request.message.content
        && name.trim().is_empty()
    {
        errors.push(FieldError::new("message.content.name", "must not be empty"));
    }

    let memory = &request.options.memory;
    if !(0.0..=1.0).contains(&memory.min_relevance) {
        errors.push(FieldError::new(
            "options.memory.min_relevance",
            format!("must be in [0, 1], got {}", memory.min_relevance),
        ));
    }
    if memory.max_results == 0 {
        errors.push(FieldError::new(
            "options.memory.max_results",
            "must be greater than 0",
        ));
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> StructuredRequest {
        StructuredRequest {
            version: PROTOCOL_VERSION.to_string(),
            agent_id: "a1".into(),
            session_id: None,
            message: RequestMessage {
                role: Role::User,
                content: MessageContent::Text {
                    text: "Hello".into(),
                },
            },
            options: RequestOptions::default(),
        }
    }

    #[test]
    fn valid_request_passes() {
        assert!(validate(&valid_request()).is_ok());
    }

    #[test]
    fn all_field_errors_are_collected() {
        let mut req = valid_request();
        req.version = "not-semver".into();
        req.agent_id = " ".into();
        req.options.memory.min_relevance = 1.5;
        req.options.memory.max_results = 0;

        let errors = validate(&req).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(errors.len(), 4);
        assert!(fields.contains(&"version"));
        assert!(fields.contains(&"agent_id"));
        assert!(fields.contains(&"options.memory.min_relevance"));
        assert!(fields.contains(&"options.memory.max_results"));
    }

    #[test]
    fn empty_text_is_rejected() {
        let mut req = valid_request();
        req.message.content = MessageContent::Text { text: "  ".into() };
        let errors = validate(&req).unwrap_err();
        assert_eq!(errors[0].field, "message.content.text");
    }

    #[test]
    fn future_major_version_is_rejected() {
        let mut req = valid_request();
        req.version = "99.0.0".into();
        assert!(validate(&req).is_err());
    }

    #[test]
    fn session_falls_back_to_agent_primary() {
        let req = valid_request();
        assert_eq!(req.session(), "a1-primary");

        let mut explicit = valid_request();
        explicit.session_id = Some("s-42".into());
        assert_eq!(explicit.session(), "s-42");
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let json = serde_json::json!({
            "version": "2.0.0",
            "agent_id": "a1",
            "message": {"role": "user", "content": {"type": "text", "text": "hi"}}
        });
        let req: StructuredRequest = serde_json::from_value(json).unwrap();
        assert!(req.options.memory.enabled);
        assert!(!req.options.response.stream);
        assert!(!req.options.state.save_checkpoint);
    }
}
