// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Legacy (flat) wire shapes kept for old clients.
//!
//! The legacy request is `{ agentId, message }` with a plain string
//! message; the legacy response flattens the structured message,
//! metrics, and processing details into the old shape.

use parley_core::types::{MessageContent, ProcessingMetrics};
use serde::{Deserialize, Serialize};

/// The minimal legacy request shape, auto-upgraded on receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyRequest {
    pub agent_id: String,
    pub message: String,
}

/// Agent reference embedded in legacy responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyAgentRef {
    pub id: String,
}

/// The flat legacy response shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyResponse {
    /// Assistant message text. On errors, the error message.
    pub message: String,
    pub agent: LegacyAgentRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ProcessingMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_details: Option<serde_json::Value>,
}

/// Extracts the flat text of a message content for legacy clients.
pub fn flatten_content(content: &MessageContent) -> String {
    match content {
        MessageContent::Text { text } => text.clone(),
        other => other.as_text(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_request_uses_camel_case() {
        let req: LegacyRequest =
            serde_json::from_str(r#"{"agentId": "a1", "message": "hi"}"#).unwrap();
        assert_eq!(req.agent_id, "a1");
        assert_eq!(req.message, "hi");

        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("agentId").is_some());
        assert!(json.get("agent_id").is_none());
    }

    #[test]
    fn flatten_preserves_plain_text() {
        let content = MessageContent::Text {
            text: "Hello there".into(),
        };
        assert_eq!(flatten_content(&content), "Hello there");
    }

    #[test]
    fn legacy_response_omits_absent_extras() {
        let resp = LegacyResponse {
            message: "ok".into(),
            agent: LegacyAgentRef { id: "a1".into() },
            error: None,
            metrics: None,
            processing_details: None,
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("metrics").is_none());
        assert!(json.get("processing_details").is_none());
    }
}
