// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM-based consolidation of conversation history into memory items.
//!
//! Recent turns are summarized by the configured consolidation model
//! into standalone factual statements, which become episodic memories.
//! Parsing is defensive: a malformed model response yields an empty
//! fact list rather than an error, so a bad summarization never fails
//! the surrounding pass.

use parley_core::types::{Message, Role};
use serde::Deserialize;
use tracing::{debug, warn};

/// System prompt for the consolidation model.
const CONSOLIDATION_PROMPT: &str = r#"Summarize this conversation into factual statements worth remembering for future conversations. Output as JSON array.

For each fact:
- "content": The fact as a standalone statement (e.g., "The user's dog is named Max")
- "importance": How important the fact is, from 0.0 to 1.0

Only include facts that are:
1. Stated by the user (not the assistant)
2. Specific and factual (not opinions unless explicitly stated as preferences)
3. Likely to be relevant in future conversations

If nothing is worth remembering, return an empty array: []

Conversation:
{conversation}

Output JSON array only, no explanation:"#;

/// A fact produced by the consolidation model.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsolidatedFact {
    pub content: String,
    #[serde(default = "default_importance")]
    pub importance: f64,
}

fn default_importance() -> f64 {
    0.6
}

/// Build the consolidation prompt from recent conversation messages.
///
/// Tool calls and structured payloads are flattened through
/// [`parley_core::types::MessageContent::as_text`] so the model sees a
/// plain transcript.
pub fn build_consolidation_prompt(messages: &[Message]) -> String {
    let mut conversation_text = String::new();
    for message in messages {
        let role = match message.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::System => "System",
            Role::Tool => "Tool",
        };
        let text = message.content.as_text();
        if !text.is_empty() {
            conversation_text.push_str(&format!("{role}: {text}\n"));
        }
    }
    CONSOLIDATION_PROMPT.replace("{conversation}", &conversation_text)
}

/// Parse the consolidation response into structured facts.
///
/// Handles JSON arrays, markdown code block wrapping, and surrounding
/// prose. Returns an empty Vec on parse failure. Importance values are
/// clamped into [0, 1].
pub fn parse_consolidation_response(response: &str) -> Vec<ConsolidatedFact> {
    let trimmed = response.trim();

    // Locate the JSON array whether or not it is wrapped in a code block.
    let start = trimmed.find('[').unwrap_or(0);
    let end = trimmed.rfind(']').map(|i| i + 1).unwrap_or(trimmed.len());
    let json_str = &trimmed[start..end];

    match serde_json::from_str::<Vec<ConsolidatedFact>>(json_str) {
        Ok(mut facts) => {
            for fact in &mut facts {
                fact.importance = fact.importance.clamp(0.0, 1.0);
            }
            facts.retain(|f| !f.content.trim().is_empty());
            facts
        }
        Err(e) => {
            warn!("failed to parse consolidation response: {e}");
            debug!("raw response: {response}");
            Vec::new()
        }
    }
}
