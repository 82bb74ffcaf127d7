// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Version adapter between legacy and structured protocol shapes.
//!
//! Order of operations per request: the global rollback flag is checked
//! first, before version detection; then the shape is detected, legacy
//! requests are upgraded with explicit defaults, and feature flags from
//! the immutable config snapshot force disabled behaviors off before
//! the request enters the pipeline.

use parley_core::error::{FieldError, ParleyError};
use parley_core::types::{MessageContent, Role};
use parley_config::ParleyConfig;
use parley_config::model::{CompatConfig, MemoryConfig, StateConfig};
use serde_json::Value;
use tracing::debug;

use crate::legacy::{LegacyAgentRef, LegacyRequest, LegacyResponse, flatten_content};
use crate::schema::{
    MemoryOptions, PROTOCOL_VERSION, RequestMessage, RequestOptions, ResponseOptions,
    ResponseStatus, StateOptions, StructuredRequest, StructuredResponse,
};

/// The wire shape a request arrived in (and its response must leave in).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireVersion {
    Legacy,
    Structured,
}

/// Converts between legacy and structured shapes and applies the
/// deployment's feature-flag table.
pub struct VersionAdapter {
    compat: CompatConfig,
    memory_defaults: MemoryConfig,
    state_defaults: StateConfig,
}

impl VersionAdapter {
    /// Creates an adapter bound to one immutable config snapshot.
    pub fn new(config: &ParleyConfig) -> Self {
        Self {
            compat: config.compat.clone(),
            memory_defaults: config.memory.clone(),
            state_defaults: config.state.clone(),
        }
    }

    /// Detects the wire shape of a raw request.
    ///
    /// The global rollback flag wins over the caller's declared version:
    /// when set, all traffic is treated as legacy.
    pub fn detect_version(&self, raw: &Value) -> WireVersion {
        if self.compat.rollback_to_legacy {
            debug!("rollback flag set, forcing legacy path");
            return WireVersion::Legacy;
        }
        if raw.get("version").is_some() {
            WireVersion::Structured
        } else {
            WireVersion::Legacy
        }
    }

    /// Normalizes a raw request into the structured shape.
    ///
    /// Legacy requests are upgraded with every optional field filled
    /// with an explicit default; structured requests are deserialized
    /// with per-field errors for missing required fields. Feature flags
    /// are applied in both cases.
    pub fn to_structured(
        &self,
        raw: Value,
    ) -> Result<(StructuredRequest, WireVersion), ParleyError> {
        let wire = self.detect_version(&raw);
        let mut request = match wire {
            WireVersion::Legacy => {
                let legacy: LegacyRequest =
                    serde_json::from_value(raw).map_err(|e| ParleyError::Validation {
                        errors: vec![FieldError::new("body", e.to_string())],
                    })?;
                self.upgrade_legacy(legacy)
            }
            WireVersion::Structured => deserialize_structured(raw)?,
        };
        self.apply_feature_flags(&mut request);
        Ok((request, wire))
    }

    /// Upgrades a legacy request, filling every option group with an
    /// explicit default so downstream stages never branch on "was this
    /// legacy".
    fn upgrade_legacy(&self, legacy: LegacyRequest) -> StructuredRequest {
        StructuredRequest {
            version: PROTOCOL_VERSION.to_string(),
            agent_id: legacy.agent_id,
            session_id: None,
            message: RequestMessage {
                role: Role::User,
                content: MessageContent::Text {
                    text: legacy.message,
                },
            },
            options: RequestOptions {
                response: ResponseOptions {
                    stream: false,
                    include_metadata: true,
                    include_metrics: true,
                },
                memory: MemoryOptions {
                    enabled: self.memory_defaults.enabled,
                    kinds: Vec::new(),
                    max_results: self.memory_defaults.max_results,
                    min_relevance: self.memory_defaults.min_relevance,
                },
                state: StateOptions {
                    save_checkpoint: self.state_defaults.checkpoint_on_save,
                    include_shared: self.state_defaults.include_shared,
                },
            },
        }
    }

    /// Forces options off for behaviors disabled by feature flags.
    /// Checked once per request against the config snapshot.
    fn apply_feature_flags(&self, request: &mut StructuredRequest) {
        if !self.compat.memory_enrichment && request.options.memory.enabled {
            debug!("memory_enrichment flag disabled, forcing memory off");
            request.options.memory.enabled = false;
        }
        if !self.compat.state_checkpoints && request.options.state.save_checkpoint {
            debug!("state_checkpoints flag disabled, forcing checkpoint off");
            request.options.state.save_checkpoint = false;
        }
        if !self.compat.processing_details && request.options.response.include_metadata {
            debug!("processing_details flag disabled, forcing metadata off");
            request.options.response.include_metadata = false;
        }
        if !self.compat.streaming && request.options.response.stream {
            debug!("streaming flag disabled, forcing stream off");
            request.options.response.stream = false;
        }
    }

    /// Flattens a structured response into the legacy shape.
    pub fn to_legacy_response(
        &self,
        response: &StructuredResponse,
        agent_id: &str,
    ) -> LegacyResponse {
        let (message, error) = match response.status {
            ResponseStatus::Success => (
                response
                    .data
                    .as_ref()
                    .map(|d| flatten_content(&d.message.content))
                    .unwrap_or_default(),
                None,
            ),
            ResponseStatus::Error => {
                let err = response.error.as_ref();
                (
                    err.map(|e| e.message.clone()).unwrap_or_default(),
                    Some(err.map(|e| e.kind.clone()).unwrap_or_default()),
                )
            }
        };
        LegacyResponse {
            message,
            agent: LegacyAgentRef {
                id: agent_id.to_string(),
            },
            error,
            metrics: response.metrics.clone(),
            processing_details: response.processing_details.clone(),
        }
    }
}

/// Deserializes a structured request with field-level errors for the
/// required top-level fields.
fn deserialize_structured(raw: Value) -> Result<StructuredRequest, ParleyError> {
    let mut errors = Vec::new();
    for field in ["version", "agent_id", "message"] {
        if raw.get(field).is_none() {
            errors.push(FieldError::new(field, "is required"));
        }
    }
    if !errors.is_empty() {
        return Err(ParleyError::Validation { errors });
    }
    serde_json::from_value(raw).map_err(|e| ParleyError::Validation {
        errors: vec![FieldError::new("body", e.to_string())],
    })
}
