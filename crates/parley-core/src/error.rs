// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Parley conversational pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single field-level validation failure.
///
/// Callers must be able to render per-field feedback, so validation
/// never collapses into a single opaque message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Dotted path of the offending field (e.g. `options.memory.min_relevance`).
    pub field: String,
    /// Human-readable description of the constraint that failed.
    pub message: String,
}

impl FieldError {
    /// Creates a field error for the given dotted path.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// The primary error type used across all Parley crates.
///
/// Degraded-mode conditions (e.g. an unavailable memory backend) are NOT
/// errors; they are recorded in processing details and logged as warnings
/// while the pipeline continues.
#[derive(Debug, Error)]
pub enum ParleyError {
    /// Request failed schema or business validation. Returned to the
    /// caller with per-field detail, never retried.
    #[error("validation failed: {}", format_field_errors(errors))]
    Validation { errors: Vec<FieldError> },

    /// Optimistic-concurrency conflict on a state variable. The caller
    /// must re-read and retry; the pipeline never auto-retries.
    #[error("version conflict on {scope}/{key}: expected {expected}, found {found}")]
    Conflict {
        scope: String,
        key: String,
        expected: u64,
        found: u64,
    },

    /// Deadline exceeded. Partial work is discarded or tagged incomplete.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// LLM provider call failed. Transient failures are retried a bounded
    /// number of times with backoff; others are surfaced.
    #[error("provider error: {message}")]
    Provider {
        message: String,
        transient: bool,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Storage backend errors (connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Configuration errors (invalid TOML, missing required fields).
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal or unexpected errors. Fatal for the request only, never
    /// the process.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ParleyError {
    /// Convenience constructor for a non-transient provider failure.
    pub fn provider(message: impl Into<String>) -> Self {
        ParleyError::Provider {
            message: message.into(),
            transient: false,
            source: None,
        }
    }

    /// Convenience constructor for a transient (retryable) provider failure.
    pub fn provider_transient(message: impl Into<String>) -> Self {
        ParleyError::Provider {
            message: message.into(),
            transient: true,
            source: None,
        }
    }

    /// Whether this error may be retried with backoff.
    ///
    /// Only network-class provider failures qualify; validation errors,
    /// conflicts, and timeouts are never retried by the pipeline.
    pub fn is_transient(&self) -> bool {
        matches!(self, ParleyError::Provider { transient: true, .. })
    }

    /// Stable kind label used for metrics and outbound error status.
    pub fn kind(&self) -> &'static str {
        match self {
            ParleyError::Validation { .. } => "validation",
            ParleyError::Conflict { .. } => "conflict",
            ParleyError::Timeout { .. } => "timeout",
            ParleyError::Provider { .. } => "provider",
            ParleyError::Storage { .. } => "storage",
            ParleyError::Config(_) => "config",
            ParleyError::Internal(_) => "internal",
        }
    }
}

fn format_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
