// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Parley conversational context & memory pipeline.
//!
//! This crate provides the foundational trait definitions, error types,
//! domain types, and token estimation used throughout the Parley
//! workspace. External collaborators (LLM provider, similarity backend,
//! durable store, metrics sink) implement traits defined here.

pub mod error;
pub mod tokens;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{FieldError, ParleyError};
pub use types::{
    AdapterKind, HealthStatus, MemoryKind, Message, MessageContent, MessageId, ProcessingMetrics,
    RequestId, Role, SessionId, TokenUsage,
};

// Re-export all adapter traits at crate root.
pub use traits::{
    ObservabilityAdapter, PluginAdapter, ProviderAdapter, SimilarityAdapter, StorageAdapter,
};
