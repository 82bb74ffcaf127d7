// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for Parley's external collaborators.
//!
//! The LLM provider, similarity-search backend, durable store, and
//! metrics sink are consumed through these narrow interfaces. All
//! adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod observability;
pub mod provider;
pub mod similarity;
pub mod storage;

pub use adapter::PluginAdapter;
pub use observability::ObservabilityAdapter;
pub use provider::ProviderAdapter;
pub use similarity::SimilarityAdapter;
pub use storage::StorageAdapter;
