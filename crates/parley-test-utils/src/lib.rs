// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Parley integration tests.
//!
//! Provides deterministic mock adapters (provider, similarity backend)
//! and an in-memory storage adapter so component and integration tests
//! run fast and without external services.

pub mod memory_storage;
pub mod mock_provider;
pub mod mock_similarity;

pub use memory_storage::MemoryStorage;
pub use mock_provider::{MockOutcome, MockProvider};
pub use mock_similarity::MockSimilarity;
