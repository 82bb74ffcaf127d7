// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Episodic and semantic memory for Parley.
//!
//! The [`MemoryManager`] retrieves relevant memories for a query
//! (degrading gracefully when the similarity backend is down),
//! consolidates recent conversation turns into episodic memories via
//! the configured summarization model, promotes durable episodic items
//! into semantic memory, and decays and prunes the rest.

pub mod consolidation;
pub mod manager;

pub use manager::{ConsolidationOutcome, MemoryManager, RetrievalOutcome, RetrievedMemory};
