// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for the durable store behind messages, memory
//! items, and state snapshots/checkpoints.

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{Checkpoint, MemoryItem, MemoryKind, Message, StateSnapshot};

/// Adapter for persistence backends.
///
/// Storage adapters manage the lifecycle of the underlying store and
/// persist the three durable entities this pipeline reads and writes:
/// conversation messages, memory items, and state snapshots/checkpoints.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connections, etc.).
    async fn initialize(&self) -> Result<(), ParleyError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), ParleyError>;

    // --- Message operations ---

    /// Appends a message to its session's history.
    async fn insert_message(&self, message: &Message) -> Result<(), ParleyError>;

    /// Returns a session's messages, oldest first, optionally capped to
    /// the most recent `limit`.
    async fn get_messages(
        &self,
        session_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<Message>, ParleyError>;

    /// Returns the number of messages stored for a session.
    async fn count_messages(&self, session_id: &str) -> Result<i64, ParleyError>;

    // --- Memory operations ---

    /// Inserts or replaces a memory item.
    async fn upsert_memory(&self, item: &MemoryItem) -> Result<(), ParleyError>;

    /// Returns memory items for a scope, optionally filtered by kind.
    async fn list_memories(
        &self,
        scope: &str,
        kind: Option<MemoryKind>,
    ) -> Result<Vec<MemoryItem>, ParleyError>;

    /// Fetches memory items by id, preserving input order.
    async fn get_memories_by_ids(&self, ids: &[String]) -> Result<Vec<MemoryItem>, ParleyError>;

    /// Updates a memory item's importance and last-accessed timestamp.
    /// The only in-place mutation memory items permit.
    async fn update_memory_access(
        &self,
        id: &str,
        importance: f64,
        last_accessed_at: &str,
    ) -> Result<(), ParleyError>;

    /// Deletes memory items in a scope whose importance has decayed
    /// below `min_importance`. Returns the number pruned.
    async fn prune_memories(&self, scope: &str, min_importance: f64) -> Result<u64, ParleyError>;

    // --- State operations ---

    /// Persists the live snapshot for a scope (replaces any previous one).
    async fn save_state_snapshot(&self, snapshot: &StateSnapshot) -> Result<(), ParleyError>;

    /// Loads the live snapshot for a scope, if any.
    async fn load_state_snapshot(&self, scope: &str)
    -> Result<Option<StateSnapshot>, ParleyError>;

    /// Persists an immutable checkpoint.
    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), ParleyError>;

    /// Loads a checkpoint by id.
    async fn get_checkpoint(&self, id: &str) -> Result<Option<Checkpoint>, ParleyError>;
}
