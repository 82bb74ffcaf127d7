// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory storage adapter for fast tests.
//!
//! Implements the full `StorageAdapter` contract over mutex-guarded
//! maps; behavior matches the SQLite adapter closely enough that
//! component tests can run against either.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use parley_core::error::ParleyError;
use parley_core::traits::adapter::PluginAdapter;
use parley_core::traits::storage::StorageAdapter;
use parley_core::types::{
    AdapterKind, Checkpoint, HealthStatus, MemoryItem, MemoryKind, Message, StateSnapshot,
};

#[derive(Default)]
struct Inner {
    // session_id -> messages, oldest first
    messages: HashMap<String, Vec<Message>>,
    memories: HashMap<String, MemoryItem>,
    snapshots: HashMap<String, StateSnapshot>,
    checkpoints: HashMap<String, Checkpoint>,
}

/// Mutex-guarded in-memory storage.
pub struct MemoryStorage {
    inner: Mutex<Inner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MemoryStorage {
    fn name(&self) -> &str {
        "memory-storage"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for MemoryStorage {
    async fn initialize(&self) -> Result<(), ParleyError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), ParleyError> {
        Ok(())
    }

    async fn insert_message(&self, message: &Message) -> Result<(), ParleyError> {
        self.inner
            .lock()
            .await
            .messages
            .entry(message.session_id.clone())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn get_messages(
        &self,
        session_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<Message>, ParleyError> {
        let inner = self.inner.lock().await;
        let all = inner.messages.get(session_id).cloned().unwrap_or_default();
        Ok(match limit {
            Some(n) if (n as usize) < all.len() => all[all.len() - n as usize..].to_vec(),
            _ => all,
        })
    }

    async fn count_messages(&self, session_id: &str) -> Result<i64, ParleyError> {
        let inner = self.inner.lock().await;
        Ok(inner.messages.get(session_id).map(|v| v.len()).unwrap_or(0) as i64)
    }

    async fn upsert_memory(&self, item: &MemoryItem) -> Result<(), ParleyError> {
        self.inner
            .lock()
            .await
            .memories
            .insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn list_memories(
        &self,
        scope: &str,
        kind: Option<MemoryKind>,
    ) -> Result<Vec<MemoryItem>, ParleyError> {
        let inner = self.inner.lock().await;
        let mut items: Vec<MemoryItem> = inner
            .memories
            .values()
            .filter(|m| m.scope == scope && kind.is_none_or(|k| m.kind == k))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn get_memories_by_ids(&self, ids: &[String]) -> Result<Vec<MemoryItem>, ParleyError> {
        let inner = self.inner.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| inner.memories.get(id).cloned())
            .collect())
    }

    async fn update_memory_access(
        &self,
        id: &str,
        importance: f64,
        last_accessed_at: &str,
    ) -> Result<(), ParleyError> {
        let mut inner = self.inner.lock().await;
        if let Some(item) = inner.memories.get_mut(id) {
            item.importance = importance;
            item.last_accessed_at = last_accessed_at.to_string();
        }
        Ok(())
    }

    async fn prune_memories(&self, scope: &str, min_importance: f64) -> Result<u64, ParleyError> {
        let mut inner = self.inner.lock().await;
        let before = inner.memories.len();
        inner
            .memories
            .retain(|_, m| m.scope != scope || m.importance >= min_importance);
        Ok((before - inner.memories.len()) as u64)
    }

    async fn save_state_snapshot(&self, snapshot: &StateSnapshot) -> Result<(), ParleyError> {
        self.inner
            .lock()
            .await
            .snapshots
            .insert(snapshot.scope.clone(), snapshot.clone());
        Ok(())
    }

    async fn load_state_snapshot(
        &self,
        scope: &str,
    ) -> Result<Option<StateSnapshot>, ParleyError> {
        Ok(self.inner.lock().await.snapshots.get(scope).cloned())
    }

    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), ParleyError> {
        self.inner
            .lock()
            .await
            .checkpoints
            .insert(checkpoint.id.clone(), checkpoint.clone());
        Ok(())
    }

    async fn get_checkpoint(&self, id: &str) -> Result<Option<Checkpoint>, ParleyError> {
        Ok(self.inner.lock().await.checkpoints.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::types::{MessageContent, Role};

    fn message(session: &str, n: usize) -> Message {
        Message {
            id: format!("m{n}"),
            session_id: session.to_string(),
            role: Role::User,
            content: MessageContent::Text {
                text: format!("turn {n}"),
            },
            created_at: format!("2026-01-01T00:00:{n:02}Z"),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn messages_keep_insertion_order_and_limit_takes_newest() {
        let storage = MemoryStorage::new();
        for n in 0..5 {
            storage.insert_message(&message("s1", n)).await.unwrap();
        }
        let all = storage.get_messages("s1", None).await.unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].id, "m0");

        let recent = storage.get_messages("s1", Some(2)).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, "m3");
        assert_eq!(recent[1].id, "m4");

        assert_eq!(storage.count_messages("s1").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn memory_listing_filters_by_scope_and_kind() {
        let storage = MemoryStorage::new();
        let item = |id: &str, scope: &str, kind| MemoryItem {
            id: id.to_string(),
            scope: scope.to_string(),
            kind,
            content: "fact".into(),
            embedding_ref: id.to_string(),
            importance: 0.5,
            created_at: "2026-01-01T00:00:00Z".into(),
            last_accessed_at: "2026-01-01T00:00:00Z".into(),
        };
        storage
            .upsert_memory(&item("a", "s1", MemoryKind::Episodic))
            .await
            .unwrap();
        storage
            .upsert_memory(&item("b", "s1", MemoryKind::Semantic))
            .await
            .unwrap();
        storage
            .upsert_memory(&item("c", "s2", MemoryKind::Episodic))
            .await
            .unwrap();

        let all = storage.list_memories("s1", None).await.unwrap();
        assert_eq!(all.len(), 2);
        let episodic = storage
            .list_memories("s1", Some(MemoryKind::Episodic))
            .await
            .unwrap();
        assert_eq!(episodic.len(), 1);
        assert_eq!(episodic[0].id, "a");
    }

    #[tokio::test]
    async fn prune_removes_low_importance_items_in_scope_only() {
        let storage = MemoryStorage::new();
        let mut item = MemoryItem {
            id: "low".into(),
            scope: "s1".into(),
            kind: MemoryKind::Episodic,
            content: "fading".into(),
            embedding_ref: "low".into(),
            importance: 0.01,
            created_at: "2026-01-01T00:00:00Z".into(),
            last_accessed_at: "2026-01-01T00:00:00Z".into(),
        };
        storage.upsert_memory(&item).await.unwrap();
        item.id = "other-scope".into();
        item.scope = "s2".into();
        storage.upsert_memory(&item).await.unwrap();

        let pruned = storage.prune_memories("s1", 0.05).await.unwrap();
        assert_eq!(pruned, 1);
        assert_eq!(storage.list_memories("s2", None).await.unwrap().len(), 1);
    }
}
