// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use parley_config::model::StorageConfig;
use parley_core::error::ParleyError;
use parley_core::traits::adapter::PluginAdapter;
use parley_core::traits::storage::StorageAdapter;
use parley_core::types::{
    AdapterKind, Checkpoint, HealthStatus, MemoryItem, MemoryKind, Message, StateSnapshot,
};

use crate::database::{map_tr_err, Database};
use crate::queries;

/// SQLite-backed storage adapter.
///
/// Wraps a [`Database`] handle and delegates all query operations to
/// the typed query modules. The database is lazily initialized on the
/// first call to [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage with the given configuration.
    ///
    /// The database connection is not opened until `initialize` is
    /// called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    fn db(&self) -> Result<&Database, ParleyError> {
        self.db.get().ok_or_else(|| ParleyError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        if let Some(db) = self.db.get() {
            db.close().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), ParleyError> {
        let db = Database::open(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| ParleyError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), ParleyError> {
        self.db()?.close().await
    }

    // --- Message operations ---

    async fn insert_message(&self, message: &Message) -> Result<(), ParleyError> {
        queries::messages::insert_message(self.db()?, message).await
    }

    async fn get_messages(
        &self,
        session_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<Message>, ParleyError> {
        queries::messages::get_messages_for_session(self.db()?, session_id, limit).await
    }

    async fn count_messages(&self, session_id: &str) -> Result<i64, ParleyError> {
        queries::messages::count_messages(self.db()?, session_id).await
    }

    // --- Memory operations ---

    async fn upsert_memory(&self, item: &MemoryItem) -> Result<(), ParleyError> {
        queries::memories::upsert_memory(self.db()?, item).await
    }

    async fn list_memories(
        &self,
        scope: &str,
        kind: Option<MemoryKind>,
    ) -> Result<Vec<MemoryItem>, ParleyError> {
        queries::memories::list_memories(self.db()?, scope, kind).await
    }

    async fn get_memories_by_ids(&self, ids: &[String]) -> Result<Vec<MemoryItem>, ParleyError> {
        queries::memories::get_memories_by_ids(self.db()?, ids).await
    }

    async fn update_memory_access(
        &self,
        id: &str,
        importance: f64,
        last_accessed_at: &str,
    ) -> Result<(), ParleyError> {
        queries::memories::update_memory_access(self.db()?, id, importance, last_accessed_at).await
    }

    async fn prune_memories(&self, scope: &str, min_importance: f64) -> Result<u64, ParleyError> {
        queries::memories::prune_memories(self.db()?, scope, min_importance).await
    }

    // --- State operations ---

    async fn save_state_snapshot(&self, snapshot: &StateSnapshot) -> Result<(), ParleyError> {
        queries::state::save_state_snapshot(self.db()?, snapshot).await
    }

    async fn load_state_snapshot(
        &self,
        scope: &str,
    ) -> Result<Option<StateSnapshot>, ParleyError> {
        queries::state::load_state_snapshot(self.db()?, scope).await
    }

    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), ParleyError> {
        queries::state::save_checkpoint(self.db()?, checkpoint).await
    }

    async fn get_checkpoint(&self, id: &str) -> Result<Option<Checkpoint>, ParleyError> {
        queries::state::get_checkpoint(self.db()?, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::types::{MessageContent, Role};
    use tempfile::tempdir;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
        }
    }

    #[tokio::test]
    async fn sqlite_storage_implements_plugin_adapter() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        assert_eq!(storage.name(), "sqlite");
        assert_eq!(storage.version(), semver::Version::new(0, 1, 0));
        assert_eq!(storage.kind(), AdapterKind::Storage);
    }

    #[tokio::test]
    async fn initialize_opens_database_at_configured_path() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("init_test.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        storage.initialize().await.unwrap();
        assert!(db_path.exists(), "database file should be created");
    }

    #[tokio::test]
    async fn initialize_twice_returns_error() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("double_init.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        storage.initialize().await.unwrap();
        assert!(storage.initialize().await.is_err());
    }

    #[tokio::test]
    async fn operations_fail_before_initialize() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("no_init.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        assert!(storage.health_check().await.is_err());
        assert!(storage.count_messages("s1").await.is_err());
    }

    #[tokio::test]
    async fn full_lifecycle_through_adapter() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("lifecycle.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));
        storage.initialize().await.unwrap();
        assert_eq!(storage.health_check().await.unwrap(), HealthStatus::Healthy);

        let message = Message {
            id: "m1".to_string(),
            session_id: "s1".to_string(),
            role: Role::User,
            content: MessageContent::Text {
                text: "hello".to_string(),
            },
            metadata: None,
            created_at: "2026-01-01T00:00:01Z".to_string(),
        };
        storage.insert_message(&message).await.unwrap();
        assert_eq!(storage.count_messages("s1").await.unwrap(), 1);

        let item = MemoryItem {
            id: "mem-1".to_string(),
            scope: "s1".to_string(),
            kind: MemoryKind::Episodic,
            content: "prefers brevity".to_string(),
            embedding_ref: "mem-1".to_string(),
            importance: 0.6,
            created_at: "2026-01-01T00:00:02Z".to_string(),
            last_accessed_at: "2026-01-01T00:00:02Z".to_string(),
        };
        storage.upsert_memory(&item).await.unwrap();
        let memories = storage.list_memories("s1", None).await.unwrap();
        assert_eq!(memories.len(), 1);

        let snapshot = StateSnapshot {
            scope: "s1".to_string(),
            variables: Default::default(),
        };
        storage.save_state_snapshot(&snapshot).await.unwrap();
        assert!(storage.load_state_snapshot("s1").await.unwrap().is_some());

        storage.shutdown().await.unwrap();
    }
}
