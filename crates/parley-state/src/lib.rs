// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! State manager: durable session/shared variables with optimistic
//! versioning, checkpoints, and change notification.
//!
//! `set` is the only mutating operation and is linearizable per
//! `(scope, key)`: conflicting writers are serialized by a per-scope
//! lock and a stale version yields [`ParleyError::Conflict`], never a
//! silent overwrite or an automatic merge. Checkpoints are immutable
//! once created; restore replaces the live scope's variables
//! atomically.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info};

use parley_core::error::ParleyError;
use parley_core::traits::StorageAdapter;
use parley_core::types::{Checkpoint, StateSnapshot, VersionedValue};

/// Change events emitted after each successful mutation.
#[derive(Debug, Clone)]
pub enum StateChange {
    /// A variable was written at the given new version.
    Set {
        scope: String,
        key: String,
        version: u64,
    },
    /// A checkpoint was created for a scope.
    Checkpointed { scope: String, checkpoint_id: String },
    /// A scope was restored from a checkpoint.
    Restored { scope: String, checkpoint_id: String },
}

/// In-memory view of one scope's variables, loaded lazily from storage.
#[derive(Debug, Default)]
struct ScopeState {
    variables: BTreeMap<String, VersionedValue>,
    loaded: bool,
}

impl ScopeState {
    /// Highest version across the scope's variables.
    fn max_version(&self) -> u64 {
        self.variables.values().map(|v| v.version).max().unwrap_or(0)
    }
}

/// Durable key/value store of session and shared variables.
pub struct StateManager {
    storage: Arc<dyn StorageAdapter>,
    scopes: DashMap<String, Arc<Mutex<ScopeState>>>,
    changes: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Creates a state manager over the given storage adapter.
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            storage,
            scopes: DashMap::new(),
            changes,
        }
    }

    /// Subscribes to change notifications. Lagging receivers drop old
    /// events rather than blocking writers.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }

    /// Returns a variable's value and the version it must be written
    /// back at, or `None` if unset.
    pub async fn get(
        &self,
        scope: &str,
        key: &str,
    ) -> Result<Option<(serde_json::Value, u64)>, ParleyError> {
        let entry = self.scope_entry(scope);
        let mut state = entry.lock().await;
        self.ensure_loaded(scope, &mut state).await?;
        Ok(state
            .variables
            .get(key)
            .map(|v| (v.value.clone(), v.version)))
    }

    /// Returns an immutable snapshot of a scope's variables.
    pub async fn snapshot(&self, scope: &str) -> Result<StateSnapshot, ParleyError> {
        let entry = self.scope_entry(scope);
        let mut state = entry.lock().await;
        self.ensure_loaded(scope, &mut state).await?;
        Ok(StateSnapshot {
            scope: scope.to_string(),
            variables: state.variables.clone(),
        })
    }

    /// Writes a variable at the version the caller read it at.
    ///
    /// `expected_version` is 0 for a variable the caller believes does
    /// not exist yet. On a version mismatch the write is rejected with
    /// [`ParleyError::Conflict`]; the caller decides whether to
    /// re-read-and-retry. Returns the new version (always exactly one
    /// greater than the stored one).
    pub async fn set(
        &self,
        scope: &str,
        key: &str,
        value: serde_json::Value,
        expected_version: u64,
    ) -> Result<u64, ParleyError> {
        let entry = self.scope_entry(scope);
        let mut state = entry.lock().await;
        self.ensure_loaded(scope, &mut state).await?;

        let current = state.variables.get(key).map(|v| v.version).unwrap_or(0);
        if current != expected_version {
            return Err(ParleyError::Conflict {
                scope: scope.to_string(),
                key: key.to_string(),
                expected: expected_version,
                found: current,
            });
        }

        let new_version = current + 1;
        state.variables.insert(
            key.to_string(),
            VersionedValue {
                value,
                version: new_version,
            },
        );
        self.persist(scope, &state).await?;
        drop(state);

        debug!(scope, key, version = new_version, "state variable set");
        let _ = self.changes.send(StateChange::Set {
            scope: scope.to_string(),
            key: key.to_string(),
            version: new_version,
        });
        Ok(new_version)
    }

    /// Creates an immutable checkpoint of a scope and returns its id.
    pub async fn checkpoint(&self, scope: &str) -> Result<String, ParleyError> {
        let entry = self.scope_entry(scope);
        let mut state = entry.lock().await;
        self.ensure_loaded(scope, &mut state).await?;

        let checkpoint = Checkpoint {
            id: uuid::Uuid::new_v4().to_string(),
            scope: scope.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            variables: state.variables.clone(),
        };
        self.storage.save_checkpoint(&checkpoint).await?;
        drop(state);

        info!(scope, checkpoint_id = %checkpoint.id, "checkpoint created");
        let _ = self.changes.send(StateChange::Checkpointed {
            scope: scope.to_string(),
            checkpoint_id: checkpoint.id.clone(),
        });
        Ok(checkpoint.id)
    }

    /// Restores a scope from a checkpoint, replacing its live variables
    /// atomically (all-or-nothing under the scope lock).
    ///
    /// Restored variables keep versions monotonic: each is re-versioned
    /// past the live scope maximum so writers holding pre-restore
    /// versions still conflict.
    pub async fn restore(&self, checkpoint_id: &str) -> Result<(), ParleyError> {
        let checkpoint = self
            .storage
            .get_checkpoint(checkpoint_id)
            .await?
            .ok_or_else(|| {
                ParleyError::Internal(format!("checkpoint {checkpoint_id} not found"))
            })?;

        let entry = self.scope_entry(&checkpoint.scope);
        let mut state = entry.lock().await;
        self.ensure_loaded(&checkpoint.scope, &mut state).await?;

        let base = state.max_version();
        let restored: BTreeMap<String, VersionedValue> = checkpoint
            .variables
            .iter()
            .map(|(k, v)| {
                (
                    k.clone(),
                    VersionedValue {
                        value: v.value.clone(),
                        version: base + 1,
                    },
                )
            })
            .collect();
        state.variables = restored;
        self.persist(&checkpoint.scope, &state).await?;
        drop(state);

        info!(scope = %checkpoint.scope, checkpoint_id, "scope restored from checkpoint");
        let _ = self.changes.send(StateChange::Restored {
            scope: checkpoint.scope.clone(),
            checkpoint_id: checkpoint_id.to_string(),
        });
        Ok(())
    }

    fn scope_entry(&self, scope: &str) -> Arc<Mutex<ScopeState>> {
        self.scopes
            .entry(scope.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ScopeState::default())))
            .clone()
    }

    /// Loads a scope's persisted snapshot on first touch.
    async fn ensure_loaded(
        &self,
        scope: &str,
        state: &mut ScopeState,
    ) -> Result<(), ParleyError> {
        if state.loaded {
            return Ok(());
        }
        if let Some(snapshot) = self.storage.load_state_snapshot(scope).await? {
            state.variables = snapshot.variables;
        }
        state.loaded = true;
        Ok(())
    }

    async fn persist(&self, scope: &str, state: &ScopeState) -> Result<(), ParleyError> {
        self.storage
            .save_state_snapshot(&StateSnapshot {
                scope: scope.to_string(),
                variables: state.variables.clone(),
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_test_utils::MemoryStorage;
    use serde_json::json;

    fn manager() -> StateManager {
        StateManager::new(Arc::new(MemoryStorage::new()))
    }

    #[tokio::test]
    async fn set_increments_version_by_exactly_one() {
        let state = manager();
        let v1 = state.set("s1", "counter", json!(5), 0).await.unwrap();
        assert_eq!(v1, 1);
        let v2 = state.set("s1", "counter", json!(6), 1).await.unwrap();
        assert_eq!(v2, 2);

        let (value, version) = state.get("s1", "counter").await.unwrap().unwrap();
        assert_eq!(value, json!(6));
        assert_eq!(version, 2);
    }

    #[tokio::test]
    async fn stale_version_never_succeeds() {
        let state = manager();
        state.set("s1", "counter", json!(1), 0).await.unwrap();
        state.set("s1", "counter", json!(2), 1).await.unwrap();

        let err = state.set("s1", "counter", json!(99), 1).await.unwrap_err();
        match err {
            ParleyError::Conflict {
                expected, found, ..
            } => {
                assert_eq!(expected, 1);
                assert_eq!(found, 2);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        // The stale write left no trace.
        let (value, _) = state.get("s1", "counter").await.unwrap().unwrap();
        assert_eq!(value, json!(2));
    }

    #[tokio::test]
    async fn concurrent_writers_with_same_version_one_wins() {
        // Scenario E: two concurrent Set("session-1","counter",5,version=3)
        // where only one reads version 3 -- exactly one succeeds with
        // version 4, the other conflicts.
        let state = Arc::new(manager());
        for v in 1..=3u64 {
            state
                .set("session-1", "counter", json!(v), v - 1)
                .await
                .unwrap();
        }

        let a = {
            let state = state.clone();
            tokio::spawn(async move { state.set("session-1", "counter", json!(5), 3).await })
        };
        let b = {
            let state = state.clone();
            tokio::spawn(async move { state.set("session-1", "counter", json!(5), 3).await })
        };
        let (ra, rb) = (a.await.unwrap(), b.await.unwrap());

        let results = [&ra, &rb];
        let successes: Vec<_> = results.iter().filter(|r| r.is_ok()).collect();
        assert_eq!(successes.len(), 1, "exactly one writer must win");
        assert_eq!(*successes[0].as_ref().unwrap(), 4);
        let conflict = if ra.is_err() { ra } else { rb };
        assert!(matches!(
            conflict.unwrap_err(),
            ParleyError::Conflict { .. }
        ));
    }

    #[tokio::test]
    async fn checkpoint_restore_replaces_scope_atomically() {
        let state = manager();
        state.set("s1", "a", json!("one"), 0).await.unwrap();
        state.set("s1", "b", json!("two"), 0).await.unwrap();

        let cp = state.checkpoint("s1").await.unwrap();

        // Mutate after checkpointing.
        state.set("s1", "a", json!("changed"), 1).await.unwrap();
        state.set("s1", "c", json!("extra"), 0).await.unwrap();

        state.restore(&cp).await.unwrap();

        let snapshot = state.snapshot("s1").await.unwrap();
        assert_eq!(snapshot.variables["a"].value, json!("one"));
        assert_eq!(snapshot.variables["b"].value, json!("two"));
        assert!(
            !snapshot.variables.contains_key("c"),
            "variables created after the checkpoint are gone"
        );
    }

    #[tokio::test]
    async fn restore_keeps_versions_monotonic() {
        let state = manager();
        state.set("s1", "a", json!(1), 0).await.unwrap();
        let cp = state.checkpoint("s1").await.unwrap();
        state.set("s1", "a", json!(2), 1).await.unwrap();
        state.set("s1", "a", json!(3), 2).await.unwrap();

        state.restore(&cp).await.unwrap();

        let (_, version) = state.get("s1", "a").await.unwrap().unwrap();
        assert!(version > 3, "restored version must exceed live maximum");

        // A writer holding the pre-restore version still conflicts.
        let err = state.set("s1", "a", json!(9), 3).await.unwrap_err();
        assert!(matches!(err, ParleyError::Conflict { .. }));
    }

    #[tokio::test]
    async fn restore_unknown_checkpoint_fails() {
        let state = manager();
        assert!(state.restore("no-such-checkpoint").await.is_err());
    }

    #[tokio::test]
    async fn change_notifications_are_emitted() {
        let state = manager();
        let mut rx = state.subscribe();

        state.set("s1", "k", json!(1), 0).await.unwrap();
        match rx.recv().await.unwrap() {
            StateChange::Set {
                scope,
                key,
                version,
            } => {
                assert_eq!(scope, "s1");
                assert_eq!(key, "k");
                assert_eq!(version, 1);
            }
            other => panic!("expected set event, got {other:?}"),
        }

        let cp = state.checkpoint("s1").await.unwrap();
        assert!(matches!(
            rx.recv().await.unwrap(),
            StateChange::Checkpointed { .. }
        ));

        state.restore(&cp).await.unwrap();
        assert!(matches!(
            rx.recv().await.unwrap(),
            StateChange::Restored { .. }
        ));
    }

    #[tokio::test]
    async fn state_survives_reload_through_storage() {
        let storage = Arc::new(MemoryStorage::new());
        {
            let state = StateManager::new(storage.clone());
            state.set("s1", "k", json!("persisted"), 0).await.unwrap();
        }
        // A fresh manager over the same storage sees the snapshot.
        let state = StateManager::new(storage);
        let (value, version) = state.get("s1", "k").await.unwrap().unwrap();
        assert_eq!(value, json!("persisted"));
        assert_eq!(version, 1);
    }
}
