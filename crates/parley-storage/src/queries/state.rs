// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! State snapshot and checkpoint persistence.
//!
//! Variables are stored as one JSON document per scope. Snapshots are
//! replaced in place; checkpoints are immutable rows.

use rusqlite::params;

use parley_core::error::ParleyError;
use parley_core::types::{Checkpoint, StateSnapshot};

use crate::database::{map_tr_err, Database};
use crate::queries::codec_err;

/// Replace the live snapshot for a scope.
pub async fn save_state_snapshot(db: &Database, snapshot: &StateSnapshot) -> Result<(), ParleyError> {
    let scope = snapshot.scope.clone();
    let variables = serde_json::to_string(&snapshot.variables).map_err(codec_err)?;
    let updated_at = chrono_now();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO state_snapshots (scope, variables, updated_at)
                 VALUES (?1, ?2, ?3)",
                params![scope, variables, updated_at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Load the live snapshot for a scope, if any.
pub async fn load_state_snapshot(
    db: &Database,
    scope: &str,
) -> Result<Option<StateSnapshot>, ParleyError> {
    let scope = scope.to_string();
    let row: Option<(String, String)> = db
        .connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare("SELECT scope, variables FROM state_snapshots WHERE scope = ?1")?;
            let mut mapped = stmt.query_map(params![scope], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?;
            Ok(mapped.next().transpose()?)
        })
        .await
        .map_err(map_tr_err)?;

    row.map(|(scope, variables)| {
        Ok(StateSnapshot {
            scope,
            variables: serde_json::from_str(&variables).map_err(codec_err)?,
        })
    })
    .transpose()
}

/// Persist an immutable checkpoint.
pub async fn save_checkpoint(db: &Database, checkpoint: &Checkpoint) -> Result<(), ParleyError> {
    let id = checkpoint.id.clone();
    let scope = checkpoint.scope.clone();
    let variables = serde_json::to_string(&checkpoint.variables).map_err(codec_err)?;
    let created_at = checkpoint.created_at.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO checkpoints (id, scope, variables, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, scope, variables, created_at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch a checkpoint by id.
pub async fn get_checkpoint(db: &Database, id: &str) -> Result<Option<Checkpoint>, ParleyError> {
    let id = id.to_string();
    let row: Option<(String, String, String, String)> = db
        .connection()
        .call(move |conn| {
            let mut stmt = conn
                .prepare("SELECT id, scope, variables, created_at FROM checkpoints WHERE id = ?1")?;
            let mut mapped = stmt.query_map(params![id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?;
            Ok(mapped.next().transpose()?)
        })
        .await
        .map_err(map_tr_err)?;

    row.map(|(id, scope, variables, created_at)| {
        Ok(Checkpoint {
            id,
            scope,
            variables: serde_json::from_str(&variables).map_err(codec_err)?,
            created_at,
        })
    })
    .transpose()
}

fn chrono_now() -> String {
    chrono::Utc::now().to_rfc3339()
}
