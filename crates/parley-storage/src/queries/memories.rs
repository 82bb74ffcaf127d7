// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory item persistence.

use rusqlite::params;

use parley_core::error::ParleyError;
use parley_core::types::{MemoryItem, MemoryKind};

use crate::database::{map_tr_err, Database};
use crate::queries::codec_err;

type MemoryRow = (String, String, String, String, String, f64, String, String);

const MEMORY_COLUMNS: &str =
    "id, scope, kind, content, embedding_ref, importance, created_at, last_accessed_at";

fn decode(row: MemoryRow) -> Result<MemoryItem, ParleyError> {
    let (id, scope, kind, content, embedding_ref, importance, created_at, last_accessed_at) = row;
    Ok(MemoryItem {
        id,
        scope,
        kind: kind.parse().map_err(codec_err)?,
        content,
        embedding_ref,
        importance,
        created_at,
        last_accessed_at,
    })
}

fn row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

/// Insert or replace a memory item by id.
pub async fn upsert_memory(db: &Database, item: &MemoryItem) -> Result<(), ParleyError> {
    let item = item.clone();
    let kind = item.kind.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO memory_items
                 (id, scope, kind, content, embedding_ref, importance, created_at, last_accessed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    item.id,
                    item.scope,
                    kind,
                    item.content,
                    item.embedding_ref,
                    item.importance,
                    item.created_at,
                    item.last_accessed_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// List a scope's memory items, oldest first, optionally by kind.
pub async fn list_memories(
    db: &Database,
    scope: &str,
    kind: Option<MemoryKind>,
) -> Result<Vec<MemoryItem>, ParleyError> {
    let scope = scope.to_string();
    let kind = kind.map(|k| k.to_string());
    let rows: Vec<MemoryRow> = db
        .connection()
        .call(move |conn| {
            let mut rows = Vec::new();
            match kind {
                Some(kind) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {MEMORY_COLUMNS} FROM memory_items
                         WHERE scope = ?1 AND kind = ?2
                         ORDER BY created_at ASC, id ASC"
                    ))?;
                    let mapped = stmt.query_map(params![scope, kind], row_mapper)?;
                    for row in mapped {
                        rows.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {MEMORY_COLUMNS} FROM memory_items
                         WHERE scope = ?1
                         ORDER BY created_at ASC, id ASC"
                    ))?;
                    let mapped = stmt.query_map(params![scope], row_mapper)?;
                    for row in mapped {
                        rows.push(row?);
                    }
                }
            }
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)?;

    rows.into_iter().map(decode).collect()
}

/// Fetch memory items by id, preserving input order. Unknown ids are
/// skipped.
pub async fn get_memories_by_ids(
    db: &Database,
    ids: &[String],
) -> Result<Vec<MemoryItem>, ParleyError> {
    let ids = ids.to_vec();
    let rows: Vec<MemoryRow> = db
        .connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MEMORY_COLUMNS} FROM memory_items WHERE id = ?1"
            ))?;
            let mut rows = Vec::new();
            for id in &ids {
                let mut mapped = stmt.query_map(params![id], row_mapper)?;
                if let Some(row) = mapped.next() {
                    rows.push(row?);
                }
            }
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)?;

    rows.into_iter().map(decode).collect()
}

/// Update a memory item's importance and last-accessed timestamp.
pub async fn update_memory_access(
    db: &Database,
    id: &str,
    importance: f64,
    last_accessed_at: &str,
) -> Result<(), ParleyError> {
    let id = id.to_string();
    let last_accessed_at = last_accessed_at.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE memory_items SET importance = ?2, last_accessed_at = ?3 WHERE id = ?1",
                params![id, importance, last_accessed_at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Delete a scope's items below the importance floor. Returns the
/// number deleted.
pub async fn prune_memories(
    db: &Database,
    scope: &str,
    min_importance: f64,
) -> Result<u64, ParleyError> {
    let scope = scope.to_string();
    db.connection()
        .call(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM memory_items WHERE scope = ?1 AND importance < ?2",
                params![scope, min_importance],
            )?;
            Ok(deleted as u64)
        })
        .await
        .map_err(map_tr_err)
}
