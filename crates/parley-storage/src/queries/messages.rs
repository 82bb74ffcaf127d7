// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message CRUD operations.

use rusqlite::params;

use parley_core::error::ParleyError;
use parley_core::types::Message;

use crate::database::{map_tr_err, Database};
use crate::queries::codec_err;

type MessageRow = (String, String, String, String, Option<String>, String);

fn decode(row: MessageRow) -> Result<Message, ParleyError> {
    let (id, session_id, role, content, metadata, created_at) = row;
    Ok(Message {
        id,
        session_id,
        role: role.parse().map_err(codec_err)?,
        content: serde_json::from_str(&content).map_err(codec_err)?,
        metadata: metadata
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(codec_err)?,
        created_at,
    })
}

/// Insert a new message.
pub async fn insert_message(db: &Database, msg: &Message) -> Result<(), ParleyError> {
    let id = msg.id.clone();
    let session_id = msg.session_id.clone();
    let role = msg.role.to_string();
    let content = serde_json::to_string(&msg.content).map_err(codec_err)?;
    let metadata = msg
        .metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(codec_err)?;
    let created_at = msg.created_at.clone();

    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO messages (id, session_id, role, content, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, session_id, role, content, metadata, created_at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get messages for a session in chronological order. A limit keeps
/// the most recent messages, still returned oldest first.
pub async fn get_messages_for_session(
    db: &Database,
    session_id: &str,
    limit: Option<i64>,
) -> Result<Vec<Message>, ParleyError> {
    let session_id = session_id.to_string();
    let rows: Vec<MessageRow> = db
        .connection()
        .call(move |conn| {
            let mut rows = Vec::new();
            match limit {
                Some(lim) => {
                    let mut stmt = conn.prepare(
                        "SELECT id, session_id, role, content, metadata, created_at
                         FROM messages WHERE session_id = ?1
                         ORDER BY created_at DESC, id DESC LIMIT ?2",
                    )?;
                    let mapped = stmt.query_map(params![session_id, lim], |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                        ))
                    })?;
                    for row in mapped {
                        rows.push(row?);
                    }
                    rows.reverse();
                }
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT id, session_id, role, content, metadata, created_at
                         FROM messages WHERE session_id = ?1
                         ORDER BY created_at ASC, id ASC",
                    )?;
                    let mapped = stmt.query_map(params![session_id], |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                        ))
                    })?;
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

/// Count messages in a session.
pub async fn count_messages(db: &Database, session_id: &str) -> Result<i64, ParleyError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
        .await
        .map_err(map_tr_err)
}
