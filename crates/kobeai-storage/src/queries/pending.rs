// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Offline send queue operations.
//!
//! Rows are never updated in place: a send is either still queued or deleted
//! after the server confirmed it.

use chrono::{DateTime, Utc};
use kobeai_core::{ConversationId, KobeError, PendingOfflineMessage};
use rusqlite::params;

use crate::database::Database;

/// Append a send to the queue and return the stored row.
pub async fn enqueue(
    db: &Database,
    conversation_id: ConversationId,
    content: &str,
    at: DateTime<Utc>,
) -> Result<PendingOfflineMessage, KobeError> {
    let content = content.to_string();
    db.connection()
        .call(move |conn| -> Result<PendingOfflineMessage, rusqlite::Error> {
            conn.execute(
                "INSERT INTO pending_messages (conversation_id, content, created_at)
                 VALUES (?1, ?2, ?3)",
                params![conversation_id.0, content, at.to_rfc3339()],
            )?;
            Ok(PendingOfflineMessage {
                id: conn.last_insert_rowid(),
                conversation_id,
                content,
                timestamp: at,
            })
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Every queued send, oldest first.
///
/// Rows whose timestamp cannot be parsed are returned with the Unix epoch so
/// they are still delivered.
pub async fn list(db: &Database) -> Result<Vec<PendingOfflineMessage>, KobeError> {
    db.connection()
        .call(|conn| -> Result<Vec<PendingOfflineMessage>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, content, created_at
                 FROM pending_messages
                 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map([], |row| {
                let created_at: String = row.get(3)?;
                Ok(PendingOfflineMessage {
                    id: row.get(0)?,
                    conversation_id: ConversationId(row.get(1)?),
                    content: row.get(2)?,
                    timestamp: DateTime::parse_from_rfc3339(&created_at)
                        .map(|t| t.with_timezone(&Utc))
                        .unwrap_or_default(),
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete one queued send. Returns whether a row was removed.
pub async fn remove(db: &Database, id: i64) -> Result<bool, KobeError> {
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let n = conn.execute("DELETE FROM pending_messages WHERE id = ?1", params![id])?;
            Ok(n > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete every queued send.
pub async fn clear(db: &Database) -> Result<usize, KobeError> {
    db.connection()
        .call(|conn| -> Result<usize, rusqlite::Error> {
            conn.execute("DELETE FROM pending_messages", [])
        })
        .await
        .map_err(crate::database::map_tr_err)
}
