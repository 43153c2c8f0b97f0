// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key-value slot operations.

use kobeai_core::KobeError;
use rusqlite::{OptionalExtension, params};

use crate::database::Database;

/// Read a slot. Returns `None` when the key was never written.
pub async fn get(db: &Database, key: &str) -> Result<Option<String>, KobeError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<String>, rusqlite::Error> {
            conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Insert or overwrite a slot.
pub async fn set(db: &Database, key: &str, value: &str) -> Result<(), KobeError> {
    let key = key.to_string();
    let value = value.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![key, value],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete a slot. Deleting a missing key is not an error.
pub async fn remove(db: &Database, key: &str) -> Result<(), KobeError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn set_get_overwrite_remove() {
        let (db, _dir) = setup_db().await;

        assert_eq!(get(&db, "token").await.unwrap(), None);

        set(&db, "token", "abc").await.unwrap();
        assert_eq!(get(&db, "token").await.unwrap().as_deref(), Some("abc"));

        set(&db, "token", "def").await.unwrap();
        assert_eq!(get(&db, "token").await.unwrap().as_deref(), Some("def"));

        remove(&db, "token").await.unwrap();
        assert_eq!(get(&db, "token").await.unwrap(), None);

        remove(&db, "token").await.unwrap();
        db.close().await.unwrap();
    }
}
