// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queued request operations.

use std::collections::BTreeMap;

use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Row, params};

use tether_core::{QueuedRequest, TetherError};

use crate::database::{Database, map_tr_err};

/// Persist a new entry.
pub async fn insert(db: &Database, request: &QueuedRequest) -> Result<(), TetherError> {
    let headers = serde_json::to_string(&request.headers)?;
    let request = request.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO queued_requests
                    (id, url, method, headers, body, timestamp, retry_count, max_retries)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    request.id,
                    request.url,
                    request.method,
                    headers,
                    request.body,
                    request.timestamp,
                    request.retry_count,
                    request.max_retries,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// All entries, oldest first. Entries sharing a timestamp keep insertion order.
pub async fn list_ordered(db: &Database) -> Result<Vec<QueuedRequest>, TetherError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, url, method, headers, body, timestamp, retry_count, max_retries
                 FROM queued_requests
                 ORDER BY timestamp ASC, seq ASC",
            )?;
            let rows = stmt.query_map([], row_to_request)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Delete one entry. Missing ids are ignored.
pub async fn remove(db: &Database, id: &str) -> Result<(), TetherError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute("DELETE FROM queued_requests WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Bump `retry_count` and return the new value, `None` if the entry is gone.
pub async fn increment_retry(db: &Database, id: &str) -> Result<Option<u32>, TetherError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "UPDATE queued_requests SET retry_count = retry_count + 1
                 WHERE id = ?1
                 RETURNING retry_count",
                params![id],
                |row| row.get::<_, u32>(0),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Delete every entry and return how many rows went.
pub async fn clear(db: &Database) -> Result<u64, TetherError> {
    db.connection()
        .call(|conn| {
            let removed = conn.execute("DELETE FROM queued_requests", [])?;
            Ok(removed as u64)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn count(db: &Database) -> Result<u64, TetherError> {
    db.connection()
        .call(|conn| {
            conn.query_row("SELECT COUNT(*) FROM queued_requests", [], |row| {
                row.get::<_, i64>(0)
            })
        })
        .await
        .map(|n| n.max(0) as u64)
        .map_err(map_tr_err)
}

fn row_to_request(row: &Row<'_>) -> rusqlite::Result<QueuedRequest> {
    let headers_json: String = row.get(3)?;
    let headers: BTreeMap<String, String> = serde_json::from_str(&headers_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    Ok(QueuedRequest {
        id: row.get(0)?,
        url: row.get(1)?,
        method: row.get(2)?,
        headers,
        body: row.get(4)?,
        timestamp: row.get(5)?,
        retry_count: row.get(6)?,
        max_retries: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tether_core::RequestOptions;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn request(ts: i64) -> QueuedRequest {
        let options = RequestOptions::new("put")
            .header("authorization", "Bearer t")
            .body(r#"{"done":true}"#);
        QueuedRequest::new("https://api.example.com/tasks/1", options, 3, ts)
    }

    #[tokio::test]
    async fn insert_and_list_preserves_every_field() {
        let (db, _dir) = setup_db().await;
        let req = request(1_000);
        insert(&db, &req).await.unwrap();

        let listed = list_ordered(&db).await.unwrap();
        assert_eq!(listed, vec![req]);
    }

    #[tokio::test]
    async fn list_orders_by_timestamp_then_insertion() {
        let (db, _dir) = setup_db().await;
        let late = request(3_000);
        let tie_a = request(1_000);
        let tie_b = request(1_000);
        for r in [&late, &tie_a, &tie_b] {
            insert(&db, r).await.unwrap();
        }

        let ids: Vec<String> = list_ordered(&db)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![tie_a.id, tie_b.id, late.id]);
    }

    #[tokio::test]
    async fn increment_retry_returns_new_count() {
        let (db, _dir) = setup_db().await;
        let req = request(1);
        insert(&db, &req).await.unwrap();

        assert_eq!(increment_retry(&db, &req.id).await.unwrap(), Some(1));
        assert_eq!(increment_retry(&db, &req.id).await.unwrap(), Some(2));
        assert_eq!(increment_retry(&db, "missing").await.unwrap(), None);
        assert_eq!(list_ordered(&db).await.unwrap()[0].retry_count, 2);
    }

    #[tokio::test]
    async fn remove_and_clear() {
        let (db, _dir) = setup_db().await;
        let a = request(1);
        let b = request(2);
        let c = request(3);
        for r in [&a, &b, &c] {
            insert(&db, r).await.unwrap();
        }

        remove(&db, &b.id).await.unwrap();
        remove(&db, "not-there").await.unwrap();
        assert_eq!(count(&db).await.unwrap(), 2);

        assert_eq!(clear(&db).await.unwrap(), 2);
        assert_eq!(count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected() {
        let (db, _dir) = setup_db().await;
        let req = request(1);
        insert(&db, &req).await.unwrap();
        assert!(matches!(
            insert(&db, &req).await,
            Err(TetherError::Storage { .. })
        ));
    }
}
