// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the RequestStore trait.

use async_trait::async_trait;
use tracing::debug;

use tether_config::model::StorageConfig;
use tether_core::{QueuedRequest, RequestStore, TetherError};

use crate::database::Database;
use crate::queries::requests;

/// SQLite-backed request store.
///
/// Entries survive process restarts: a store reopened on the same path
/// sees everything that was inserted and not yet removed.
pub struct SqliteRequestStore {
    db: Database,
}

impl SqliteRequestStore {
    /// Open the store described by `config`.
    pub async fn open(config: &StorageConfig) -> Result<Self, TetherError> {
        let db = Database::open_with(&config.database_path, config.wal_mode).await?;
        debug!(path = %config.database_path, "SQLite request store initialized");
        Ok(Self { db })
    }

    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Checkpoint and release the database.
    pub async fn close(&self) -> Result<(), TetherError> {
        self.db.close().await
    }
}

#[async_trait]
impl RequestStore for SqliteRequestStore {
    async fn insert(&self, request: &QueuedRequest) -> Result<(), TetherError> {
        requests::insert(&self.db, request).await
    }

    async fn list_ordered(&self) -> Result<Vec<QueuedRequest>, TetherError> {
        requests::list_ordered(&self.db).await
    }

    async fn remove(&self, id: &str) -> Result<(), TetherError> {
        requests::remove(&self.db, id).await
    }

    async fn increment_retry(&self, id: &str) -> Result<Option<u32>, TetherError> {
        requests::increment_retry(&self.db, id).await
    }

    async fn clear(&self) -> Result<u64, TetherError> {
        requests::clear(&self.db).await
    }

    async fn count(&self) -> Result<u64, TetherError> {
        requests::count(&self.db).await
    }
}
