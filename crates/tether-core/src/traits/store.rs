// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable store trait for queued requests.

use async_trait::async_trait;

use crate::error::TetherError;
use crate::types::QueuedRequest;

/// Persistence backend owned exclusively by the offline queue.
#[async_trait]
pub trait RequestStore: Send + Sync + 'static {
    /// Persists a new entry keyed by its id.
    async fn insert(&self, request: &QueuedRequest) -> Result<(), TetherError>;

    /// Returns all entries ordered by enqueue timestamp, insertion order on ties.
    async fn list_ordered(&self) -> Result<Vec<QueuedRequest>, TetherError>;

    /// Deletes an entry. Deleting a missing id is not an error.
    async fn remove(&self, id: &str) -> Result<(), TetherError>;

    /// Increments the retry counter in place, returning the new value,
    /// or `None` if the entry no longer exists.
    async fn increment_retry(&self, id: &str) -> Result<Option<u32>, TetherError>;

    /// Deletes every entry, returning how many were removed.
    async fn clear(&self) -> Result<u64, TetherError>;

    /// Number of pending entries.
    async fn count(&self) -> Result<u64, TetherError>;
}
