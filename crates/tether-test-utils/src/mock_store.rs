// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory request store for deterministic queue tests.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use tether_core::{QueuedRequest, RequestStore, TetherError};

/// `RequestStore` backed by a `Vec` in insertion order.
///
/// `set_failing(true)` makes every call return a storage error until reset.
#[derive(Debug, Default)]
pub struct MemoryRequestStore {
    entries: Mutex<Vec<QueuedRequest>>,
    failing: AtomicBool,
}

impl MemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Snapshot of the stored entries in insertion order.
    pub async fn entries(&self) -> Vec<QueuedRequest> {
        self.entries.lock().await.clone()
    }

    fn check(&self) -> Result<(), TetherError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TetherError::Storage {
                source: "memory store set to fail".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RequestStore for MemoryRequestStore {
    async fn insert(&self, request: &QueuedRequest) -> Result<(), TetherError> {
        self.check()?;
        let mut entries = self.entries.lock().await;
        entries.retain(|e| e.id != request.id);
        entries.push(request.clone());
        Ok(())
    }

    async fn list_ordered(&self) -> Result<Vec<QueuedRequest>, TetherError> {
        self.check()?;
        let mut entries = self.entries.lock().await.clone();
        entries.sort_by_key(|e| e.timestamp);
        Ok(entries)
    }

    async fn remove(&self, id: &str) -> Result<(), TetherError> {
        self.check()?;
        self.entries.lock().await.retain(|e| e.id != id);
        Ok(())
    }

    async fn increment_retry(&self, id: &str) -> Result<Option<u32>, TetherError> {
        self.check()?;
        let mut entries = self.entries.lock().await;
        Ok(entries.iter_mut().find(|e| e.id == id).map(|e| {
            e.retry_count += 1;
            e.retry_count
        }))
    }

    async fn clear(&self) -> Result<u64, TetherError> {
        self.check()?;
        let mut entries = self.entries.lock().await;
        let removed = entries.len() as u64;
        entries.clear();
        Ok(removed)
    }

    async fn count(&self) -> Result<u64, TetherError> {
        self.check()?;
        Ok(self.entries.lock().await.len() as u64)
    }
}
