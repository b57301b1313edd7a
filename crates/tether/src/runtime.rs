// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Explicit assembly of every client component from configuration.
//!
//! Nothing here is global: commands build a [`Runtime`], use the handles
//! they need, and tear it down again.

use std::sync::Arc;

use tether_config::TetherConfig;
use tether_core::{Clock, SystemClock, TetherError};
use tether_queue::{OfflineQueue, QueueSettings};
use tether_realtime::{DataSync, PresenceSettings, PresenceTracker};
use tether_storage::SqliteRequestStore;
use tether_transport::{Transport, TransportSettings, WsConnector};
use tracing::{debug, info, warn};

pub struct Runtime {
    store: Arc<SqliteRequestStore>,
    pub queue: OfflineQueue,
    pub transport: Transport,
    pub presence: PresenceTracker,
    pub sync: DataSync,
}

impl Runtime {
    /// Open storage and construct every component. No background work starts.
    pub async fn build(config: &TetherConfig) -> Result<Self, TetherError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(SqliteRequestStore::open(&config.storage).await?);

        let client = reqwest::Client::builder()
            .user_agent(format!(
                "{}/{}",
                config.client.name,
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(|e| TetherError::Http {
                message: "failed to build HTTP client".to_string(),
                source: Some(Box::new(e)),
            })?;
        let queue = OfflineQueue::new(
            store.clone(),
            client,
            QueueSettings::from(&config.queue),
            clock.clone(),
        );

        let transport = Transport::new(
            TransportSettings::from(&config.transport),
            Arc::new(WsConnector),
            clock.clone(),
        )?;
        let presence = PresenceTracker::new(
            transport.clone(),
            PresenceSettings::from(&config.presence),
            clock,
        );
        let sync = DataSync::new(transport.clone());

        debug!(
            database = %config.storage.database_path,
            url = %redacted_url(&transport),
            "runtime assembled"
        );
        Ok(Self {
            store,
            queue,
            transport,
            presence,
            sync,
        })
    }

    /// Start the periodic queue drain.
    pub fn start(&self) {
        self.queue.start();
        info!("runtime started");
    }

    /// Stop background work, close the connection and checkpoint the store.
    pub async fn shutdown(self) {
        self.presence.cleanup();
        self.sync.cleanup();
        self.transport.disconnect();
        self.queue.shutdown().await;
        if let Err(e) = self.store.close().await {
            warn!(error = %e, "failed to close request store");
        }
        info!("runtime stopped");
    }
}

fn redacted_url(transport: &Transport) -> String {
    match transport.url().split_once('?') {
        Some((base, _)) => format!("{base}?…"),
        None => transport.url().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::RequestOptions;

    fn config_in(dir: &tempfile::TempDir) -> TetherConfig {
        let mut config = TetherConfig::default();
        config.storage.database_path = dir.path().join("queue.db").display().to_string();
        config
    }

    #[tokio::test]
    async fn build_wires_components_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(&dir);
        config.transport.endpoint = "https://rt.example.com/ws".to_string();
        config.transport.auth_token = Some("abc".to_string());

        let runtime = Runtime::build(&config).await.unwrap();
        assert_eq!(runtime.transport.url(), "wss://rt.example.com/ws?token=abc");
        assert!(!runtime.transport.is_connected());
        assert!(runtime.queue.is_online());
        assert_eq!(redacted_url(&runtime.transport), "wss://rt.example.com/ws?…");
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn queued_requests_survive_runtime_restart() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);

        let runtime = Runtime::build(&config).await.unwrap();
        runtime.queue.set_online(false);
        let id = runtime
            .queue
            .enqueue(
                "http://127.0.0.1:9/items",
                RequestOptions::new("POST").body("{}"),
                None,
            )
            .await
            .unwrap();
        runtime.shutdown().await;

        let runtime = Runtime::build(&config).await.unwrap();
        let pending = runtime.queue.queued_requests().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
        assert_eq!(pending[0].max_retries, config.queue.max_retries);
        runtime.shutdown().await;
    }
}
