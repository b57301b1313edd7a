// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The drain engine.
//!
//! A pass reads every persisted entry in enqueue order and replays it:
//!
//! | Outcome            | Store                      | Event       |
//! |--------------------|----------------------------|-------------|
//! | 2xx                | removed                    | `Succeeded` |
//! | 4xx                | removed                    | `Failed`    |
//! | anything else      | `retry_count += 1`         | none        |
//! | last retry failed  | removed                    | `Exhausted` |
//!
//! Only one pass runs at a time. A pass requested while another is in
//! flight returns immediately with `None`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::Method;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tether_bus::{Listeners, Subscription};
use tether_config::model::QueueConfig;
use tether_core::metrics;
use tether_core::{Clock, QueuedRequest, RequestOptions, RequestStore, TetherError};

use crate::events::{DrainSummary, HttpResponse, QueueEvent};

/// Tunables for an [`OfflineQueue`].
#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// Retry budget used when `enqueue` is not given one.
    pub max_retries: u32,
    /// Period of the background drain task.
    pub drain_interval: Duration,
    /// Pause between two entries of the same pass.
    pub request_delay: Duration,
    /// Per-attempt HTTP timeout.
    pub request_timeout: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

impl From<&QueueConfig> for QueueSettings {
    fn from(config: &QueueConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            drain_interval: config.drain_interval(),
            request_delay: config.request_delay(),
            request_timeout: config.request_timeout(),
        }
    }
}

/// Handle to the offline queue. Clones share the same queue.
#[derive(Clone)]
pub struct OfflineQueue {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn RequestStore>,
    client: reqwest::Client,
    settings: QueueSettings,
    clock: Arc<dyn Clock>,
    online: AtomicBool,
    draining: AtomicBool,
    events: Listeners<QueueEvent>,
    status: Listeners<bool>,
    periodic: Mutex<Option<PeriodicDrain>>,
}

struct PeriodicDrain {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Clears the in-progress flag when a pass ends, however it ends.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

enum Attempt {
    Response(HttpResponse),
    Error(TetherError),
}

impl OfflineQueue {
    /// Create a queue over `store`. The queue starts out online.
    pub fn new(
        store: Arc<dyn RequestStore>,
        client: reqwest::Client,
        settings: QueueSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                client,
                settings,
                clock,
                online: AtomicBool::new(true),
                draining: AtomicBool::new(false),
                events: Listeners::new(),
                status: Listeners::new(),
                periodic: Mutex::new(None),
            }),
        }
    }

    /// Persist a request for replay and return its id.
    ///
    /// Never waits for the network. When online, a drain pass is started in
    /// the background.
    pub async fn enqueue(
        &self,
        url: &str,
        options: RequestOptions,
        max_retries: Option<u32>,
    ) -> Result<String, TetherError> {
        Method::from_bytes(options.method.as_bytes()).map_err(|e| TetherError::Http {
            message: format!("invalid HTTP method `{}`", options.method),
            source: Some(Box::new(e)),
        })?;

        let max_retries = max_retries.unwrap_or(self.inner.settings.max_retries);
        let request = QueuedRequest::new(url, options, max_retries, self.inner.clock.now_millis());
        self.inner.store.insert(&request).await?;
        debug!(
            id = %request.id,
            url = %request.url,
            method = %request.method,
            max_retries,
            "request queued"
        );
        self.refresh_depth().await;

        if self.is_online() {
            self.spawn_drain();
        }
        Ok(request.id)
    }

    /// Run one drain pass.
    ///
    /// Returns `Ok(None)` without doing anything when another pass is in
    /// progress. Per-request failures are handled inside the pass; only store
    /// errors make it return `Err`.
    pub async fn drain(&self) -> Result<Option<DrainSummary>, TetherError> {
        if self
            .inner
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("drain already in progress, skipping");
            return Ok(None);
        }
        let _guard = DrainGuard(&self.inner.draining);

        let entries = self.inner.store.list_ordered().await?;
        let mut summary = DrainSummary::default();
        let delay = self.inner.settings.request_delay;

        for (index, request) in entries.into_iter().enumerate() {
            if index > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.process(request, &mut summary).await?;
        }

        self.refresh_depth().await;
        if summary.attempted > 0 || summary.exhausted > 0 {
            info!(
                attempted = summary.attempted,
                succeeded = summary.succeeded,
                failed = summary.failed,
                retried = summary.retried,
                exhausted = summary.exhausted,
                "drain pass complete"
            );
        }
        Ok(Some(summary))
    }

    /// Snapshot of pending entries in drain order.
    pub async fn queued_requests(&self) -> Result<Vec<QueuedRequest>, TetherError> {
        self.inner.store.list_ordered().await
    }

    /// Delete every pending entry without replaying it.
    pub async fn clear(&self) -> Result<u64, TetherError> {
        let removed = self.inner.store.clear().await?;
        metrics::set_queue_depth(0);
        info!(removed, "offline queue cleared");
        Ok(removed)
    }

    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::Acquire)
    }

    pub fn is_draining(&self) -> bool {
        self.inner.draining.load(Ordering::Acquire)
    }

    /// Report connectivity. A flip notifies status listeners, and a flip to
    /// online starts a drain pass.
    pub fn set_online(&self, online: bool) {
        if self.inner.online.swap(online, Ordering::AcqRel) == online {
            return;
        }
        info!(online, "connectivity changed");
        self.inner.status.emit(&online);
        if online {
            self.spawn_drain();
        }
    }

    /// Called with the new state on every connectivity flip.
    pub fn on_status_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&bool) + Send + Sync + 'static,
    {
        self.inner.status.subscribe(callback)
    }

    /// Called with the terminal outcome of every request.
    pub fn on_event<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&QueueEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(callback)
    }

    /// Start the periodic drain task. The first tick fires immediately.
    ///
    /// Calling `start` again while the task runs does nothing.
    pub fn start(&self) {
        let mut periodic = self.inner.periodic.lock();
        if periodic.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.settings.drain_interval;

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime, periodic drain not started");
            return;
        };
        let handle = runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let Some(queue) = upgrade(&weak) else { break };
                        if !queue.is_online() || queue.is_draining() {
                            continue;
                        }
                        if let Err(e) = queue.drain().await {
                            warn!(error = %e, "periodic drain failed");
                        }
                    }
                    _ = task_cancel.cancelled() => {
                        debug!("periodic drain shutting down");
                        break;
                    }
                }
            }
        });

        *periodic = Some(PeriodicDrain { cancel, handle });
        debug!(interval_ms = period.as_millis() as u64, "periodic drain started");
    }

    /// Stop the periodic drain task and wait for it to finish.
    ///
    /// A pass already running is allowed to complete.
    pub async fn shutdown(&self) {
        let periodic = self.inner.periodic.lock().take();
        if let Some(PeriodicDrain { cancel, handle }) = periodic {
            cancel.cancel();
            if let Err(e) = handle.await {
                warn!(error = %e, "periodic drain task ended abnormally");
            }
        }
    }

    fn spawn_drain(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime, drain not started");
            return;
        };
        let queue = self.clone();
        runtime.spawn(async move {
            if let Err(e) = queue.drain().await {
                warn!(error = %e, "background drain failed");
            }
        });
    }

    async fn process(
        &self,
        request: QueuedRequest,
        summary: &mut DrainSummary,
    ) -> Result<(), TetherError> {
        if request.is_exhausted() {
            self.inner.store.remove(&request.id).await?;
            summary.exhausted += 1;
            metrics::record_queue_outcome("exhausted");
            warn!(
                id = %request.id,
                retry_count = request.retry_count,
                "dropping request with no retries left"
            );
            self.inner.events.emit(&QueueEvent::Exhausted {
                request,
                last_error: None,
            });
            return Ok(());
        }

        summary.attempted += 1;
        match self.attempt(&request).await {
            Attempt::Response(response) if (200..300).contains(&response.status) => {
                self.inner.store.remove(&request.id).await?;
                summary.succeeded += 1;
                metrics::record_queue_outcome("succeeded");
                debug!(id = %request.id, status = response.status, "queued request delivered");
                self.inner
                    .events
                    .emit(&QueueEvent::Succeeded { request, response });
            }
            Attempt::Response(response) if (400..500).contains(&response.status) => {
                self.inner.store.remove(&request.id).await?;
                summary.failed += 1;
                metrics::record_queue_outcome("failed");
                warn!(
                    id = %request.id,
                    status = response.status,
                    "queued request rejected by server, not retrying"
                );
                let error = format!("server rejected request with status {}", response.status);
                self.inner.events.emit(&QueueEvent::Failed { request, error });
            }
            Attempt::Response(response) => {
                let reason = format!("server responded with status {}", response.status);
                self.retry(request, reason, summary).await?;
            }
            Attempt::Error(e) => {
                self.retry(request, e.to_string(), summary).await?;
            }
        }
        Ok(())
    }

    async fn retry(
        &self,
        mut request: QueuedRequest,
        reason: String,
        summary: &mut DrainSummary,
    ) -> Result<(), TetherError> {
        let Some(retry_count) = self.inner.store.increment_retry(&request.id).await? else {
            // Cleared while the attempt was in flight.
            debug!(id = %request.id, "queued request vanished during attempt");
            return Ok(());
        };
        request.retry_count = retry_count;

        if request.is_exhausted() {
            self.inner.store.remove(&request.id).await?;
            summary.exhausted += 1;
            metrics::record_queue_outcome("exhausted");
            warn!(
                id = %request.id,
                retry_count,
                error = %reason,
                "queued request exhausted its retries"
            );
            self.inner.events.emit(&QueueEvent::Exhausted {
                request,
                last_error: Some(reason),
            });
        } else {
            summary.retried += 1;
            metrics::record_queue_outcome("retried");
            debug!(
                id = %request.id,
                retry_count,
                max_retries = request.max_retries,
                error = %reason,
                "queued request will be retried"
            );
        }
        Ok(())
    }

    async fn attempt(&self, request: &QueuedRequest) -> Attempt {
        match self.send(request).await {
            Ok(response) => Attempt::Response(response),
            Err(e) => Attempt::Error(e),
        }
    }

    async fn send(&self, request: &QueuedRequest) -> Result<HttpResponse, TetherError> {
        let method =
            Method::from_bytes(request.method.as_bytes()).map_err(|e| TetherError::Http {
                message: format!("invalid HTTP method `{}`", request.method),
                source: Some(Box::new(e)),
            })?;

        let mut builder = self
            .inner
            .client
            .request(method, &request.url)
            .timeout(self.inner.settings.request_timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TetherError::Timeout {
                    duration: self.inner.settings.request_timeout,
                }
            } else {
                TetherError::Http {
                    message: format!("request failed: {e}"),
                    source: Some(Box::new(e)),
                }
            }
        })?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(HttpResponse { status, body })
    }

    async fn refresh_depth(&self) {
        match self.inner.store.count().await {
            Ok(depth) => metrics::set_queue_depth(depth),
            Err(e) => debug!(error = %e, "could not read queue depth"),
        }
    }
}

fn upgrade(weak: &Weak<Inner>) -> Option<OfflineQueue> {
    weak.upgrade().map(|inner| OfflineQueue { inner })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_test_utils::{ManualClock, MemoryRequestStore};

    fn queue_with(store: Arc<MemoryRequestStore>) -> OfflineQueue {
        let settings = QueueSettings {
            request_delay: Duration::ZERO,
            ..QueueSettings::default()
        };
        OfflineQueue::new(
            store,
            reqwest::Client::new(),
            settings,
            Arc::new(ManualClock::default()),
        )
    }

    #[test]
    fn settings_follow_config() {
        let config = QueueConfig {
            max_retries: 7,
            drain_interval_secs: 5,
            request_delay_ms: 20,
            request_timeout_secs: 2,
        };
        let settings = QueueSettings::from(&config);
        assert_eq!(settings.max_retries, 7);
        assert_eq!(settings.drain_interval, Duration::from_secs(5));
        assert_eq!(settings.request_delay, Duration::from_millis(20));
        assert_eq!(settings.request_timeout, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn status_listeners_fire_only_on_flips() {
        let queue = queue_with(Arc::new(MemoryRequestStore::new()));
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = queue.on_status_change(move |online| sink.lock().push(*online));

        queue.set_online(true);
        queue.set_online(false);
        queue.set_online(false);
        queue.set_online(true);

        assert_eq!(*seen.lock(), vec![false, true]);
    }

    #[test]
    fn start_outside_a_runtime_is_a_no_op() {
        let queue = queue_with(Arc::new(MemoryRequestStore::new()));
        queue.start();
        assert!(queue.inner.periodic.lock().is_none());
    }

    #[tokio::test]
    async fn invalid_method_is_rejected_at_enqueue() {
        let store = Arc::new(MemoryRequestStore::new());
        let queue = queue_with(store.clone());
        let result = queue
            .enqueue("http://x/api", RequestOptions::new("BAD METHOD"), None)
            .await;
        assert!(matches!(result, Err(TetherError::Http { .. })));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn store_failure_surfaces_from_enqueue_and_drain() {
        let store = Arc::new(MemoryRequestStore::new());
        let queue = queue_with(store.clone());
        queue.set_online(false);
        store.set_failing(true);

        let result = queue
            .enqueue("http://x/api", RequestOptions::default(), None)
            .await;
        assert!(matches!(result, Err(TetherError::Storage { .. })));
        assert!(queue.drain().await.is_err());
        assert!(!queue.is_draining(), "guard must clear the flag on error");
    }

    #[tokio::test]
    async fn default_retry_budget_comes_from_settings() {
        let store = Arc::new(MemoryRequestStore::new());
        let queue = queue_with(store.clone());
        queue.set_online(false);

        queue
            .enqueue("http://x/a", RequestOptions::default(), None)
            .await
            .unwrap();
        queue
            .enqueue("http://x/b", RequestOptions::default(), Some(9))
            .await
            .unwrap();

        let entries = queue.queued_requests().await.unwrap();
        assert_eq!(entries[0].max_retries, 3);
        assert_eq!(entries[1].max_retries, 9);
    }
}
