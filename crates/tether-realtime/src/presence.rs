// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Presence: who is around, where they are, and what they are doing.
//!
//! The local user's snapshot is published on every change, on every
//! (re)connect, and on a fixed cadence so peers can age out users whose
//! client went away without saying goodbye. Remote snapshots arrive as
//! `presence_update` frames and are kept until an explicit
//! `presence_remove`; [`PresenceTracker::online_users`] applies the
//! freshness window on read.

use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use tether_bus::{Listeners, Subscription};
use tether_config::PresenceConfig;
use tether_core::types::message_types;
use tether_core::{
    Clock, CursorPosition, OutgoingMessage, PresenceRecord, PresenceStatus, TransportMessage,
};
use tether_transport::Transport;

/// Timing knobs for a [`PresenceTracker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceSettings {
    /// Cadence of the self-publish task.
    pub publish_interval: Duration,
    /// Records last seen longer ago than this are not online.
    pub online_window: Duration,
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self::from(&PresenceConfig::default())
    }
}

impl From<&PresenceConfig> for PresenceSettings {
    fn from(config: &PresenceConfig) -> Self {
        Self {
            publish_interval: config.publish_interval(),
            online_window: Duration::from_secs(config.online_window_secs),
        }
    }
}

/// Identity of the local user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUser {
    pub user_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl PresenceUser {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            name: name.into(),
            avatar: None,
        }
    }

    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }
}

/// A partial change to the local snapshot. `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresenceUpdate {
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub status: Option<PresenceStatus>,
    pub current_page: Option<String>,
    pub cursor: Option<CursorPosition>,
}

impl PresenceUpdate {
    fn apply(self, record: &mut PresenceRecord) {
        if let Some(name) = self.name {
            record.name = name;
        }
        if let Some(avatar) = self.avatar {
            record.avatar = Some(avatar);
        }
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(page) = self.current_page {
            record.current_page = Some(page);
        }
        if let Some(cursor) = self.cursor {
            record.cursor = Some(cursor);
        }
    }
}

/// A change to the remote presence view.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceChange {
    Updated(PresenceRecord),
    Removed(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemovePayload {
    user_id: String,
}

struct Publisher {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct Inner {
    transport: Transport,
    settings: PresenceSettings,
    clock: Arc<dyn Clock>,
    users: DashMap<String, PresenceRecord>,
    current: Mutex<Option<PresenceRecord>>,
    changes: Listeners<PresenceChange>,
    transport_subs: Mutex<Vec<Subscription>>,
    publisher: Mutex<Option<Publisher>>,
}

/// Tracks the local user's presence and everyone else's.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct PresenceTracker {
    inner: Arc<Inner>,
}

impl PresenceTracker {
    /// Create a tracker listening on `transport`.
    pub fn new(transport: Transport, settings: PresenceSettings, clock: Arc<dyn Clock>) -> Self {
        let inner = Arc::new(Inner {
            transport,
            settings,
            clock,
            users: DashMap::new(),
            current: Mutex::new(None),
            changes: Listeners::new(),
            transport_subs: Mutex::new(Vec::new()),
            publisher: Mutex::new(None),
        });
        inner.attach();
        Self { inner }
    }

    /// Establish the local identity, publish it, and start the self-publish task.
    ///
    /// Calling this again replaces the identity and restarts the task.
    pub fn set_current_user(&self, user: PresenceUser) {
        let record = PresenceRecord {
            user_id: user.user_id,
            name: user.name,
            avatar: user.avatar,
            status: PresenceStatus::Online,
            last_seen: self.inner.clock.now_millis(),
            current_page: None,
            cursor: None,
        };
        debug!(user_id = %record.user_id, "presence identity set");
        *self.inner.current.lock() = Some(record);
        self.inner.publish();
        self.start_publisher();
    }

    /// Merge `update` into the local snapshot and publish it.
    pub fn update_presence(&self, update: PresenceUpdate) {
        self.inner.modify(|record| update.apply(record));
    }

    pub fn update_cursor(&self, cursor: CursorPosition) {
        self.inner.modify(|record| record.cursor = Some(cursor));
    }

    pub fn update_current_page(&self, page: impl Into<String>) {
        let page = page.into();
        self.inner.modify(|record| record.current_page = Some(page));
    }

    pub fn set_status(&self, status: PresenceStatus) {
        self.inner.modify(|record| record.status = status);
    }

    /// Remote users that are online and were seen within the window, ordered by id.
    pub fn online_users(&self) -> Vec<PresenceRecord> {
        let now = self.inner.clock.now_millis();
        let window = i64::try_from(self.inner.settings.online_window.as_millis()).unwrap_or(i64::MAX);
        let mut online: Vec<PresenceRecord> = self
            .inner
            .users
            .iter()
            .filter(|entry| {
                entry.status == PresenceStatus::Online
                    && now.saturating_sub(entry.last_seen) < window
            })
            .map(|entry| entry.value().clone())
            .collect();
        online.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        online
    }

    /// Every remote record regardless of age or status, ordered by id.
    pub fn presence_data(&self) -> Vec<PresenceRecord> {
        let mut all: Vec<PresenceRecord> = self
            .inner
            .users
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        all
    }

    pub fn presence_of(&self, user_id: &str) -> Option<PresenceRecord> {
        self.inner.users.get(user_id).map(|entry| entry.value().clone())
    }

    /// The local snapshot, if an identity has been set.
    pub fn current_user(&self) -> Option<PresenceRecord> {
        self.inner.current.lock().clone()
    }

    pub fn on_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&PresenceChange) + Send + Sync + 'static,
    {
        self.inner.changes.subscribe(callback)
    }

    /// Stop publishing, detach from the transport and forget everything.
    ///
    /// The transport itself stays connected.
    pub fn cleanup(&self) {
        self.inner.stop_publisher();
        self.inner.transport_subs.lock().clear();
        self.inner.users.clear();
        *self.inner.current.lock() = None;
        self.inner.changes.clear();
        debug!("presence tracker cleaned up");
    }

    fn start_publisher(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime, presence will only publish on change");
            return;
        };

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.settings.publish_interval;

        let handle = runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        inner.touch();
                        inner.publish();
                    }
                    _ = task_cancel.cancelled() => break,
                }
            }
        });

        let previous = self
            .inner
            .publisher
            .lock()
            .replace(Publisher { cancel, handle });
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }
    }
}

impl Inner {
    fn attach(self: &Arc<Self>) {
        let updates = {
            let weak = Arc::downgrade(self);
            self.transport
                .on_message(message_types::PRESENCE_UPDATE, move |message| {
                    if let Some(inner) = weak.upgrade() {
                        inner.handle_update(message);
                    }
                })
        };
        let removals = {
            let weak = Arc::downgrade(self);
            self.transport
                .on_message(message_types::PRESENCE_REMOVE, move |message| {
                    if let Some(inner) = weak.upgrade() {
                        inner.handle_remove(&message.payload);
                    }
                })
        };
        let connected = {
            let weak: Weak<Self> = Arc::downgrade(self);
            self.transport.on_connected(move |_| {
                let Some(inner) = weak.upgrade() else { return };
                let has_identity = inner.current.lock().is_some();
                if has_identity {
                    inner.touch();
                    inner.publish();
                }
            })
        };
        self.transport_subs
            .lock()
            .extend([updates, removals, connected]);
    }

    fn modify(&self, change: impl FnOnce(&mut PresenceRecord)) {
        {
            let mut current = self.current.lock();
            let Some(record) = current.as_mut() else {
                debug!("presence change ignored, no current user");
                return;
            };
            change(record);
            record.last_seen = self.clock.now_millis();
        }
        self.publish();
    }

    fn touch(&self) {
        if let Some(record) = self.current.lock().as_mut() {
            record.last_seen = self.clock.now_millis();
        }
    }

    /// Send the local snapshot. Skipped while offline; the connected hook catches up.
    fn publish(&self) {
        if !self.transport.is_connected() {
            trace!("presence publish skipped, not connected");
            return;
        }
        let Some(record) = self.current.lock().clone() else {
            return;
        };
        let payload = match serde_json::to_value(&record) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "presence snapshot not serializable");
                return;
            }
        };
        self.transport.send(
            OutgoingMessage::new(message_types::PRESENCE_UPDATE, payload)
                .with_user_id(record.user_id),
        );
    }

    fn is_self(&self, user_id: &str) -> bool {
        self.current
            .lock()
            .as_ref()
            .is_some_and(|record| record.user_id == user_id)
    }

    fn handle_update(&self, message: &TransportMessage) {
        let mut record: PresenceRecord = match serde_json::from_value(message.payload.clone()) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "ignoring malformed presence update");
                return;
            }
        };
        if self.is_self(&record.user_id) {
            return;
        }
        // A peer clock running ahead must not extend the online window.
        record.last_seen = record.last_seen.min(self.clock.now_millis());
        trace!(user_id = %record.user_id, status = %record.status, "presence updated");
        self.users.insert(record.user_id.clone(), record.clone());
        self.changes.emit(&PresenceChange::Updated(record));
    }

    fn handle_remove(&self, payload: &Value) {
        let user_id = match serde_json::from_value::<RemovePayload>(payload.clone()) {
            Ok(removal) => removal.user_id,
            Err(e) => {
                warn!(error = %e, "ignoring malformed presence removal");
                return;
            }
        };
        if self.users.remove(&user_id).is_some() {
            debug!(user_id = %user_id, "presence removed");
            self.changes.emit(&PresenceChange::Removed(user_id));
        }
    }

    fn stop_publisher(&self) {
        if let Some(publisher) = self.publisher.lock().take() {
            publisher.cancel.cancel();
            publisher.handle.abort();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.stop_publisher();
    }
}
