// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reference-counted resource subscriptions.
//!
//! Many local callbacks may watch the same resource. The server only hears
//! a `subscribe` frame when the first one registers and an `unsubscribe`
//! frame when the last one goes away.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use strum::{Display, EnumString};
use tracing::{debug, trace, warn};

use tether_bus::{Listeners, Subscription};
use tether_core::types::message_types;
use tether_core::{OutgoingMessage, TransportMessage};
use tether_transport::Transport;

/// Kind of mutation carried by a `data_update` frame.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Create,
    #[default]
    Update,
    Delete,
}

/// Payload of a `data_update` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataUpdate {
    pub resource: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub action: SyncAction,
}

struct Inner {
    transport: Transport,
    resources: Mutex<HashMap<String, Listeners<DataUpdate>>>,
    inbound: Mutex<Option<Subscription>>,
}

/// Fans server-pushed resource changes out to local callbacks.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct DataSync {
    inner: Arc<Inner>,
}

impl DataSync {
    pub fn new(transport: Transport) -> Self {
        let inner = Arc::new(Inner {
            transport,
            resources: Mutex::new(HashMap::new()),
            inbound: Mutex::new(None),
        });
        let weak = Arc::downgrade(&inner);
        let inbound = inner
            .transport
            .on_message(message_types::DATA_UPDATE, move |message| {
                if let Some(inner) = weak.upgrade() {
                    inner.dispatch(message);
                }
            });
        *inner.inbound.lock() = Some(inbound);
        Self { inner }
    }

    /// Watch `resource`. The first watcher sends a `subscribe` frame.
    pub fn subscribe<F>(&self, resource: &str, callback: F) -> ResourceSubscription
    where
        F: Fn(&DataUpdate) + Send + Sync + 'static,
    {
        let (first, subscription) = {
            let mut resources = self.inner.resources.lock();
            let listeners = resources.entry(resource.to_string()).or_default();
            let first = listeners.is_empty();
            (first, listeners.subscribe(callback))
        };
        if first {
            debug!(resource, "subscribing to resource");
            self.inner.send_control(message_types::SUBSCRIBE, resource);
        }
        ResourceSubscription {
            resource: resource.to_string(),
            owner: Arc::downgrade(&self.inner),
            subscription: Some(subscription),
        }
    }

    /// Send a `data_update` frame for a change made locally.
    ///
    /// Local callbacks see it only if the server echoes it back.
    pub fn publish_update(&self, resource: &str, data: Value, action: SyncAction) {
        let payload = json!({
            "resource": resource,
            "data": data,
            "action": action,
        });
        self.inner
            .transport
            .send(OutgoingMessage::new(message_types::DATA_UPDATE, payload));
    }

    /// Resources with at least one callback, sorted.
    pub fn subscribed_resources(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.resources.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn callback_count(&self, resource: &str) -> usize {
        self.inner
            .resources
            .lock()
            .get(resource)
            .map_or(0, Listeners::len)
    }

    /// Drop every subscription without telling the server.
    pub fn cleanup(&self) {
        let dropped = std::mem::take(&mut *self.inner.resources.lock());
        for listeners in dropped.values() {
            listeners.clear();
        }
        debug!(resources = dropped.len(), "data sync cleaned up");
    }
}

impl Inner {
    fn send_control(&self, kind: &str, resource: &str) {
        self.transport
            .send(OutgoingMessage::new(kind, json!({ "resource": resource })));
    }

    fn dispatch(&self, message: &TransportMessage) {
        let update: DataUpdate = match serde_json::from_value(message.payload.clone()) {
            Ok(update) => update,
            Err(e) => {
                warn!(error = %e, "ignoring malformed data update");
                return;
            }
        };
        let listeners = self.resources.lock().get(&update.resource).cloned();
        match listeners {
            Some(listeners) => {
                let delivered = listeners.emit(&update);
                trace!(resource = %update.resource, action = %update.action, delivered, "data update");
            }
            None => trace!(resource = %update.resource, "data update for unwatched resource"),
        }
    }

    fn release(&self, resource: &str, subscription: Subscription) {
        let last = {
            let mut resources = self.resources.lock();
            subscription.unsubscribe();
            match resources.get(resource) {
                Some(listeners) if listeners.is_empty() => {
                    resources.remove(resource);
                    true
                }
                _ => false,
            }
        };
        if last {
            debug!(resource, "unsubscribing from resource");
            self.send_control(message_types::UNSUBSCRIBE, resource);
        }
    }
}

/// Handle for one callback on one resource.
///
/// Dropping it has the same effect as [`ResourceSubscription::unsubscribe`].
#[must_use = "dropping a ResourceSubscription unsubscribes immediately"]
pub struct ResourceSubscription {
    resource: String,
    owner: Weak<Inner>,
    subscription: Option<Subscription>,
}

impl ResourceSubscription {
    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        let Some(subscription) = self.subscription.take() else {
            return;
        };
        match self.owner.upgrade() {
            Some(owner) => owner.release(&self.resource, subscription),
            None => subscription.unsubscribe(),
        }
    }
}

impl Drop for ResourceSubscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for ResourceSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceSubscription")
            .field("resource", &self.resource)
            .field("active", &self.subscription.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_defaults_to_update() {
        let update: DataUpdate =
            serde_json::from_value(json!({"resource": "tasks", "data": {"id": 1}})).unwrap();
        assert_eq!(update.action, SyncAction::Update);
        assert_eq!(update.data, json!({"id": 1}));
    }

    #[test]
    fn action_wire_names() {
        assert_eq!(serde_json::to_value(SyncAction::Delete).unwrap(), json!("delete"));
        assert_eq!(SyncAction::Create.to_string(), "create");
        assert_eq!("update".parse::<SyncAction>().unwrap(), SyncAction::Update);
    }

    #[test]
    fn update_without_resource_is_rejected() {
        assert!(serde_json::from_value::<DataUpdate>(json!({"data": 1})).is_err());
    }
}
