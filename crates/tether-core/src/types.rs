// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the queue, transport, and real-time components.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

use crate::error::TetherError;

// --- Durable queue ---

/// Options describing the HTTP request to replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOptions {
    /// HTTP method, upper-case (`POST`, `PUT`, ...).
    pub method: String,
    /// Request headers, replayed verbatim.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Optional request body.
    #[serde(default)]
    pub body: Option<String>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::new("POST")
    }
}

impl RequestOptions {
    pub fn new(method: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes `value` as the body and sets `content-type: application/json`.
    pub fn json<T: Serialize>(self, value: &T) -> Result<Self, TetherError> {
        let body = serde_json::to_string(value)?;
        Ok(self.header("content-type", "application/json").body(body))
    }
}

/// A write request persisted by the offline queue until it can be replayed.
///
/// Invariant: `retry_count <= max_retries` while the entry is in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedRequest {
    pub id: String,
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    /// Enqueue time in epoch milliseconds; drain order key.
    pub timestamp: i64,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl QueuedRequest {
    /// Builds a fresh entry with a time+random id and zero retries.
    pub fn new(url: &str, options: RequestOptions, max_retries: u32, now_millis: i64) -> Self {
        Self {
            id: new_request_id(now_millis),
            url: url.to_string(),
            method: options.method,
            headers: options.headers,
            body: options.body,
            timestamp: now_millis,
            retry_count: 0,
            max_retries,
        }
    }

    /// True once no further attempts are allowed.
    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

/// Generates a queue id of the form `{epoch_ms}-{9 hex chars}`.
pub fn new_request_id(now_millis: i64) -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{now_millis}-{}", &random[..9])
}

// --- Transport ---

/// Lifecycle state of the real-time connection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

/// Reserved wire message types. Any other type string is an application event.
pub mod message_types {
    pub const HEARTBEAT: &str = "heartbeat";
    pub const HEARTBEAT_ACK: &str = "heartbeat_ack";
    pub const ERROR: &str = "error";
    pub const PRESENCE_UPDATE: &str = "presence_update";
    pub const PRESENCE_REMOVE: &str = "presence_remove";
    pub const SUBSCRIBE: &str = "subscribe";
    pub const UNSUBSCRIBE: &str = "unsubscribe";
    pub const DATA_UPDATE: &str = "data_update";
}

/// The JSON envelope exchanged over the real-time connection in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
    /// Epoch milliseconds, assigned by the sending transport.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

/// A message as handed to the transport by callers: everything but the timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub kind: String,
    pub payload: Value,
    pub user_id: Option<String>,
    pub organization_id: Option<String>,
    pub correlation_id: Option<String>,
}

impl OutgoingMessage {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
            user_id: None,
            organization_id: None,
            correlation_id: None,
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_organization_id(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Completes the envelope with the send-time timestamp.
    pub fn stamp(self, timestamp: i64) -> TransportMessage {
        TransportMessage {
            kind: self.kind,
            payload: self.payload,
            timestamp,
            user_id: self.user_id,
            organization_id: self.organization_id,
            correlation_id: self.correlation_id,
        }
    }
}

// --- Presence ---

/// Availability advertised by a user.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Away,
    Busy,
    Offline,
}

/// Pointer position within the current page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub x: f64,
    pub y: f64,
}

/// Last-known presence of a single user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub user_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub status: PresenceStatus,
    /// Epoch milliseconds of the last update.
    pub last_seen: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_page: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<CursorPosition>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_id_is_time_prefixed() {
        let id = new_request_id(1_700_000_000_123);
        let (time, random) = id.split_once('-').unwrap();
        assert_eq!(time, "1700000000123");
        assert_eq!(random.len(), 9);
        assert_ne!(id, new_request_id(1_700_000_000_123));
    }

    #[test]
    fn request_options_uppercases_method() {
        let opts = RequestOptions::new("put").header("x-trace", "1");
        assert_eq!(opts.method, "PUT");
        assert_eq!(opts.headers.get("x-trace").map(String::as_str), Some("1"));
    }

    #[test]
    fn json_body_sets_content_type() {
        let opts = RequestOptions::default().json(&json!({"name": "a"})).unwrap();
        assert_eq!(opts.body.as_deref(), Some(r#"{"name":"a"}"#));
        assert_eq!(
            opts.headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
    }

    #[test]
    fn queued_request_exhaustion() {
        let mut req = QueuedRequest::new("http://x/api", RequestOptions::default(), 2, 10);
        assert_eq!(req.retry_count, 0);
        assert!(!req.is_exhausted());
        req.retry_count = 2;
        assert!(req.is_exhausted());
    }

    #[test]
    fn transport_message_wire_format() {
        let msg = OutgoingMessage::new("data_update", json!({"resource": "tasks"}))
            .with_user_id("u1")
            .stamp(42);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "data_update",
                "payload": {"resource": "tasks"},
                "timestamp": 42,
                "userId": "u1"
            })
        );
    }

    #[test]
    fn transport_message_tolerates_missing_fields() {
        let msg: TransportMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(msg.kind, "ping");
        assert!(msg.payload.is_null());
        assert_eq!(msg.timestamp, 0);
        assert!(msg.correlation_id.is_none());
    }

    #[test]
    fn connection_state_display() {
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert_eq!(ConnectionState::Error.to_string(), "error");
    }

    #[test]
    fn presence_record_roundtrips_camel_case() {
        let json = json!({
            "userId": "u1",
            "name": "Ada",
            "status": "busy",
            "lastSeen": 1000,
            "currentPage": "/dashboard",
            "cursor": {"x": 1.5, "y": 2.0}
        });
        let record: PresenceRecord = serde_json::from_value(json).unwrap();
        assert_eq!(record.status, PresenceStatus::Busy);
        assert_eq!(record.current_page.as_deref(), Some("/dashboard"));
        assert!(record.avatar.is_none());
    }
}
