// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lifecycle event payloads.

use std::fmt;

use serde_json::Value;

/// Payload of the disconnected event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnected {
    pub code: u16,
    pub reason: String,
    /// True when the close came from [`crate::Transport::disconnect`].
    pub manual: bool,
}

/// Payload of the error event.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportFailure {
    /// Establishing the connection failed.
    ConnectFailed(String),
    /// The server sent an `error` frame. The connection stays open.
    Remote(Value),
    /// Automatic reconnection stopped after this many attempts.
    ReconnectExhausted { attempts: u32 },
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectFailed(reason) => write!(f, "connection failed: {reason}"),
            Self::Remote(payload) => write!(f, "server error: {payload}"),
            Self::ReconnectExhausted { attempts } => {
                write!(f, "gave up reconnecting after {attempts} attempts")
            }
        }
    }
}
