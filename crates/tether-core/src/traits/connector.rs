// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Duplex link abstraction used by the transport.
//!
//! A [`Connector`] performs the handshake and hands back a [`Link`]: a pair of
//! channels bridging the underlying socket. The transport owns the link for
//! its whole lifetime and drops it on close.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TetherError;

/// Normal closure status code.
pub const CLOSE_NORMAL: u16 = 1000;

/// Abnormal closure status code (no close frame received).
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Outbound frame written to the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Close { code: u16, reason: String },
}

/// Inbound event read from the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Text(String),
    /// The link is gone. No further events follow.
    Closed { code: u16, reason: String },
}

/// An established connection.
#[derive(Debug)]
pub struct Link {
    pub outbound: mpsc::UnboundedSender<Frame>,
    pub inbound: mpsc::UnboundedReceiver<LinkEvent>,
}

/// Opens duplex links to a server endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Connects to `url`, resolving once the handshake has completed.
    async fn open(&self, url: &str) -> Result<Link, TetherError>;
}
