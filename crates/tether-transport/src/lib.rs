// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Real-time connection transport.
//!
//! [`Transport`] keeps one logical duplex connection open to the server:
//! it reconnects with capped exponential backoff after unexpected closes,
//! sends heartbeats, buffers outbound messages while offline (drop-oldest),
//! and fans inbound messages out to typed subscribers. The socket itself
//! sits behind the [`tether_core::Connector`] trait; [`WsConnector`] is the
//! WebSocket implementation.

pub mod backoff;
pub mod events;
pub mod transport;
pub mod url;
pub mod ws;

pub use backoff::{MAX_RECONNECT_DELAY, reconnect_delay};
pub use events::{Disconnected, TransportFailure};
pub use transport::{Transport, TransportSettings};
pub use url::build_connection_url;
pub use ws::WsConnector;
