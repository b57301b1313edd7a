// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Tether networking client.
//!
//! This crate provides the error type, the wire and storage types, the
//! adapter traits ([`RequestStore`], [`Connector`]) and the [`Clock`]
//! abstraction shared by the queue, transport and real-time crates.

pub mod clock;
pub mod error;
pub mod metrics;
pub mod traits;
pub mod types;

pub use clock::{Clock, SystemClock};
pub use error::TetherError;
pub use traits::{Connector, Frame, Link, LinkEvent, RequestStore};
pub use types::{
    ConnectionState, CursorPosition, OutgoingMessage, PresenceRecord, PresenceStatus,
    QueuedRequest, RequestOptions, TransportMessage,
};
