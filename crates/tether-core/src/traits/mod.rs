// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! The queue and the transport never touch SQLite or sockets directly; they
//! talk to a [`RequestStore`] and a [`Connector`] so both can be swapped for
//! in-memory doubles in tests.

pub mod connector;
pub mod store;

pub use connector::{Connector, Frame, Link, LinkEvent};
pub use store::RequestStore;
