// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaboration features layered on a [`tether_transport::Transport`].
//!
//! - [`PresenceTracker`] announces the local user and keeps a view of
//!   everyone else who is around.
//! - [`DataSync`] lets any number of callbacks watch a named resource while
//!   the server sees a single subscription.
//!
//! Neither component owns the transport; tearing them down leaves the
//! connection open.

pub mod presence;
pub mod sync;

pub use presence::{PresenceChange, PresenceSettings, PresenceTracker, PresenceUpdate, PresenceUser};
pub use sync::{DataSync, DataUpdate, ResourceSubscription, SyncAction};
