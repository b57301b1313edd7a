// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable offline request queue.
//!
//! Write requests are persisted through a [`tether_core::RequestStore`] the
//! moment they are enqueued and replayed in enqueue order whenever the
//! client is online: on a connectivity flip, right after an enqueue, and on
//! a periodic timer. Outcomes are reported through [`QueueEvent`]s rather
//! than to the caller of `enqueue`.

pub mod events;
pub mod queue;

pub use events::{DrainSummary, HttpResponse, QueueEvent};
pub use queue::{OfflineQueue, QueueSettings};
