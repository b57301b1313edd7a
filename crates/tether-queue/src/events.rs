// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outcome events and pass summaries.

use std::fmt;

use tether_core::QueuedRequest;

/// Status and body of a replayed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Terminal outcome of a queued request. Each request produces exactly one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    /// The server answered 2xx. The entry has been removed.
    Succeeded {
        request: QueuedRequest,
        response: HttpResponse,
    },
    /// The server answered 4xx. The entry has been removed without retry.
    Failed {
        request: QueuedRequest,
        error: String,
    },
    /// The entry ran out of retries and has been removed.
    Exhausted {
        request: QueuedRequest,
        /// Failure of the final attempt, `None` if the entry was already
        /// exhausted when the pass reached it.
        last_error: Option<String>,
    },
}

impl QueueEvent {
    /// Event name as published to the rest of the application.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Succeeded { .. } => "offline-queue-success",
            Self::Failed { .. } => "offline-queue-failure",
            Self::Exhausted { .. } => "offline-queue-exhausted",
        }
    }

    pub fn request(&self) -> &QueuedRequest {
        match self {
            Self::Succeeded { request, .. }
            | Self::Failed { request, .. }
            | Self::Exhausted { request, .. } => request,
        }
    }
}

/// Counts for one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    /// Network attempts made.
    pub attempted: u32,
    pub succeeded: u32,
    pub failed: u32,
    /// Attempts that failed transiently and stay queued.
    pub retried: u32,
    pub exhausted: u32,
}

impl DrainSummary {
    /// Entries removed from the store during the pass.
    pub fn removed(&self) -> u32 {
        self.succeeded + self.failed + self.exhausted
    }
}

impl fmt::Display for DrainSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attempted={} succeeded={} failed={} retried={} exhausted={}",
            self.attempted, self.succeeded, self.failed, self.retried, self.exhausted
        )
    }
}
