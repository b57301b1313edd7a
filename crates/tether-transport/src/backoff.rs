// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reconnect backoff schedule.

use std::time::Duration;

/// Upper bound for any reconnect delay.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Delay before reconnect number `attempt + 1`: `min(base * 2^attempt, 30s)`.
pub fn reconnect_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(MAX_RECONNECT_DELAY)
}
