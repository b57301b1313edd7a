// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Tether integration tests.
//!
//! Provides in-memory adapters for fast, deterministic tests without a
//! server or a database file.
//!
//! # Components
//!
//! - [`MockConnector`] - Scripted connector handing out [`MockPeer`] server ends
//! - [`MemoryRequestStore`] - In-memory queue store with failure injection
//! - [`ManualClock`] - Wall clock that only moves when told to

pub mod clock;
pub mod mock_connector;
pub mod mock_store;

pub use clock::ManualClock;
pub use mock_connector::{MockConnector, MockPeer};
pub use mock_store::MemoryRequestStore;
