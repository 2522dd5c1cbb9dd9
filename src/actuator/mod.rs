// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Voltage actuation behind a backend trait.
//!
//! The control loop talks to [`VoltageApplier`] only; the production
//! backend shells out to the ryzenadj utility. The sync zeroing entry
//! point exists so panic and signal paths can drop offsets without an
//! async runtime.

mod ryzenadj;

pub use ryzenadj::{RyzenadjApplier, APPLY_TIMEOUT};

use async_trait::async_trait;

use crate::error::Result;

/// One core's requested voltage offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreOffset {
    pub core: usize,
    pub offset_mv: i32,
}

impl CoreOffset {
    pub fn new(core: usize, offset_mv: i32) -> Self {
        Self { core, offset_mv }
    }
}

/// Backend that writes voltage offsets to hardware.
#[async_trait]
pub trait VoltageApplier: Send + Sync {
    /// Backend name for logs and status records.
    fn name(&self) -> &str;

    /// Startup check that the backend can actuate at all.
    async fn probe(&self) -> Result<()>;

    /// Apply the given offsets. Implementations must reject any offset
    /// outside the platform-safe range instead of forwarding it.
    async fn apply(&self, offsets: &[CoreOffset]) -> Result<()>;

    /// Synchronously force every core back to offset 0. Must be callable
    /// without a runtime and must attempt all cores even after a failure.
    fn zero_all_sync(&self, core_count: usize) -> Result<()>;
}
