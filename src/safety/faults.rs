// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Consecutive-fault accounting for the apply path.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Consecutive apply faults that signal instability to the recovery
/// machine.
pub const INSTABILITY_THRESHOLD: u32 = 3;

/// Consecutive apply faults after which recovery is considered exhausted
/// and the daemon must terminate.
pub const FATAL_THRESHOLD: u32 = 5;

/// Shared counter of voltage-apply faults.
///
/// Emergency zeroing attempts are never recorded here; only regular
/// control-loop applies feed it.
#[derive(Debug)]
pub struct FaultCounter {
    consecutive: AtomicU32,
    total: AtomicU64,
}

impl Default for FaultCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl FaultCounter {
    pub fn new() -> Self {
        Self {
            consecutive: AtomicU32::new(0),
            total: AtomicU64::new(0),
        }
    }

    /// Record a failed apply; returns the new consecutive count.
    pub fn record_fault(&self) -> u32 {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.consecutive.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record a successful apply, clearing the consecutive run.
    pub fn record_success(&self) {
        self.consecutive.store(0, Ordering::Relaxed);
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Enough consecutive faults to hand control to the recovery machine.
    pub fn is_unstable(&self) -> bool {
        self.consecutive() >= INSTABILITY_THRESHOLD
    }

    /// Recovery exhausted; the daemon must exit.
    pub fn is_exhausted(&self) -> bool {
        self.consecutive() >= FATAL_THRESHOLD
    }

    pub fn reset(&self) {
        self.consecutive.store(0, Ordering::Relaxed);
    }
}
