// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Dead-band gating between curve output and the smoother.
//!
//! Borderline load readings make curve targets flutter by a millivolt or
//! two; re-applying on every flutter would hunt the hardware. The gate
//! passes a new target only when it escapes the configured dead-band around
//! the last applied value.

/// Per-core hysteresis gate.
///
/// The dead-band is configured in percent of the usable offset span; with
/// the 100 mV platform span the percent maps one-to-one to millivolts.
#[derive(Debug, Clone)]
pub struct HysteresisGate {
    dead_band_mv: f64,
    last_applied: Vec<Option<i32>>,
}

impl HysteresisGate {
    pub fn new(core_count: usize, dead_band_pct: f64) -> Self {
        Self {
            dead_band_mv: dead_band_pct,
            last_applied: vec![None; core_count],
        }
    }

    /// Whether a new target escapes the dead-band for this core.
    ///
    /// The first target after startup (or a reset) is always accepted.
    pub fn accepts(&self, core: usize, target_mv: i32) -> bool {
        match self.last_applied.get(core).copied().flatten() {
            Some(last) => ((target_mv - last).abs() as f64) >= self.dead_band_mv,
            None => true,
        }
    }

    /// Record a successfully applied value for future gating.
    pub fn record_applied(&mut self, core: usize, applied_mv: i32) {
        if let Some(slot) = self.last_applied.get_mut(core) {
            *slot = Some(applied_mv);
        }
    }

    pub fn last_applied(&self, core: usize) -> Option<i32> {
        self.last_applied.get(core).copied().flatten()
    }

    /// Forget all applied values, e.g. after a recovery rollback.
    pub fn reset(&mut self) {
        for slot in &mut self.last_applied {
            *slot = None;
        }
    }
}
