// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Per-core voltage ramping.
//!
//! An accepted target is never applied in one jump. Each core walks from its
//! current offset toward the target in bounded per-tick steps sized so the
//! whole transition spans the strategy's ramp duration, with a 1 mV minimum
//! so transitions always make progress.

/// Smallest per-tick advance; guarantees forward progress on any ramp.
pub const MIN_STEP_MV: i32 = 1;

#[derive(Debug, Clone, Copy)]
struct CoreRamp {
    current_mv: i32,
    target_mv: i32,
    start_mv: i32,
    step_mv: i32,
}

impl CoreRamp {
    fn settled() -> Self {
        Self {
            current_mv: 0,
            target_mv: 0,
            start_mv: 0,
            step_mv: MIN_STEP_MV,
        }
    }
}

/// In-flight transition snapshot for the status stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampProgress {
    pub core: usize,
    pub from_mv: i32,
    pub to_mv: i32,
    /// 0.0 at the old value, 1.0 on arrival
    pub progress: f64,
}

/// Bounded-step smoother over all cores.
#[derive(Debug, Clone)]
pub struct VoltageSmoother {
    ramp_ms: u64,
    tick_ms: u64,
    cores: Vec<CoreRamp>,
}

impl VoltageSmoother {
    pub fn new(core_count: usize, ramp_ms: u64, tick_ms: u64) -> Self {
        Self {
            ramp_ms,
            tick_ms: tick_ms.max(1),
            cores: vec![CoreRamp::settled(); core_count],
        }
    }

    /// Number of ticks a full transition is spread across.
    fn ramp_ticks(&self) -> u64 {
        (self.ramp_ms / self.tick_ms).max(1)
    }

    /// Point a core at a new target, sizing the per-tick step from the
    /// remaining distance and the ramp duration.
    pub fn set_target(&mut self, core: usize, target_mv: i32) {
        let ticks = self.ramp_ticks();
        if let Some(ramp) = self.cores.get_mut(core) {
            if ramp.target_mv == target_mv {
                return;
            }
            ramp.target_mv = target_mv;
            ramp.start_mv = ramp.current_mv;
            let distance = (target_mv - ramp.current_mv).unsigned_abs() as u64;
            ramp.step_mv = (distance.div_ceil(ticks) as i32).max(MIN_STEP_MV);
        }
    }

    /// Advance one core by at most one step; returns the new current value.
    pub fn advance(&mut self, core: usize) -> i32 {
        match self.cores.get_mut(core) {
            Some(ramp) => {
                let delta = ramp.target_mv - ramp.current_mv;
                if delta != 0 {
                    let step = ramp.step_mv.min(delta.abs());
                    ramp.current_mv += step * delta.signum();
                }
                ramp.current_mv
            }
            None => 0,
        }
    }

    /// Drop a core straight onto a value, cancelling any ramp in flight.
    ///
    /// Used by recovery paths where the reduced or rolled-back offset must
    /// take effect immediately.
    pub fn snap_to(&mut self, core: usize, value_mv: i32) {
        if let Some(ramp) = self.cores.get_mut(core) {
            ramp.current_mv = value_mv;
            ramp.target_mv = value_mv;
            ramp.start_mv = value_mv;
        }
    }

    pub fn current(&self, core: usize) -> i32 {
        self.cores.get(core).map_or(0, |r| r.current_mv)
    }

    pub fn current_all(&self) -> Vec<i32> {
        self.cores.iter().map(|r| r.current_mv).collect()
    }

    pub fn target(&self, core: usize) -> i32 {
        self.cores.get(core).map_or(0, |r| r.target_mv)
    }

    pub fn at_target(&self, core: usize) -> bool {
        self.cores
            .get(core)
            .map_or(true, |r| r.current_mv == r.target_mv)
    }

    pub fn step_mv(&self, core: usize) -> i32 {
        self.cores.get(core).map_or(MIN_STEP_MV, |r| r.step_mv)
    }

    /// Snapshots of every core still mid-ramp.
    pub fn ramps_in_flight(&self) -> Vec<RampProgress> {
        self.cores
            .iter()
            .enumerate()
            .filter(|(_, r)| r.current_mv != r.target_mv)
            .map(|(core, r)| {
                let total = (r.target_mv - r.start_mv).abs();
                let covered = (r.current_mv - r.start_mv).abs();
                let progress = if total == 0 {
                    1.0
                } else {
                    covered as f64 / total as f64
                };
                RampProgress {
                    core,
                    from_mv: r.start_mv,
                    to_mv: r.target_mv,
                    progress,
                }
            })
            .collect()
    }
}
