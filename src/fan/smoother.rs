// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Rate-limited PWM transitions.
//!
//! Spin-up may use the full configured rate; spin-down is limited to half
//! of it so a brief dip in temperature cannot stall the fan while heat is
//! still soaking out.

/// Ramp-limited PWM value holder.
#[derive(Debug, Clone)]
pub struct PwmSmoother {
    increase_step: u32,
    decrease_step: u32,
    current: Option<u8>,
}

impl PwmSmoother {
    /// `ramp_ms` is the time a full 0→255 sweep should take at `tick_ms`
    /// cadence.
    pub fn new(ramp_ms: u64, tick_ms: u64) -> Self {
        let ramp_ms = ramp_ms.max(1);
        let increase_step = (255 * tick_ms).div_ceil(ramp_ms).clamp(1, 255) as u32;
        let decrease_step = (increase_step / 2).max(1);
        Self {
            increase_step,
            decrease_step,
            current: None,
        }
    }

    /// Adopt the hardware's present duty as the ramp starting point.
    pub fn seed(&mut self, pwm: u8) {
        self.current = Some(pwm);
    }

    /// Step toward `target`, returning the new value. Without a seed the
    /// first call adopts the target outright.
    pub fn advance(&mut self, target: u8) -> u8 {
        let next = match self.current {
            None => target,
            Some(current) if target > current => {
                let gap = u32::from(target - current);
                current + gap.min(self.increase_step) as u8
            }
            Some(current) if target < current => {
                let gap = u32::from(current - target);
                current - gap.min(self.decrease_step) as u8
            }
            Some(current) => current,
        };
        self.current = Some(next);
        next
    }

    /// Snap to a value immediately, abandoning any ramp in progress.
    pub fn force(&mut self, pwm: u8) -> u8 {
        self.current = Some(pwm);
        pwm
    }

    pub fn current(&self) -> Option<u8> {
        self.current
    }
}
