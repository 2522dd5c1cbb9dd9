// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Temperature→PWM control loop.
//!
//! Per tick: read temperature, smooth it over a short window, gate on the
//! temperature dead-band, turn the curve output into a PWM target, clamp
//! through the hard overrides, ramp, and write. Overrides check the raw
//! (unfiltered) reading and are re-applied after ramping so no in-flight
//! transition can undercut them.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::curve::{speed_pct_to_pwm, FanCurve};
use super::safety;
use super::smoother::PwmSmoother;
use super::{FanHandle, FanMode};
use crate::config::FanSettings;
use crate::error::Result;

/// Moving-average window over temperature samples.
pub const TEMP_WINDOW_SAMPLES: usize = 5;

/// Smallest PWM delta worth a sysfs write, endpoints excepted.
const WRITE_DELTA_THRESHOLD: i16 = 3;

/// Short moving average over recent temperature readings.
#[derive(Debug, Default)]
struct TempFilter {
    window: VecDeque<f64>,
}

impl TempFilter {
    fn push(&mut self, temp_c: f64) -> f64 {
        if self.window.len() == TEMP_WINDOW_SAMPLES {
            self.window.pop_front();
        }
        self.window.push_back(temp_c);
        self.window.iter().sum::<f64>() / self.window.len() as f64
    }
}

/// Fan state for one status record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanStatus {
    pub temp_c: f64,
    pub pwm: u8,
    pub rpm: Option<u32>,
    pub mode: FanMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Curve-driven fan controller over one hwmon device.
#[derive(Debug)]
pub struct FanController {
    handle: FanHandle,
    mode: FanMode,
    curve: FanCurve,
    fixed_speed_pct: u32,
    zero_rpm: bool,
    hysteresis_c: f64,
    filter: TempFilter,
    smoother: PwmSmoother,
    last_acted_temp: Option<f64>,
    target_pwm: u8,
    last_written: Option<u8>,
    last_temp: Option<f64>,
    read_failures: u32,
}

impl FanController {
    pub fn new(handle: FanHandle, settings: &FanSettings, tick_ms: u64) -> Self {
        Self {
            handle,
            mode: settings.mode,
            curve: settings.curve.clone(),
            fixed_speed_pct: settings.fixed_speed_pct,
            zero_rpm: settings.zero_rpm,
            hysteresis_c: f64::from(settings.hysteresis_c),
            filter: TempFilter::default(),
            smoother: PwmSmoother::new(settings.ramp_ms, tick_ms),
            last_acted_temp: None,
            target_pwm: 0,
            last_written: None,
            last_temp: None,
            read_failures: 0,
        }
    }

    /// Take manual control of the fan. A hands-off mode never acquires.
    pub fn start(&mut self) -> Result<()> {
        if self.mode == FanMode::Default {
            return Ok(());
        }
        self.handle.acquire()?;
        if let Ok(pwm) = self.handle.device().read_pwm() {
            self.smoother.seed(pwm);
            self.last_written = Some(pwm);
        }
        Ok(())
    }

    /// Handle for the emergency release path.
    pub fn handle(&self) -> FanHandle {
        self.handle.clone()
    }

    pub fn stop(&self) {
        self.handle.release();
    }

    fn status(&self, temp_c: f64, pwm: u8, error: Option<String>) -> FanStatus {
        FanStatus {
            temp_c,
            pwm,
            rpm: self.handle.device().read_rpm().ok(),
            mode: self.mode,
            error,
        }
    }

    /// Run one control cycle and report the resulting fan state.
    pub fn tick(&mut self) -> FanStatus {
        let device = self.handle.device();
        let raw_temp = match device.read_temp_c() {
            Ok(temp) => {
                self.read_failures = 0;
                self.last_temp = Some(temp);
                temp
            }
            Err(e) => {
                self.read_failures = self.read_failures.saturating_add(1);
                tracing::warn!(failures = self.read_failures, error = %e, "fan temperature read failed");
                let held = self
                    .last_written
                    .or(self.smoother.current())
                    .unwrap_or(0);
                return self.status(self.last_temp.unwrap_or(0.0), held, Some(e.to_string()));
            }
        };

        let avg_temp = self.filter.push(raw_temp);

        if self.mode == FanMode::Default {
            let pwm = device.read_pwm().unwrap_or(0);
            return self.status(raw_temp, pwm, None);
        }

        let recompute = match self.last_acted_temp {
            None => true,
            Some(prev) => (avg_temp - prev).abs() >= self.hysteresis_c,
        };
        if recompute {
            let speed_pct = match self.mode {
                FanMode::Custom => self.curve.speed_at(avg_temp),
                FanMode::Fixed => self.fixed_speed_pct,
                FanMode::Default => 0,
            };
            self.target_pwm = speed_pct_to_pwm(speed_pct);
            self.last_acted_temp = Some(avg_temp);
        }

        let decision = safety::apply_overrides(raw_temp, self.target_pwm, self.zero_rpm);
        let ramped = if decision.bypass_smoothing {
            self.smoother.force(decision.pwm)
        } else {
            self.smoother.advance(decision.pwm)
        };
        // A ramp step may still sit under the floor; clamp the written value
        // and keep the ramp state in sync with what the hardware gets.
        let final_pwm = safety::apply_overrides(raw_temp, ramped, self.zero_rpm).pwm;
        if final_pwm != ramped {
            self.smoother.force(final_pwm);
        }

        let mut error = None;
        if self.should_write(final_pwm) {
            match device.write_pwm(final_pwm) {
                Ok(()) => {
                    tracing::trace!(pwm = final_pwm, temp_c = raw_temp, "pwm written");
                    self.last_written = Some(final_pwm);
                }
                Err(e) => {
                    tracing::warn!(pwm = final_pwm, error = %e, "pwm write failed");
                    error = Some(e.to_string());
                }
            }
        }

        self.status(raw_temp, self.last_written.unwrap_or(final_pwm), error)
    }

    fn should_write(&self, pwm: u8) -> bool {
        match self.last_written {
            None => true,
            Some(prev) if prev == pwm => false,
            Some(prev) => {
                let delta = (i16::from(pwm) - i16::from(prev)).abs();
                delta >= WRITE_DELTA_THRESHOLD || pwm == 0 || pwm == safety::PWM_MAX
            }
        }
    }
}

impl Drop for FanController {
    fn drop(&mut self) {
        self.handle.release();
    }
}
