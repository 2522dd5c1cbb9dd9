// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::collections::HashSet;

use super::{RunConfig, MAX_SAMPLE_INTERVAL_US, MIN_SAMPLE_INTERVAL_US};
use crate::curves::Strategy;
use crate::error::{Result, VoltError};

const MIN_VOLTAGE_HYSTERESIS_PCT: f64 = 1.0;
const MAX_VOLTAGE_HYSTERESIS_PCT: f64 = 20.0;
const MIN_FAN_HYSTERESIS_C: u8 = 1;
const MAX_FAN_HYSTERESIS_C: u8 = 10;
const MAX_FIXED_SPEED_PCT: u32 = 100;

impl RunConfig {
    /// Range-check every field. Called once after load + CLI overrides;
    /// a failure refuses startup.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_SAMPLE_INTERVAL_US..=MAX_SAMPLE_INTERVAL_US).contains(&self.sample_interval_us) {
            return Err(VoltError::Config(format!(
                "sample interval {}us out of range [{MIN_SAMPLE_INTERVAL_US}, {MAX_SAMPLE_INTERVAL_US}]",
                self.sample_interval_us
            )));
        }

        if !(MIN_VOLTAGE_HYSTERESIS_PCT..=MAX_VOLTAGE_HYSTERESIS_PCT).contains(&self.hysteresis_pct)
        {
            return Err(VoltError::Config(format!(
                "voltage hysteresis {}% out of range [{MIN_VOLTAGE_HYSTERESIS_PCT}, {MAX_VOLTAGE_HYSTERESIS_PCT}]",
                self.hysteresis_pct
            )));
        }

        if self.status_interval_ms == 0 {
            return Err(VoltError::Config(
                "status interval must be at least 1ms".to_string(),
            ));
        }

        self.default_curve
            .validate()
            .map_err(|e| VoltError::Config(format!("default curve: {e}")))?;

        let mut seen = HashSet::new();
        for core in &self.cores {
            if !seen.insert(core.core_id) {
                return Err(VoltError::Config(format!(
                    "duplicate curve for core {}",
                    core.core_id
                )));
            }
            core.curve
                .validate()
                .map_err(|e| VoltError::Config(format!("core {}: {e}", core.core_id)))?;
        }

        if let Strategy::Custom { ramp_ms, points } = &self.strategy {
            if *ramp_ms == 0 {
                return Err(VoltError::Config(
                    "custom ramp duration must be nonzero".to_string(),
                ));
            }
            for point in points {
                if !(0.0..=100.0).contains(&point.load_pct) {
                    return Err(VoltError::Config(format!(
                        "custom curve load {}% out of range [0, 100]",
                        point.load_pct
                    )));
                }
                if !(crate::curves::SAFE_VOLTAGE_FLOOR_MV..=crate::curves::SAFE_VOLTAGE_CEILING_MV)
                    .contains(&point.offset_mv)
                {
                    return Err(VoltError::Config(format!(
                        "custom curve offset {} mV outside safe range",
                        point.offset_mv
                    )));
                }
            }
        }

        if let Some(curve) = &self.frequency_curve {
            curve.validate()?;
        }

        if self.fan.fixed_speed_pct > MAX_FIXED_SPEED_PCT {
            return Err(VoltError::Config(format!(
                "fixed fan speed {}% exceeds {MAX_FIXED_SPEED_PCT}%",
                self.fan.fixed_speed_pct
            )));
        }
        if !(MIN_FAN_HYSTERESIS_C..=MAX_FAN_HYSTERESIS_C).contains(&self.fan.hysteresis_c) {
            return Err(VoltError::Config(format!(
                "fan hysteresis {}C out of range [{MIN_FAN_HYSTERESIS_C}, {MAX_FAN_HYSTERESIS_C}]",
                self.fan.hysteresis_c
            )));
        }
        if self.fan.ramp_ms == 0 {
            return Err(VoltError::Config(
                "fan ramp duration must be nonzero".to_string(),
            ));
        }
        self.fan.curve.validate()?;

        Ok(())
    }
}
