// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Frequency-to-voltage curves produced by the offline tuning wizard.
//!
//! The daemon loads a curve read-only and interpolates the offset for the
//! core's current frequency each tick. Points are strictly increasing by
//! frequency; interpolation is integer math so an exact point match returns
//! the stored voltage bit-for-bit.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VoltError};

use super::{clamp_offset_mv, SAFE_VOLTAGE_CEILING_MV, SAFE_VOLTAGE_FLOOR_MV};

/// One calibrated frequency point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyPoint {
    pub frequency_mhz: u32,
    pub voltage_mv: i32,
    /// Whether the wizard confirmed this point stable under stress
    #[serde(default)]
    pub stable: bool,
}

impl FrequencyPoint {
    pub fn new(frequency_mhz: u32, voltage_mv: i32, stable: bool) -> Self {
        Self {
            frequency_mhz,
            voltage_mv,
            stable,
        }
    }
}

/// Ordered frequency→voltage curve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct FrequencyCurve {
    points: Vec<FrequencyPoint>,
}

impl FrequencyCurve {
    pub fn new(points: Vec<FrequencyPoint>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[FrequencyPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Check structural invariants: non-empty, voltages within the platform
    /// safe range, frequencies strictly increasing with no duplicates.
    pub fn validate(&self) -> Result<()> {
        if self.points.is_empty() {
            return Err(VoltError::Config(
                "frequency curve has no points".to_string(),
            ));
        }

        for point in &self.points {
            if point.voltage_mv < SAFE_VOLTAGE_FLOOR_MV || point.voltage_mv > SAFE_VOLTAGE_CEILING_MV
            {
                return Err(VoltError::Config(format!(
                    "frequency point {} MHz has voltage {} mV outside [{}, {}]",
                    point.frequency_mhz,
                    point.voltage_mv,
                    SAFE_VOLTAGE_FLOOR_MV,
                    SAFE_VOLTAGE_CEILING_MV
                )));
            }
        }

        for pair in self.points.windows(2) {
            if pair[1].frequency_mhz == pair[0].frequency_mhz {
                return Err(VoltError::Config(format!(
                    "frequency curve has duplicate point at {} MHz",
                    pair[0].frequency_mhz
                )));
            }
            if pair[1].frequency_mhz < pair[0].frequency_mhz {
                return Err(VoltError::Config(format!(
                    "frequency curve not sorted: {} MHz follows {} MHz",
                    pair[1].frequency_mhz, pair[0].frequency_mhz
                )));
            }
        }

        Ok(())
    }

    /// Voltage for a frequency.
    ///
    /// Below the first point or above the last clamps to that boundary's
    /// voltage; between points the voltage is linearly interpolated with
    /// integer arithmetic.
    pub fn voltage_at(&self, frequency_mhz: u32) -> Result<i32> {
        let first = self.points.first().ok_or_else(|| {
            VoltError::Config("frequency curve has no points".to_string())
        })?;
        // Non-empty, so last() is the same slice's end.
        let last = self.points[self.points.len() - 1];

        if self.points.len() == 1 || frequency_mhz <= first.frequency_mhz {
            return Ok(clamp_offset_mv(first.voltage_mv));
        }
        if frequency_mhz >= last.frequency_mhz {
            return Ok(clamp_offset_mv(last.voltage_mv));
        }

        for pair in self.points.windows(2) {
            let (p1, p2) = (pair[0], pair[1]);
            if frequency_mhz >= p1.frequency_mhz && frequency_mhz <= p2.frequency_mhz {
                let voltage_range = (p2.voltage_mv - p1.voltage_mv) as i64;
                let freq_offset = (frequency_mhz - p1.frequency_mhz) as i64;
                let freq_range = (p2.frequency_mhz - p1.frequency_mhz) as i64;
                let interpolated = p1.voltage_mv as i64 + voltage_range * freq_offset / freq_range;
                return Ok(clamp_offset_mv(interpolated as i32));
            }
        }

        // Sorted points make the loop exhaustive; keep the boundary fallback.
        Ok(clamp_offset_mv(last.voltage_mv))
    }
}
