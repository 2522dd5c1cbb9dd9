// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Temperature to fan-speed curve.

use serde::{Deserialize, Serialize};

use crate::error::VoltError;

/// Valid point counts for a fan curve.
pub const MIN_CURVE_POINTS: usize = 3;
pub const MAX_CURVE_POINTS: usize = 10;

const MAX_TEMP_C: u32 = 120;
const MAX_SPEED_PCT: u32 = 100;

/// One curve point: at `temp_c` degrees run the fan at `speed_pct`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanPoint {
    pub temp_c: u32,
    pub speed_pct: u32,
}

impl FanPoint {
    pub fn new(temp_c: u32, speed_pct: u32) -> Self {
        Self { temp_c, speed_pct }
    }
}

/// Ordered temperature→speed curve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FanCurve {
    points: Vec<FanPoint>,
}

impl Default for FanCurve {
    fn default() -> Self {
        Self {
            points: vec![
                FanPoint::new(40, 0),
                FanPoint::new(50, 30),
                FanPoint::new(70, 60),
                FanPoint::new(85, 100),
            ],
        }
    }
}

impl FanCurve {
    pub fn new(points: Vec<FanPoint>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[FanPoint] {
        &self.points
    }

    /// Check point count, per-point ranges, and strict temperature order.
    pub fn validate(&self) -> Result<(), VoltError> {
        if self.points.len() < MIN_CURVE_POINTS || self.points.len() > MAX_CURVE_POINTS {
            return Err(VoltError::Config(format!(
                "fan curve needs {MIN_CURVE_POINTS}-{MAX_CURVE_POINTS} points, got {}",
                self.points.len()
            )));
        }
        for point in &self.points {
            if point.temp_c > MAX_TEMP_C {
                return Err(VoltError::Config(format!(
                    "fan curve temperature {} exceeds {MAX_TEMP_C} C",
                    point.temp_c
                )));
            }
            if point.speed_pct > MAX_SPEED_PCT {
                return Err(VoltError::Config(format!(
                    "fan curve speed {}% exceeds {MAX_SPEED_PCT}%",
                    point.speed_pct
                )));
            }
        }
        for pair in self.points.windows(2) {
            if pair[1].temp_c <= pair[0].temp_c {
                return Err(VoltError::Config(format!(
                    "fan curve temperatures must be strictly increasing ({} then {})",
                    pair[0].temp_c, pair[1].temp_c
                )));
            }
        }
        Ok(())
    }

    /// Fan speed percentage for a temperature, clamped at the curve ends
    /// and linearly interpolated between points.
    pub fn speed_at(&self, temp_c: f64) -> u32 {
        let Some(first) = self.points.first() else {
            return 0;
        };
        if temp_c <= first.temp_c as f64 {
            return first.speed_pct;
        }
        let last = self.points[self.points.len() - 1];
        if temp_c >= last.temp_c as f64 {
            return last.speed_pct;
        }

        for pair in self.points.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            if temp_c <= hi.temp_c as f64 {
                let span = (hi.temp_c - lo.temp_c) as f64;
                let offset = temp_c - lo.temp_c as f64;
                let delta = hi.speed_pct as f64 - lo.speed_pct as f64;
                return (lo.speed_pct as f64 + delta * offset / span).round() as u32;
            }
        }
        last.speed_pct
    }
}

/// Convert a speed percentage to an 8-bit PWM duty value.
pub fn speed_pct_to_pwm(speed_pct: u32) -> u8 {
    let clamped = speed_pct.min(MAX_SPEED_PCT);
    ((clamped * 255 + 50) / 100) as u8
}
