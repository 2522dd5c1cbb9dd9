// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Load-based undervolt curves.
//!
//! A [`LoadCurve`] maps CPU load percent to a voltage offset with a hard
//! two-segment step: the `minimal` (deeper, conservative-margin) offset at
//! and below the threshold, the `maximum` offset above it. Custom strategies
//! may instead supply explicit `(load, offset)` points interpolated
//! piecewise-linearly.

use serde::{Deserialize, Serialize};

use super::{clamp_offset_mv, SAFE_VOLTAGE_CEILING_MV, SAFE_VOLTAGE_FLOOR_MV};

/// Two-point load curve for one core.
///
/// `minimal_value_mv` is the low-load offset, `maximum_value_mv` the
/// high-load offset. Either bound may be the numerically larger one; output
/// is always confined to the interval they span.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadCurve {
    /// Offset applied at and below the threshold (mV, negative)
    #[serde(default = "default_minimal_mv")]
    pub minimal_value_mv: i32,

    /// Offset applied above the threshold (mV, negative)
    #[serde(default = "default_maximum_mv")]
    pub maximum_value_mv: i32,

    /// Load percent at which the curve switches segments
    #[serde(default = "default_threshold_pct")]
    pub threshold_pct: f64,
}

fn default_minimal_mv() -> i32 {
    -30
}

fn default_maximum_mv() -> i32 {
    -15
}

fn default_threshold_pct() -> f64 {
    50.0
}

impl Default for LoadCurve {
    fn default() -> Self {
        Self {
            minimal_value_mv: default_minimal_mv(),
            maximum_value_mv: default_maximum_mv(),
            threshold_pct: default_threshold_pct(),
        }
    }
}

impl LoadCurve {
    pub fn new(minimal_value_mv: i32, maximum_value_mv: i32, threshold_pct: f64) -> Self {
        Self {
            minimal_value_mv,
            maximum_value_mv,
            threshold_pct,
        }
    }

    /// The interval spanned by the two bounds, as (lower, upper).
    pub fn bounds(&self) -> (i32, i32) {
        (
            self.minimal_value_mv.min(self.maximum_value_mv),
            self.minimal_value_mv.max(self.maximum_value_mv),
        )
    }

    /// Evaluate the curve at a load percent.
    ///
    /// Output never leaves `[min(bounds), max(bounds)]` nor the platform
    /// safe range, whatever the inputs.
    pub fn evaluate(&self, load_pct: f64) -> i32 {
        let load = if load_pct.is_finite() {
            load_pct.clamp(0.0, 100.0)
        } else {
            0.0
        };

        let raw = if load <= self.threshold_pct {
            self.minimal_value_mv
        } else {
            self.maximum_value_mv
        };

        let (lower, upper) = self.bounds();
        clamp_offset_mv(raw.clamp(lower, upper))
    }

    /// Whether both bounds sit inside the platform safe range.
    pub fn in_safe_range(&self) -> bool {
        let (lower, upper) = self.bounds();
        lower >= SAFE_VOLTAGE_FLOOR_MV && upper <= SAFE_VOLTAGE_CEILING_MV
    }

    /// Structural check run at configuration time.
    pub fn validate(&self) -> Result<(), String> {
        if !self.in_safe_range() {
            let (lower, upper) = self.bounds();
            return Err(format!(
                "load curve bounds [{lower}, {upper}] mV outside [{SAFE_VOLTAGE_FLOOR_MV}, {SAFE_VOLTAGE_CEILING_MV}]"
            ));
        }
        if !(0.0..=100.0).contains(&self.threshold_pct) {
            return Err(format!(
                "threshold {}% out of range [0, 100]",
                self.threshold_pct
            ));
        }
        Ok(())
    }
}

/// One point of a custom load curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub load_pct: f64,
    pub offset_mv: i32,
}

/// Sort custom points in place by load percent.
///
/// Run once at configuration time; evaluation assumes sorted input.
pub fn sort_points(points: &mut [CurvePoint]) {
    points.sort_by(|a, b| {
        a.load_pct
            .partial_cmp(&b.load_pct)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Evaluate a sorted custom point list at a load percent.
///
/// Loads outside the point range clamp to the nearest endpoint's offset. An
/// empty list is a constant 0 offset; a single point is a constant.
pub fn evaluate_points(points: &[CurvePoint], load_pct: f64) -> i32 {
    let load = if load_pct.is_finite() {
        load_pct.clamp(0.0, 100.0)
    } else {
        0.0
    };

    let raw = match points {
        [] => 0,
        [only] => only.offset_mv,
        [first, ..] if load <= first.load_pct => first.offset_mv,
        [.., last] if load >= last.load_pct => last.offset_mv,
        _ => {
            let mut result = points[points.len() - 1].offset_mv;
            for pair in points.windows(2) {
                let (p1, p2) = (pair[0], pair[1]);
                if load >= p1.load_pct && load <= p2.load_pct {
                    let span = p2.load_pct - p1.load_pct;
                    if span <= f64::EPSILON {
                        result = p1.offset_mv;
                    } else {
                        let t = (load - p1.load_pct) / span;
                        let interpolated =
                            p1.offset_mv as f64 + (p2.offset_mv - p1.offset_mv) as f64 * t;
                        result = interpolated.round() as i32;
                    }
                    break;
                }
            }
            result
        }
    };

    clamp_offset_mv(raw)
}
