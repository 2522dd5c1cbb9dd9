// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Curve engine: strategies and the curves they evaluate.
//!
//! Two interchangeable target sources exist. The load path evaluates a
//! per-core [`LoadCurve`] (or custom points) against sampled CPU load; the
//! frequency path interpolates a wizard-produced [`FrequencyCurve`] against
//! the core's current frequency. Every result is clamped into the platform
//! safe range before it can reach hardware.

mod frequency;
mod load;

pub use frequency::{FrequencyCurve, FrequencyPoint};
pub use load::{evaluate_points, sort_points, CurvePoint, LoadCurve};

use serde::{Deserialize, Serialize};

/// Deepest undervolt offset the platform tolerates (mV).
pub const SAFE_VOLTAGE_FLOOR_MV: i32 = -100;

/// Offsets never exceed stock voltage.
pub const SAFE_VOLTAGE_CEILING_MV: i32 = 0;

/// Clamp an offset into the platform safe range.
pub fn clamp_offset_mv(offset_mv: i32) -> i32 {
    offset_mv.clamp(SAFE_VOLTAGE_FLOOR_MV, SAFE_VOLTAGE_CEILING_MV)
}

/// Adaptation strategy: how aggressively the smoother chases a new target.
///
/// A closed set of ramp presets plus a custom variant carrying its own ramp
/// and optional curve points. Dispatch is by `match`; no trait objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Slow 5 s ramp, widest stability margin
    Conservative,
    /// Default 2 s ramp
    Balanced,
    /// Fast 500 ms ramp for benchmarking-style workloads
    Aggressive,
    /// User-supplied ramp and optional explicit curve points
    Custom {
        #[serde(default = "default_custom_ramp_ms")]
        ramp_ms: u64,
        #[serde(default)]
        points: Vec<CurvePoint>,
    },
}

fn default_custom_ramp_ms() -> u64 {
    2000
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::Balanced
    }
}

impl Strategy {
    /// Total ramp duration from old to new target.
    pub fn ramp_time_ms(&self) -> u64 {
        match self {
            Strategy::Conservative => 5000,
            Strategy::Balanced => 2000,
            Strategy::Aggressive => 500,
            Strategy::Custom { ramp_ms, .. } => *ramp_ms,
        }
    }

    /// Stable name used in the status stream and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Conservative => "conservative",
            Strategy::Balanced => "balanced",
            Strategy::Aggressive => "aggressive",
            Strategy::Custom { .. } => "custom",
        }
    }

    /// Target offset for one core from its load sample.
    ///
    /// Custom strategies with explicit points interpolate those points and
    /// confine the result to the core's configured bounds; every other
    /// strategy evaluates the core's two-segment curve directly.
    pub fn target_mv(&self, curve: &LoadCurve, load_pct: f64) -> i32 {
        match self {
            Strategy::Custom { points, .. } if !points.is_empty() => {
                let raw = evaluate_points(points, load_pct);
                let (lower, upper) = curve.bounds();
                clamp_offset_mv(raw.clamp(lower, upper))
            }
            _ => curve.evaluate(load_pct),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ramp_time_presets() {
        assert_eq!(Strategy::Conservative.ramp_time_ms(), 5000);
        assert_eq!(Strategy::Balanced.ramp_time_ms(), 2000);
        assert_eq!(Strategy::Aggressive.ramp_time_ms(), 500);
        assert_eq!(
            Strategy::Custom {
                ramp_ms: 1250,
                points: vec![],
            }
            .ramp_time_ms(),
            1250
        );
    }

    #[test]
    fn test_strategy_names() {
        assert_eq!(Strategy::Conservative.name(), "conservative");
        assert_eq!(Strategy::Balanced.name(), "balanced");
        assert_eq!(Strategy::Aggressive.name(), "aggressive");
        assert_eq!(
            Strategy::Custom {
                ramp_ms: 100,
                points: vec![],
            }
            .name(),
            "custom"
        );
    }

    #[test]
    fn test_default_strategy_is_balanced() {
        assert_eq!(Strategy::default(), Strategy::Balanced);
    }

    #[test]
    fn test_clamp_offset_mv() {
        assert_eq!(clamp_offset_mv(-250), SAFE_VOLTAGE_FLOOR_MV);
        assert_eq!(clamp_offset_mv(12), SAFE_VOLTAGE_CEILING_MV);
        assert_eq!(clamp_offset_mv(-42), -42);
    }

    #[test]
    fn test_preset_target_uses_core_curve() {
        let curve = LoadCurve::new(-30, -15, 50.0);
        assert_eq!(Strategy::Balanced.target_mv(&curve, 20.0), -30);
        assert_eq!(Strategy::Aggressive.target_mv(&curve, 80.0), -15);
    }

    #[test]
    fn test_custom_without_points_falls_back_to_curve() {
        let curve = LoadCurve::new(-30, -15, 50.0);
        let strategy = Strategy::Custom {
            ramp_ms: 900,
            points: vec![],
        };
        assert_eq!(strategy.target_mv(&curve, 20.0), -30);
    }

    #[test]
    fn test_custom_points_confined_to_core_bounds() {
        let curve = LoadCurve::new(-20, -10, 50.0);
        let strategy = Strategy::Custom {
            ramp_ms: 900,
            points: vec![
                CurvePoint {
                    load_pct: 0.0,
                    offset_mv: -60,
                },
                CurvePoint {
                    load_pct: 100.0,
                    offset_mv: 0,
                },
            ],
        };
        // Raw interpolation at 0% would be -60; the core's bounds cap it.
        assert_eq!(strategy.target_mv(&curve, 0.0), -20);
        assert_eq!(strategy.target_mv(&curve, 100.0), -10);
    }

    #[test]
    fn test_strategy_serde_preset() {
        let json = serde_json::to_string(&Strategy::Aggressive).unwrap();
        assert_eq!(json, "\"aggressive\"");
        let parsed: Strategy = serde_json::from_str("\"conservative\"").unwrap();
        assert_eq!(parsed, Strategy::Conservative);
    }

    #[test]
    fn test_strategy_serde_custom() {
        let parsed: Strategy =
            serde_json::from_str(r#"{"custom": {"ramp_ms": 750}}"#).unwrap();
        match parsed {
            Strategy::Custom { ramp_ms, points } => {
                assert_eq!(ramp_ms, 750);
                assert!(points.is_empty());
            }
            other => panic!("expected custom strategy, got {other:?}"),
        }
    }
}
