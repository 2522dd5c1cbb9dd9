// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use proptest::prelude::*;

use corevoltd::control::{HysteresisGate, VoltageSmoother};

#[test]
fn test_ramp_spreads_over_strategy_duration() {
    // 2 s ramp at a 500 ms tick: four steps of 8 mV to cover 30 mV.
    let mut smoother = VoltageSmoother::new(1, 2_000, 500);
    smoother.set_target(0, -30);

    let mut seen = Vec::new();
    for _ in 0..4 {
        seen.push(smoother.advance(0));
    }
    assert_eq!(seen, vec![-8, -16, -24, -30]);
    assert!(smoother.at_target(0));
}

#[test]
fn test_single_tick_ramp_jumps_straight() {
    let mut smoother = VoltageSmoother::new(1, 500, 500);
    smoother.set_target(0, -30);
    assert_eq!(smoother.advance(0), -30);
}

#[test]
fn test_retarget_mid_ramp_resizes_step() {
    let mut smoother = VoltageSmoother::new(1, 2_000, 500);
    smoother.set_target(0, -30);
    smoother.advance(0);
    smoother.advance(0);
    assert_eq!(smoother.current(0), -16);

    // New target 12 mV away re-sizes to 3 mV steps over four ticks.
    smoother.set_target(0, -4);
    assert_eq!(smoother.advance(0), -13);
    assert_eq!(smoother.advance(0), -10);
    assert_eq!(smoother.advance(0), -7);
    assert_eq!(smoother.advance(0), -4);
}

#[test]
fn test_repeated_target_keeps_ramp_state() {
    let mut smoother = VoltageSmoother::new(1, 2_000, 500);
    smoother.set_target(0, -30);
    smoother.advance(0);

    // Re-announcing the same target must not restart the ramp.
    smoother.set_target(0, -30);
    assert_eq!(smoother.advance(0), -16);
}

#[test]
fn test_snap_cancels_ramp_in_flight() {
    let mut smoother = VoltageSmoother::new(2, 2_000, 500);
    smoother.set_target(0, -30);
    smoother.advance(0);

    smoother.snap_to(0, -5);
    assert_eq!(smoother.current(0), -5);
    assert_eq!(smoother.target(0), -5);
    assert!(smoother.at_target(0));
    assert!(smoother.ramps_in_flight().is_empty());
}

#[test]
fn test_minimum_step_still_progresses() {
    // 2 mV over four ticks rounds up to 1 mV steps.
    let mut smoother = VoltageSmoother::new(1, 2_000, 500);
    smoother.set_target(0, -2);
    assert_eq!(smoother.advance(0), -1);
    assert_eq!(smoother.advance(0), -2);
}

#[test]
fn test_ramp_progress_snapshot() {
    let mut smoother = VoltageSmoother::new(1, 2_000, 500);
    smoother.set_target(0, -30);
    smoother.advance(0);

    let ramps = smoother.ramps_in_flight();
    assert_eq!(ramps.len(), 1);
    assert_eq!(ramps[0].core, 0);
    assert_eq!(ramps[0].from_mv, 0);
    assert_eq!(ramps[0].to_mv, -30);
    assert!((ramps[0].progress - 8.0 / 30.0).abs() < 1e-9);

    for _ in 0..3 {
        smoother.advance(0);
    }
    assert!(smoother.ramps_in_flight().is_empty());
}

#[test]
fn test_unknown_core_is_inert() {
    let mut smoother = VoltageSmoother::new(2, 2_000, 500);
    smoother.set_target(9, -30);
    assert_eq!(smoother.advance(9), 0);
    assert_eq!(smoother.current(9), 0);
    assert!(smoother.at_target(9));
}

#[test]
fn test_gate_accepts_first_target() {
    let gate = HysteresisGate::new(2, 5.0);
    assert!(gate.accepts(0, -1));
    assert!(gate.accepts(1, 0));
}

#[test]
fn test_gate_band_edges() {
    let mut gate = HysteresisGate::new(1, 5.0);
    gate.record_applied(0, -20);

    assert!(!gate.accepts(0, -20));
    assert!(!gate.accepts(0, -16));
    assert!(!gate.accepts(0, -24));
    // The band is inclusive at exactly the configured width.
    assert!(gate.accepts(0, -15));
    assert!(gate.accepts(0, -25));
}

#[test]
fn test_gate_reset_forgets_applied_values() {
    let mut gate = HysteresisGate::new(1, 5.0);
    gate.record_applied(0, -20);
    assert!(!gate.accepts(0, -19));

    gate.reset();
    assert!(gate.accepts(0, -19));
    assert_eq!(gate.last_applied(0), None);
}

proptest! {
    #[test]
    fn test_smoother_converges_without_overshoot(
        start in -100i32..=0,
        target in -100i32..=0,
        ramp_ms in 100u64..=10_000,
        tick_ms in 100u64..=1_000,
    ) {
        let mut smoother = VoltageSmoother::new(1, ramp_ms, tick_ms);
        smoother.snap_to(0, start);
        smoother.set_target(0, target);

        let ticks = (ramp_ms / tick_ms).max(1);
        let mut prev = start;
        for _ in 0..ticks {
            let now = smoother.advance(0);
            if target >= start {
                prop_assert!(now >= prev && now <= target);
            } else {
                prop_assert!(now <= prev && now >= target);
            }
            prev = now;
        }
        prop_assert_eq!(smoother.current(0), target);
    }

    #[test]
    fn test_gate_decision_matches_band_distance(
        last in -100i32..=0,
        target in -100i32..=0,
        band_pct in 1.0f64..=20.0,
    ) {
        let mut gate = HysteresisGate::new(1, band_pct);
        gate.record_applied(0, last);

        let expected = ((target - last).abs() as f64) >= band_pct;
        prop_assert_eq!(gate.accepts(0, target), expected);
    }
}
