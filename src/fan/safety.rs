// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Hard thermal overrides.
//!
//! These are checked against the raw (unfiltered) temperature and win over
//! every other stage of the fan pipeline. The critical override bypasses
//! smoothing entirely; the high-temperature floor is re-applied after
//! smoothing so a ramp in progress can never undercut it.

/// Above this temperature the fan is forced to full duty at once.
pub const CRITICAL_TEMP_C: f64 = 90.0;

/// From this temperature up, duty never drops below [`HIGH_TEMP_FLOOR_PWM`].
pub const HIGH_TEMP_C: f64 = 85.0;

/// 80% duty floor for the high-temperature band.
pub const HIGH_TEMP_FLOOR_PWM: u8 = 204;

/// Zero-RPM operation is only permitted at or below this temperature.
pub const ZERO_RPM_MAX_TEMP_C: f64 = 45.0;

/// Lowest duty that keeps the rotor turning.
pub const MIN_SPIN_PWM: u8 = 30;

pub const PWM_MAX: u8 = 255;

/// Outcome of the override stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverrideDecision {
    pub pwm: u8,
    /// Critical heat: write immediately, skip smoothing.
    pub bypass_smoothing: bool,
    /// Whether any override changed the computed value.
    pub active: bool,
}

/// Clamp a computed PWM against the hard thermal rules.
pub fn apply_overrides(raw_temp_c: f64, computed_pwm: u8, zero_rpm_enabled: bool) -> OverrideDecision {
    if raw_temp_c >= CRITICAL_TEMP_C {
        return OverrideDecision {
            pwm: PWM_MAX,
            bypass_smoothing: true,
            active: true,
        };
    }

    let mut pwm = computed_pwm;
    if raw_temp_c >= HIGH_TEMP_C {
        pwm = pwm.max(HIGH_TEMP_FLOOR_PWM);
    }
    if pwm == 0 && !(zero_rpm_enabled && raw_temp_c <= ZERO_RPM_MAX_TEMP_C) {
        pwm = MIN_SPIN_PWM;
    }

    OverrideDecision {
        pwm,
        bypass_smoothing: false,
        active: pwm != computed_pwm,
    }
}
