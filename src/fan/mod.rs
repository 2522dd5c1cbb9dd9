// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Fan control: hwmon discovery, curve evaluation, smoothing, and the
//! hard thermal overrides.

mod controller;
mod curve;
pub mod hwmon;
mod safety;
mod smoother;

pub use controller::{FanController, FanStatus, TEMP_WINDOW_SAMPLES};
pub use curve::{speed_pct_to_pwm, FanCurve, FanPoint, MAX_CURVE_POINTS, MIN_CURVE_POINTS};
pub use hwmon::{FanDevice, SUPPORTED_DEVICE_NAMES};
pub use safety::{
    apply_overrides, OverrideDecision, CRITICAL_TEMP_C, HIGH_TEMP_C, HIGH_TEMP_FLOOR_PWM,
    MIN_SPIN_PWM, PWM_MAX, ZERO_RPM_MAX_TEMP_C,
};
pub use smoother::PwmSmoother;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Fan operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanMode {
    /// Hands off; the BIOS keeps the fan.
    Default,
    /// Curve-driven control.
    Custom,
    /// Constant configured speed.
    Fixed,
}

impl Default for FanMode {
    fn default() -> Self {
        FanMode::Default
    }
}

impl FanMode {
    pub fn name(&self) -> &'static str {
        match self {
            FanMode::Default => "default",
            FanMode::Custom => "custom",
            FanMode::Fixed => "fixed",
        }
    }
}

/// Shared handle over the fan device with exactly-once release.
///
/// Clones share the acquisition flag, so the emergency reset path and the
/// controller's own shutdown cannot double-release or race each other.
#[derive(Debug, Clone)]
pub struct FanHandle {
    device: Arc<FanDevice>,
    took_control: Arc<AtomicBool>,
}

impl FanHandle {
    pub fn new(device: FanDevice) -> Self {
        Self {
            device: Arc::new(device),
            took_control: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn device(&self) -> &FanDevice {
        &self.device
    }

    /// Switch the device to manual control.
    pub fn acquire(&self) -> Result<()> {
        self.device.set_manual()?;
        self.took_control.store(true, Ordering::SeqCst);
        tracing::info!(device = self.device.name(), "fan under manual control");
        Ok(())
    }

    /// Hand the device back to automatic control. Only the first call after
    /// an acquisition does anything; failures are logged, never propagated,
    /// so every exit path can call this unconditionally.
    pub fn release(&self) {
        if self.took_control.swap(false, Ordering::SeqCst) {
            match self.device.set_automatic() {
                Ok(()) => tracing::info!(device = self.device.name(), "fan returned to automatic"),
                Err(e) => {
                    tracing::error!(device = self.device.name(), error = %e, "fan release failed")
                }
            }
        }
    }

    pub fn controls_hardware(&self) -> bool {
        self.took_control.load(Ordering::SeqCst)
    }
}
