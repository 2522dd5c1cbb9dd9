// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Runtime configuration.
//!
//! Loaded once at startup from an untrusted JSON byte stream (file or
//! stdin), overridden field-by-field from CLI flags, validated, then
//! treated as immutable. Arbitrary input bytes must never panic the
//! parser.

mod validation;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::curves::{FrequencyCurve, LoadCurve, Strategy};
use crate::error::{Result, VoltError};
use crate::fan::{FanCurve, FanMode};

/// Tick cadence bounds in microseconds.
pub const MIN_SAMPLE_INTERVAL_US: u64 = 10_000;
pub const MAX_SAMPLE_INTERVAL_US: u64 = 5_000_000;

pub const DEFAULT_SAMPLE_INTERVAL_US: u64 = 500_000;
pub const DEFAULT_STATUS_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_VOLTAGE_HYSTERESIS_PCT: f64 = 5.0;

fn default_sample_interval_us() -> u64 {
    DEFAULT_SAMPLE_INTERVAL_US
}

fn default_status_interval_ms() -> u64 {
    DEFAULT_STATUS_INTERVAL_MS
}

fn default_voltage_hysteresis_pct() -> f64 {
    DEFAULT_VOLTAGE_HYSTERESIS_PCT
}

fn default_fan_hysteresis_c() -> u8 {
    2
}

fn default_fan_ramp_ms() -> u64 {
    2_000
}

fn default_fixed_speed_pct() -> u32 {
    50
}

/// Per-core override of the load curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreCurveConfig {
    pub core_id: usize,
    #[serde(flatten)]
    pub curve: LoadCurve,
}

/// Fan pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanSettings {
    /// Run the fan pipeline at all. Off means the BIOS keeps the fan.
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub mode: FanMode,

    #[serde(default)]
    pub curve: FanCurve,

    /// Target speed for `fixed` mode, percent.
    #[serde(default = "default_fixed_speed_pct")]
    pub fixed_speed_pct: u32,

    /// Allow the fan to stop completely at low temperature.
    #[serde(default)]
    pub zero_rpm: bool,

    /// Temperature dead-band in degrees Celsius.
    #[serde(default = "default_fan_hysteresis_c")]
    pub hysteresis_c: u8,

    /// Full-sweep PWM ramp duration.
    #[serde(default = "default_fan_ramp_ms")]
    pub ramp_ms: u64,
}

impl Default for FanSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: FanMode::default(),
            curve: FanCurve::default(),
            fixed_speed_pct: default_fixed_speed_pct(),
            zero_rpm: false,
            hysteresis_c: default_fan_hysteresis_c(),
            ramp_ms: default_fan_ramp_ms(),
        }
    }
}

/// Complete daemon configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub strategy: Strategy,

    /// Tick cadence in microseconds.
    #[serde(default = "default_sample_interval_us")]
    pub sample_interval_us: u64,

    /// Status record cadence on stdout.
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,

    /// Voltage dead-band as percent of the usable offset range.
    #[serde(default = "default_voltage_hysteresis_pct")]
    pub hysteresis_pct: f64,

    /// Load curve used for cores without a per-core override.
    #[serde(default)]
    pub default_curve: LoadCurve,

    /// Per-core load-curve overrides.
    #[serde(default)]
    pub cores: Vec<CoreCurveConfig>,

    /// Frequency→voltage curve; when present it drives targets instead of
    /// the load curves.
    #[serde(default)]
    pub frequency_curve: Option<FrequencyCurve>,

    /// Path to the voltage utility; default resolves from PATH.
    #[serde(default)]
    pub ryzenadj_path: Option<PathBuf>,

    #[serde(default)]
    pub fan: FanSettings,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            sample_interval_us: default_sample_interval_us(),
            status_interval_ms: default_status_interval_ms(),
            hysteresis_pct: default_voltage_hysteresis_pct(),
            default_curve: LoadCurve::default(),
            cores: Vec::new(),
            frequency_curve: None,
            ryzenadj_path: None,
            fan: FanSettings::default(),
        }
    }
}

impl RunConfig {
    /// Parse a configuration from untrusted bytes. Any malformation comes
    /// back as a descriptive error, never a panic.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| VoltError::Config(format!("invalid configuration JSON: {e}")))
    }

    /// Load from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| VoltError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_bytes(&bytes)
    }

    /// Tick cadence as a [`std::time::Duration`].
    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_micros(self.sample_interval_us)
    }

    /// Tick cadence in milliseconds, for ramp-step math.
    pub fn tick_ms(&self) -> u64 {
        (self.sample_interval_us / 1_000).max(1)
    }

    /// Load curve in effect for one core.
    pub fn curve_for_core(&self, core: usize) -> &LoadCurve {
        self.cores
            .iter()
            .find(|c| c.core_id == core)
            .map(|c| &c.curve)
            .unwrap_or(&self.default_curve)
    }
}
