// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! hwmon sysfs access for the fan device.
//!
//! The device is located by matching `hwmon*/name` against the known
//! handheld fan controllers. `pwm1_enable` selects manual (1) or
//! automatic/BIOS (2) control; `temp1_input` reports millidegrees.

use std::path::{Path, PathBuf};

use crate::error::{HwmonError, Result};

/// hwmon `name` values of supported fan controllers.
pub const SUPPORTED_DEVICE_NAMES: &[&str] = &["jupiter", "galileo"];

const DEFAULT_HWMON_BASE: &str = "/sys/class/hwmon";

const PWM_MODE_MANUAL: &str = "1";
const PWM_MODE_AUTOMATIC: &str = "2";

fn parse_sysfs_u64(raw: &str) -> Option<u64> {
    raw.trim().parse().ok()
}

/// Convert a `temp*_input` payload (millidegrees) to degrees Celsius.
fn millidegrees_to_celsius(raw: u64) -> f64 {
    raw as f64 / 1000.0
}

/// One discovered hwmon fan device.
#[derive(Debug, Clone)]
pub struct FanDevice {
    base: PathBuf,
    name: String,
}

impl FanDevice {
    /// Scan the default hwmon tree for a supported device.
    pub fn discover() -> Result<Self> {
        Self::discover_in(DEFAULT_HWMON_BASE)
    }

    /// Scan a hwmon tree root for a supported device.
    pub fn discover_in(base: impl AsRef<Path>) -> Result<Self> {
        let base = base.as_ref();
        let entries = std::fs::read_dir(base)
            .map_err(|_| HwmonError::DeviceNotFound(base.display().to_string()))?;

        for entry in entries.flatten() {
            let dir = entry.path();
            let name_file = dir.join("name");
            let Ok(raw) = std::fs::read_to_string(&name_file) else {
                continue;
            };
            let name = raw.trim();
            if SUPPORTED_DEVICE_NAMES.contains(&name) {
                tracing::debug!(device = name, path = %dir.display(), "fan device found");
                return Ok(Self {
                    base: dir,
                    name: name.to_string(),
                });
            }
        }
        Err(HwmonError::DeviceNotFound(base.display().to_string()).into())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.base
    }

    fn read_node(&self, node: &str) -> std::result::Result<u64, HwmonError> {
        let path = self.base.join(node);
        let raw = std::fs::read_to_string(&path).map_err(HwmonError::from)?;
        parse_sysfs_u64(&raw).ok_or_else(|| HwmonError::Parse {
            path: path.display().to_string(),
            value: raw.trim().to_string(),
        })
    }

    fn write_node(&self, node: &str, value: &str) -> std::result::Result<(), HwmonError> {
        std::fs::write(self.base.join(node), value).map_err(HwmonError::from)
    }

    pub fn read_temp_c(&self) -> Result<f64> {
        Ok(millidegrees_to_celsius(self.read_node("temp1_input")?))
    }

    pub fn read_rpm(&self) -> Result<u32> {
        Ok(self.read_node("fan1_input")? as u32)
    }

    pub fn read_pwm(&self) -> Result<u8> {
        let raw = self.read_node("pwm1")?;
        Ok(raw.min(255) as u8)
    }

    pub fn write_pwm(&self, pwm: u8) -> Result<()> {
        self.write_node("pwm1", &pwm.to_string())?;
        Ok(())
    }

    /// Take manual control of the fan.
    pub fn set_manual(&self) -> Result<()> {
        self.write_node("pwm1_enable", PWM_MODE_MANUAL)?;
        Ok(())
    }

    /// Hand the fan back to automatic/BIOS control.
    pub fn set_automatic(&self) -> Result<()> {
        self.write_node("pwm1_enable", PWM_MODE_AUTOMATIC)?;
        Ok(())
    }
}
