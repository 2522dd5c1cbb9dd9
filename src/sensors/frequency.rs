// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Per-core CPU frequency from cpufreq sysfs.
//!
//! `scaling_cur_freq` reports kHz; everything downstream works in MHz.
//! Reads are compared against the previous tick so the control loop can
//! skip recomputation for cores whose frequency did not move.

use std::path::{Path, PathBuf};

use super::load::FALLBACK_AFTER_FAILURES;
use crate::error::{Result, SensorError};

const DEFAULT_SYSFS_BASE: &str = "/sys/devices/system/cpu";

/// Outcome of one per-core frequency read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreqSample {
    /// Frequency moved since the previous tick.
    Changed(u32),
    /// Same value as the previous tick; targets need no recomputation.
    Unchanged(u32),
    /// Read failed; the previous value (if any) still stands.
    Unavailable,
}

impl FreqSample {
    pub fn mhz(&self) -> Option<u32> {
        match self {
            FreqSample::Changed(mhz) | FreqSample::Unchanged(mhz) => Some(*mhz),
            FreqSample::Unavailable => None,
        }
    }
}

/// Parse a raw `scaling_cur_freq` payload (kHz) into MHz.
fn parse_freq_mhz(raw: &str) -> Option<u32> {
    let khz: u64 = raw.trim().parse().ok()?;
    u32::try_from(khz / 1000).ok()
}

/// Stateful reader over `cpuN/cpufreq/scaling_cur_freq`.
#[derive(Debug)]
pub struct CpuFreqReader {
    sysfs_base: PathBuf,
    last: Vec<Option<u32>>,
    consecutive_failures: u32,
}

impl CpuFreqReader {
    pub fn new(core_count: usize) -> Self {
        Self::with_sysfs_base(core_count, DEFAULT_SYSFS_BASE)
    }

    pub fn with_sysfs_base(core_count: usize, base: impl AsRef<Path>) -> Self {
        Self {
            sysfs_base: base.as_ref().to_path_buf(),
            last: vec![None; core_count],
            consecutive_failures: 0,
        }
    }

    fn freq_path(&self, core: usize) -> PathBuf {
        self.sysfs_base
            .join(format!("cpu{core}/cpufreq/scaling_cur_freq"))
    }

    /// Read one core's current frequency in MHz.
    pub fn read_core(&self, core: usize) -> Result<u32> {
        let path = self.freq_path(core);
        let raw = std::fs::read_to_string(&path).map_err(|e| SensorError::FrequencyRead {
            core,
            reason: e.to_string(),
        })?;
        parse_freq_mhz(&raw).ok_or_else(|| {
            SensorError::FrequencyRead {
                core,
                reason: format!("unparseable value {:?}", raw.trim()),
            }
            .into()
        })
    }

    /// Startup preflight: core 0 must be readable when frequency input
    /// is required.
    pub fn probe(&self) -> Result<()> {
        self.read_core(0).map(|_| ())
    }

    /// Sample all cores, marking which ones moved since the last tick.
    pub fn sample(&mut self) -> Vec<FreqSample> {
        let mut any_ok = false;
        let samples: Vec<FreqSample> = (0..self.last.len())
            .map(|core| match self.read_core(core) {
                Ok(mhz) => {
                    any_ok = true;
                    if self.last[core] == Some(mhz) {
                        FreqSample::Unchanged(mhz)
                    } else {
                        self.last[core] = Some(mhz);
                        FreqSample::Changed(mhz)
                    }
                }
                Err(e) => {
                    tracing::trace!(core, error = %e, "frequency read failed");
                    FreqSample::Unavailable
                }
            })
            .collect();

        if any_ok {
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        }
        samples
    }

    /// Last known frequency for a core, surviving transient read failures.
    pub fn last_mhz(&self, core: usize) -> Option<u32> {
        self.last.get(core).copied().flatten()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn in_fallback(&self) -> bool {
        self.consecutive_failures >= FALLBACK_AFTER_FAILURES
    }
}
