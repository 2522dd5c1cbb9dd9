// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Per-core CPU load from the kernel statistics pseudo-file.
//!
//! Load is the busy share of the counter delta between two samples, so the
//! first sample after startup yields no value. Reads fail soft: a transient
//! error re-serves the previous loads and bumps a consecutive-failure
//! counter the daemon uses to degrade to the safe fallback offset.

use std::path::{Path, PathBuf};

use crate::error::{Result, SensorError};

/// Consecutive failed samples before the daemon degrades to offset 0.
pub const FALLBACK_AFTER_FAILURES: u32 = 5;

const DEFAULT_STAT_PATH: &str = "/proc/stat";

/// Cumulative busy/idle counters for one core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CpuTimes {
    busy: u64,
    total: u64,
}

/// Parse one `cpuN ...` line into its core index and counters.
///
/// The aggregate `cpu` line and non-cpu lines return `None`. Busy time is
/// user+nice+system plus irq/softirq/steal where the kernel reports them;
/// idle time includes iowait.
fn parse_cpu_line(line: &str) -> Option<(usize, CpuTimes)> {
    let mut fields = line.split_whitespace();
    let label = fields.next()?;
    let index: usize = label.strip_prefix("cpu")?.parse().ok()?;

    let values: Vec<u64> = fields.map_while(|f| f.parse().ok()).collect();
    if values.len() < 4 {
        return None;
    }

    let mut busy = values[0] + values[1] + values[2];
    for extra in values.iter().skip(5).take(3) {
        busy += extra;
    }
    let mut idle = values[3];
    if let Some(iowait) = values.get(4) {
        idle += iowait;
    }

    Some((
        index,
        CpuTimes {
            busy,
            total: busy + idle,
        },
    ))
}

fn load_from_delta(prev: CpuTimes, next: CpuTimes) -> Option<f64> {
    let total_delta = next.total.checked_sub(prev.total)?;
    if total_delta == 0 {
        return None;
    }
    let busy_delta = next.busy.saturating_sub(prev.busy);
    Some((busy_delta as f64 / total_delta as f64 * 100.0).clamp(0.0, 100.0))
}

/// Stateful per-core load sampler.
#[derive(Debug)]
pub struct CpuLoadSampler {
    stat_path: PathBuf,
    core_count: usize,
    prev: Vec<Option<CpuTimes>>,
    last_loads: Vec<Option<f64>>,
    consecutive_failures: u32,
}

impl CpuLoadSampler {
    pub fn new(core_count: usize) -> Self {
        Self::with_stat_path(core_count, DEFAULT_STAT_PATH)
    }

    pub fn with_stat_path(core_count: usize, stat_path: impl AsRef<Path>) -> Self {
        Self {
            stat_path: stat_path.as_ref().to_path_buf(),
            core_count,
            prev: vec![None; core_count],
            last_loads: vec![None; core_count],
            consecutive_failures: 0,
        }
    }

    /// Startup preflight: the statistics source must exist and expose at
    /// least one parseable per-core line.
    pub fn probe(&self) -> Result<()> {
        let content = std::fs::read_to_string(&self.stat_path).map_err(|e| {
            SensorError::LoadSourceUnavailable {
                path: self.stat_path.display().to_string(),
                reason: e.to_string(),
            }
        })?;

        let mut saw_core_line = false;
        for line in content.lines() {
            if parse_cpu_line(line).is_some() {
                saw_core_line = true;
                break;
            }
            // A `cpu3`-labelled line that fails numeric parse means the
            // format is not what we understand; refuse startup loudly.
            if line
                .split_whitespace()
                .next()
                .and_then(|l| l.strip_prefix("cpu"))
                .is_some_and(|rest| rest.chars().all(|c| c.is_ascii_digit()) && !rest.is_empty())
            {
                return Err(SensorError::MalformedStat(line.to_string()).into());
            }
        }

        if !saw_core_line {
            return Err(SensorError::LoadSourceUnavailable {
                path: self.stat_path.display().to_string(),
                reason: "no per-core cpu lines".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Sample all cores. Never fails: errors re-serve previous loads.
    pub fn sample(&mut self) -> Vec<Option<f64>> {
        let content = match std::fs::read_to_string(&self.stat_path) {
            Ok(content) => {
                self.consecutive_failures = 0;
                content
            }
            Err(e) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                tracing::debug!(
                    path = %self.stat_path.display(),
                    failures = self.consecutive_failures,
                    error = %e,
                    "load sample failed, re-serving previous values"
                );
                return self.last_loads.clone();
            }
        };

        let mut next: Vec<Option<CpuTimes>> = vec![None; self.core_count];
        for line in content.lines() {
            if let Some((index, times)) = parse_cpu_line(line) {
                if index < self.core_count {
                    next[index] = Some(times);
                }
            }
        }

        for core in 0..self.core_count {
            match (self.prev[core], next[core]) {
                (Some(prev), Some(current)) => {
                    if let Some(load) = load_from_delta(prev, current) {
                        self.last_loads[core] = Some(load);
                    }
                    self.prev[core] = Some(current);
                }
                (None, Some(current)) => {
                    self.prev[core] = Some(current);
                }
                // Core line absent this sample (e.g. offlined): keep state.
                (_, None) => {}
            }
        }

        self.last_loads.clone()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Whether enough samples failed in a row to force the safe fallback.
    pub fn in_fallback(&self) -> bool {
        self.consecutive_failures >= FALLBACK_AFTER_FAILURES
    }

    pub fn core_count(&self) -> usize {
        self.core_count
    }
}
