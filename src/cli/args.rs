// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CLI argument definitions using Clap
//!
//! Every flag overrides the matching configuration field after the config
//! file (or stdin document) is loaded.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::CoreCurveConfig;
use crate::curves::{CurvePoint, LoadCurve};
use crate::fan::{FanMode, FanPoint};

/// corevoltd - adaptive CPU undervolt and fan control daemon
#[derive(Parser, Debug)]
#[command(name = "corevoltd")]
#[command(version, about = "Adaptive CPU undervolt and fan control daemon")]
pub struct Cli {
    /// Config file path, or '-' to read JSON from stdin
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Adaptation strategy
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,

    /// Tick cadence in microseconds
    #[arg(long)]
    pub sample_interval_us: Option<u64>,

    /// Voltage dead-band as percent of the usable offset range
    #[arg(long)]
    pub hysteresis: Option<f64>,

    /// Custom ramp duration in milliseconds (implies the custom strategy)
    #[arg(long)]
    pub ramp_ms: Option<u64>,

    /// Per-core curve as ID:MIN:MAX:THRESHOLD (repeatable), e.g. 0:-30:-15:50
    #[arg(long = "core", value_parser = parse_core_spec)]
    pub cores: Vec<CoreCurveConfig>,

    /// Custom strategy curve point as LOAD:MV (repeatable), e.g. 40:-25
    #[arg(long = "curve-point", value_parser = parse_curve_point)]
    pub curve_points: Vec<CurvePoint>,

    /// Path to a frequency→voltage curve JSON file
    #[arg(long)]
    pub freq_curve: Option<PathBuf>,

    /// Path to the ryzenadj binary (defaults to PATH lookup)
    #[arg(long)]
    pub ryzenadj_path: Option<PathBuf>,

    /// Status record cadence on stdout in milliseconds
    #[arg(long)]
    pub status_interval_ms: Option<u64>,

    /// Enable the fan control pipeline
    #[arg(long)]
    pub fan_control: bool,

    /// Fan operating mode
    #[arg(long, value_enum)]
    pub fan_mode: Option<FanModeArg>,

    /// Fan curve point as TEMP:SPEED (repeatable), e.g. 60:45
    #[arg(long = "fan-curve", value_parser = parse_fan_point)]
    pub fan_curve: Vec<FanPoint>,

    /// Constant fan speed percent for fixed mode
    #[arg(long)]
    pub fan_fixed_speed: Option<u32>,

    /// Allow the fan to stop completely at low temperature
    #[arg(long)]
    pub fan_zero_rpm: bool,

    /// Fan temperature dead-band in degrees Celsius
    #[arg(long)]
    pub fan_hysteresis: Option<u8>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Strategy selection on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    Conservative,
    Balanced,
    Aggressive,
    Custom,
}

/// Fan mode selection on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FanModeArg {
    Default,
    Custom,
    Fixed,
}

impl From<FanModeArg> for FanMode {
    fn from(arg: FanModeArg) -> Self {
        match arg {
            FanModeArg::Default => FanMode::Default,
            FanModeArg::Custom => FanMode::Custom,
            FanModeArg::Fixed => FanMode::Fixed,
        }
    }
}

/// Parse `ID:MIN:MAX:THRESHOLD` into a per-core curve override.
pub fn parse_core_spec(raw: &str) -> Result<CoreCurveConfig, String> {
    let parts: Vec<&str> = raw.split(':').collect();
    if parts.len() != 4 {
        return Err(format!(
            "expected ID:MIN:MAX:THRESHOLD, got {raw:?} ({} fields)",
            parts.len()
        ));
    }
    let core_id = parts[0]
        .parse::<usize>()
        .map_err(|_| format!("invalid core id {:?}", parts[0]))?;
    let minimal_value_mv = parts[1]
        .parse::<i32>()
        .map_err(|_| format!("invalid minimal offset {:?}", parts[1]))?;
    let maximum_value_mv = parts[2]
        .parse::<i32>()
        .map_err(|_| format!("invalid maximum offset {:?}", parts[2]))?;
    let threshold_pct = parts[3]
        .parse::<f64>()
        .map_err(|_| format!("invalid threshold {:?}", parts[3]))?;

    Ok(CoreCurveConfig {
        core_id,
        curve: LoadCurve::new(minimal_value_mv, maximum_value_mv, threshold_pct),
    })
}

/// Parse `LOAD:MV` into a custom strategy curve point.
pub fn parse_curve_point(raw: &str) -> Result<CurvePoint, String> {
    let (load, mv) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected LOAD:MV, got {raw:?}"))?;
    let load_pct = load
        .parse::<f64>()
        .map_err(|_| format!("invalid load percent {load:?}"))?;
    let offset_mv = mv
        .parse::<i32>()
        .map_err(|_| format!("invalid offset {mv:?}"))?;
    Ok(CurvePoint { load_pct, offset_mv })
}

/// Parse `TEMP:SPEED` into a fan curve point.
pub fn parse_fan_point(raw: &str) -> Result<FanPoint, String> {
    let (temp, speed) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected TEMP:SPEED, got {raw:?}"))?;
    let temp_c = temp
        .parse::<u32>()
        .map_err(|_| format!("invalid temperature {temp:?}"))?;
    let speed_pct = speed
        .parse::<u32>()
        .map_err(|_| format!("invalid speed percent {speed:?}"))?;
    Ok(FanPoint { temp_c, speed_pct })
}
