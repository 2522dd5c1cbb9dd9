// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CLI parsing and the flag-over-config overlay.

pub mod args;

pub use args::*;

use std::io::Read;

use crate::config::RunConfig;
use crate::curves::{sort_points, FrequencyCurve, Strategy};
use crate::error::{Result, VoltError};
use crate::fan::FanCurve;

impl Cli {
    /// Overlay parsed flags onto a loaded configuration. Flags win over
    /// config-file fields; absent flags leave them untouched.
    pub fn apply_to(&self, config: &mut RunConfig) -> Result<()> {
        if let Some(us) = self.sample_interval_us {
            config.sample_interval_us = us;
        }
        if let Some(ms) = self.status_interval_ms {
            config.status_interval_ms = ms;
        }
        if let Some(pct) = self.hysteresis {
            config.hysteresis_pct = pct;
        }
        if let Some(path) = &self.ryzenadj_path {
            config.ryzenadj_path = Some(path.clone());
        }

        self.merge_strategy(config);

        for core in &self.cores {
            match config.cores.iter_mut().find(|c| c.core_id == core.core_id) {
                Some(existing) => existing.curve = core.curve,
                None => config.cores.push(core.clone()),
            }
        }

        if let Some(path) = &self.freq_curve {
            let bytes = std::fs::read(path).map_err(|e| {
                VoltError::Config(format!("cannot read frequency curve {}: {e}", path.display()))
            })?;
            let curve: FrequencyCurve = serde_json::from_slice(&bytes).map_err(|e| {
                VoltError::Config(format!("invalid frequency curve {}: {e}", path.display()))
            })?;
            config.frequency_curve = Some(curve);
        }

        if self.fan_control {
            config.fan.enabled = true;
        }
        if let Some(mode) = self.fan_mode {
            config.fan.mode = mode.into();
        }
        if !self.fan_curve.is_empty() {
            config.fan.curve = FanCurve::new(self.fan_curve.clone());
        }
        if let Some(pct) = self.fan_fixed_speed {
            config.fan.fixed_speed_pct = pct;
        }
        if self.fan_zero_rpm {
            config.fan.zero_rpm = true;
        }
        if let Some(c) = self.fan_hysteresis {
            config.fan.hysteresis_c = c;
        }

        Ok(())
    }

    fn merge_strategy(&self, config: &mut RunConfig) {
        match self.strategy {
            Some(StrategyArg::Conservative) => {
                config.strategy = Strategy::Conservative;
            }
            Some(StrategyArg::Balanced) => {
                config.strategy = Strategy::Balanced;
            }
            Some(StrategyArg::Aggressive) => {
                config.strategy = Strategy::Aggressive;
            }
            Some(StrategyArg::Custom) => self.merge_custom_strategy(config),
            None => {
                // Ramp or curve points without an explicit choice mean custom.
                if self.ramp_ms.is_some() || !self.curve_points.is_empty() {
                    self.merge_custom_strategy(config);
                }
            }
        }
        if !matches!(config.strategy, Strategy::Custom { .. }) && self.ramp_ms.is_some() {
            tracing::warn!("--ramp-ms has no effect with a preset strategy");
        }
    }

    fn merge_custom_strategy(&self, config: &mut RunConfig) {
        let (base_ramp, base_points) = match &config.strategy {
            Strategy::Custom { ramp_ms, points } => (*ramp_ms, points.clone()),
            _ => (2_000, Vec::new()),
        };
        let ramp_ms = self.ramp_ms.unwrap_or(base_ramp);
        let mut points = if self.curve_points.is_empty() {
            base_points
        } else {
            self.curve_points.clone()
        };
        sort_points(&mut points);
        config.strategy = Strategy::Custom { ramp_ms, points };
    }
}

/// Resolve the effective configuration: load (file, stdin, or defaults),
/// overlay flags, validate.
pub fn load_config(cli: &Cli) -> Result<RunConfig> {
    let mut config = match &cli.config {
        None => RunConfig::default(),
        Some(path) if path.as_os_str() == "-" => {
            let mut bytes = Vec::new();
            std::io::stdin()
                .read_to_end(&mut bytes)
                .map_err(|e| VoltError::Config(format!("cannot read config from stdin: {e}")))?;
            RunConfig::from_json_bytes(&bytes)?
        }
        Some(path) => RunConfig::from_file(path)?,
    };
    cli.apply_to(&mut config)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fan::FanMode;
    use clap::Parser;

    fn merged(args: &[&str]) -> RunConfig {
        let cli = Cli::parse_from(args);
        let mut config = RunConfig::default();
        cli.apply_to(&mut config).unwrap();
        config
    }

    #[test]
    fn test_no_flags_keep_defaults() {
        let config = merged(&["corevoltd"]);
        assert_eq!(config, RunConfig::default());
    }

    #[test]
    fn test_scalar_overrides() {
        let config = merged(&[
            "corevoltd",
            "--sample-interval-us",
            "250000",
            "--status-interval-ms",
            "500",
            "--hysteresis",
            "2.5",
        ]);
        assert_eq!(config.sample_interval_us, 250_000);
        assert_eq!(config.status_interval_ms, 500);
        assert!((config.hysteresis_pct - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_strategy_preset_override() {
        let config = merged(&["corevoltd", "--strategy", "conservative"]);
        assert_eq!(config.strategy, Strategy::Conservative);
    }

    #[test]
    fn test_custom_strategy_from_flags() {
        let config = merged(&[
            "corevoltd",
            "--strategy",
            "custom",
            "--ramp-ms",
            "750",
            "--curve-point",
            "80:-10",
            "--curve-point",
            "20:-35",
        ]);
        match config.strategy {
            Strategy::Custom { ramp_ms, points } => {
                assert_eq!(ramp_ms, 750);
                // Points come out sorted by load.
                assert!((points[0].load_pct - 20.0).abs() < f64::EPSILON);
                assert_eq!(points[1].offset_mv, -10);
            }
            other => panic!("expected custom strategy, got {other:?}"),
        }
    }

    #[test]
    fn test_ramp_without_strategy_implies_custom() {
        let config = merged(&["corevoltd", "--ramp-ms", "1200"]);
        assert_eq!(
            config.strategy,
            Strategy::Custom {
                ramp_ms: 1200,
                points: Vec::new(),
            }
        );
    }

    #[test]
    fn test_custom_keeps_config_points_when_flags_omit_them() {
        let cli = Cli::parse_from(["corevoltd", "--ramp-ms", "900"]);
        let mut config = RunConfig::default();
        config.strategy = Strategy::Custom {
            ramp_ms: 2_000,
            points: vec![crate::curves::CurvePoint {
                load_pct: 50.0,
                offset_mv: -20,
            }],
        };
        cli.apply_to(&mut config).unwrap();
        match config.strategy {
            Strategy::Custom { ramp_ms, points } => {
                assert_eq!(ramp_ms, 900);
                assert_eq!(points.len(), 1);
            }
            other => panic!("expected custom strategy, got {other:?}"),
        }
    }

    #[test]
    fn test_core_flags_replace_and_extend() {
        let cli = Cli::parse_from(["corevoltd", "--core", "0:-40:-20:45", "--core", "2:-20:-10:70"]);
        let mut config = RunConfig::default();
        config.cores.push(crate::config::CoreCurveConfig {
            core_id: 0,
            curve: crate::curves::LoadCurve::new(-30, -15, 50.0),
        });
        cli.apply_to(&mut config).unwrap();

        assert_eq!(config.cores.len(), 2);
        let core0 = config.cores.iter().find(|c| c.core_id == 0).unwrap();
        assert_eq!(core0.curve.minimal_value_mv, -40);
        assert!(config.cores.iter().any(|c| c.core_id == 2));
    }

    #[test]
    fn test_fan_flag_overlay() {
        let config = merged(&[
            "corevoltd",
            "--fan-control",
            "--fan-mode",
            "fixed",
            "--fan-fixed-speed",
            "65",
            "--fan-hysteresis",
            "4",
        ]);
        assert!(config.fan.enabled);
        assert_eq!(config.fan.mode, FanMode::Fixed);
        assert_eq!(config.fan.fixed_speed_pct, 65);
        assert_eq!(config.fan.hysteresis_c, 4);
    }

    #[test]
    fn test_fan_curve_points_replace_curve() {
        let config = merged(&[
            "corevoltd",
            "--fan-curve",
            "40:10",
            "--fan-curve",
            "60:50",
            "--fan-curve",
            "80:100",
        ]);
        assert_eq!(config.fan.curve.points().len(), 3);
        assert_eq!(config.fan.curve.speed_at(60.0), 50);
    }

    #[test]
    fn test_load_config_from_file_with_overrides() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"strategy": "conservative", "sample_interval_us": 100000}"#)
            .unwrap();

        let cli = Cli::parse_from([
            "corevoltd",
            "--config",
            path.to_str().unwrap(),
            "--strategy",
            "aggressive",
        ]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.strategy, Strategy::Aggressive);
        assert_eq!(config.sample_interval_us, 100_000);
    }

    #[test]
    fn test_load_config_rejects_invalid_merge_result() {
        let cli = Cli::parse_from(["corevoltd", "--sample-interval-us", "1"]);
        let err = load_config(&cli).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_load_config_missing_file() {
        let cli = Cli::parse_from(["corevoltd", "--config", "/nonexistent/config.json"]);
        assert!(load_config(&cli).is_err());
    }

    #[test]
    fn test_freq_curve_flag_loads_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("curve.json");
        std::fs::write(
            &path,
            r#"[{"frequency_mhz": 400, "voltage_mv": -35}, {"frequency_mhz": 1600, "voltage_mv": -25}]"#,
        )
        .unwrap();

        let config = merged(&["corevoltd", "--freq-curve", path.to_str().unwrap()]);
        let curve = config.frequency_curve.unwrap();
        assert_eq!(curve.len(), 2);
        assert_eq!(curve.voltage_at(1000).unwrap(), -30);
    }

    #[test]
    fn test_freq_curve_flag_invalid_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("curve.json");
        std::fs::write(&path, "not json").unwrap();
        let cli = Cli::parse_from(["corevoltd", "--freq-curve", path.to_str().unwrap()]);
        let mut config = RunConfig::default();
        let err = cli.apply_to(&mut config).unwrap_err();
        assert!(err.to_string().contains("invalid frequency curve"));
    }
}
