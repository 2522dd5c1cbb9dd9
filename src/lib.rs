// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! corevoltd - adaptive CPU undervolt and fan control for handheld devices.
//!
//! This crate exposes the daemon runtime used by the `corevoltd` binary
//! (`src/main.rs`).
//!
//! Architecture highlights:
//! - `sensors`: per-core load and frequency inputs, fail-soft
//! - `curves`: load and frequency curves plus the strategy presets
//! - `control`: hysteresis gating and bounded-step voltage ramping
//! - `actuator`: the ryzenadj subprocess boundary
//! - `fan`: hwmon discovery and the temperature→PWM pipeline
//! - `safety`: fault accounting, progressive recovery, LKG persistence,
//!   heartbeat watchdog, and the terminal safe-state routine
//! - `daemon`: the tick loop wiring all of the above together
//! - `status`: the NDJSON status stream on stdout

pub mod actuator;
pub mod cli;
pub mod config;
pub mod control;
pub mod curves;
pub mod daemon;
pub mod error;
pub mod fan;
pub mod safety;
pub mod sensors;
pub mod status;

pub use error::{Result, VoltError};
