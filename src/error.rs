// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error types for corevoltd
//!
//! The taxonomy mirrors the daemon's failure policy: configuration errors
//! refuse startup, sensor errors degrade the tick, actuation errors feed the
//! watchdog, and watchdog/panic paths are fatal after the safety reset.

use std::time::Duration;

use thiserror::Error;

/// Main error type for corevoltd operations
#[derive(Error, Debug)]
pub enum VoltError {
    /// Malformed or out-of-range startup configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Sensor read failures (load statistics, frequency files)
    #[error("sensor error: {0}")]
    Sensor(#[from] SensorError),

    /// Fan hardware-monitor failures
    #[error("hwmon error: {0}")]
    Hwmon(#[from] HwmonError),

    /// Voltage actuation failures
    #[error("actuation error: {0}")]
    Actuation(#[from] ActuationError),

    /// Heartbeat stalled beyond the liveness timeout
    #[error("watchdog heartbeat stalled for {0:?}")]
    WatchdogTimeout(Duration),

    /// Effective uid is not root; hardware access would fail
    #[error("must run as root to control voltage and fan hardware")]
    NotRoot,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Sensor-boundary error details
#[derive(Error, Debug)]
pub enum SensorError {
    /// The load statistics source cannot be opened at all
    #[error("load statistics unavailable at {path}: {reason}")]
    LoadSourceUnavailable { path: String, reason: String },

    /// A per-core statistics line did not parse
    #[error("malformed statistics line: {0:?}")]
    MalformedStat(String),

    /// A core's frequency file could not be read
    #[error("frequency read failed for core {core}: {reason}")]
    FrequencyRead { core: usize, reason: String },

    /// Fewer cores were reported than the daemon was configured for
    #[error("no sample for core {0}")]
    MissingCore(usize),
}

/// Hardware-monitor (fan) error details
#[derive(Error, Debug)]
pub enum HwmonError {
    /// No supported fan device present under the hwmon tree
    #[error("no supported fan device found under {0}")]
    DeviceNotFound(String),

    /// Access denied to a pwm/temp node
    #[error("permission denied for {0}")]
    PermissionDenied(String),

    /// A sensor node held something unparseable
    #[error("unreadable value {value:?} in {path}")]
    Parse { path: String, value: String },

    /// Other IO failure against the hwmon tree
    #[error("hwmon IO error: {0}")]
    Io(String),
}

/// Voltage-applier error details
#[derive(Error, Debug)]
pub enum ActuationError {
    /// The control utility binary does not exist
    #[error("voltage utility not found: {0}")]
    BinaryNotFound(String),

    /// The control utility did not return within the bound
    #[error("voltage utility timed out after {0:?}")]
    Timeout(Duration),

    /// The utility ran but its output indicates failure
    #[error("voltage utility rejected the request: {0}")]
    Rejected(String),

    /// Consecutive failures used up every recovery stage
    #[error("{failures} consecutive apply failures, recovery exhausted")]
    FaultLimitReached { failures: u32 },

    /// Spawning or collecting the utility process failed
    #[error("failed to invoke voltage utility: {0}")]
    Io(String),
}

/// Result type alias for corevoltd operations
pub type Result<T> = std::result::Result<T, VoltError>;

/// Process exit codes reported to the supervising layer.
///
/// The supervisor distinguishes configuration failures (do not retry) from
/// runtime faults (retry with backoff) from clean shutdown.
pub mod exit {
    /// Clean shutdown, including signal-initiated
    pub const CLEAN: i32 = 0;
    /// Invalid arguments or configuration
    pub const INVALID_CONFIG: i32 = 1;
    /// Load statistics source unavailable at startup
    pub const SENSOR_UNAVAILABLE: i32 = 2;
    /// Voltage-control utility not found
    pub const APPLIER_NOT_FOUND: i32 = 3;
    /// Actuation failed repeatedly, recovery exhausted
    pub const APPLY_FAULT: i32 = 4;
    /// Watchdog heartbeat timeout
    pub const WATCHDOG_TIMEOUT: i32 = 5;
    /// Not running as root
    pub const NOT_ROOT: i32 = 6;
}

impl VoltError {
    /// Map an error to the process exit code contract.
    pub fn exit_code(&self) -> i32 {
        match self {
            VoltError::Config(_) | VoltError::Json(_) => exit::INVALID_CONFIG,
            VoltError::Sensor(_) => exit::SENSOR_UNAVAILABLE,
            VoltError::Actuation(ActuationError::BinaryNotFound(_)) => exit::APPLIER_NOT_FOUND,
            VoltError::Actuation(_) => exit::APPLY_FAULT,
            VoltError::WatchdogTimeout(_) => exit::WATCHDOG_TIMEOUT,
            VoltError::NotRoot => exit::NOT_ROOT,
            VoltError::Hwmon(_) | VoltError::Io(_) => exit::INVALID_CONFIG,
        }
    }
}

impl From<std::io::Error> for HwmonError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => HwmonError::PermissionDenied(err.to_string()),
            _ => HwmonError::Io(err.to_string()),
        }
    }
}

impl From<std::io::Error> for ActuationError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => ActuationError::BinaryNotFound(err.to_string()),
            _ => ActuationError::Io(err.to_string()),
        }
    }
}
