// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! NDJSON status stream.
//!
//! One self-contained record per line on stdout. stdout belongs to this
//! stream alone; all logging goes to stderr. The consumer treats loss of
//! the stream as "daemon down", so records are flushed as they are
//! written.

use std::io::Write;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::fan::FanStatus;

/// Per-core slice of a status record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreStatus {
    pub core: usize,
    /// Absent until the second load sample exists.
    pub load_pct: Option<f64>,
    /// Absent while the frequency source is unavailable.
    pub frequency_mhz: Option<u32>,
    pub voltage_mv: i32,
}

/// One line of the status stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StatusRecord {
    /// Periodic snapshot of the whole daemon.
    Status {
        uptime_ms: u64,
        strategy: String,
        cores: Vec<CoreStatus>,
        fan: Option<FanStatus>,
        /// True while sensor input is lost and targets degrade to 0.
        sensor_fallback: bool,
    },
    /// A voltage ramp step in flight on one core.
    Transition {
        core: usize,
        from_mv: i32,
        to_mv: i32,
        progress: f64,
    },
    /// A surfaced fault.
    Error { code: i32, message: String },
}

/// Serialize one record as a single NDJSON line.
pub fn write_record_to<W: Write>(mut writer: W, record: &StatusRecord) -> Result<()> {
    serde_json::to_writer(&mut writer, record)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Interval-gated stdout emitter.
#[derive(Debug)]
pub struct StatusEmitter {
    interval: Duration,
    started: Instant,
    last_emit: Option<Instant>,
}

impl StatusEmitter {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms),
            started: Instant::now(),
            last_emit: None,
        }
    }

    pub fn uptime_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Whether a periodic record is due. `force` bypasses the gate (the
    /// SIGUSR1 path). A true result arms the next interval.
    pub fn should_emit(&mut self, force: bool) -> bool {
        let due = force
            || self
                .last_emit
                .is_none_or(|last| last.elapsed() >= self.interval);
        if due {
            self.last_emit = Some(Instant::now());
        }
        due
    }

    /// Write one record to stdout under the lock.
    pub fn emit(&self, record: &StatusRecord) -> Result<()> {
        write_record_to(std::io::stdout().lock(), record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fan::FanMode;

    fn record_line(record: &StatusRecord) -> String {
        let mut buf = Vec::new();
        write_record_to(&mut buf, record).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_status_record_shape() {
        let record = StatusRecord::Status {
            uptime_ms: 1500,
            strategy: "balanced".to_string(),
            cores: vec![CoreStatus {
                core: 0,
                load_pct: Some(42.5),
                frequency_mhz: Some(2800),
                voltage_mv: -25,
            }],
            fan: None,
            sensor_fallback: false,
        };
        let line = record_line(&record);
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        assert_eq!(
            line.trim_end(),
            r#"{"type":"status","uptime_ms":1500,"strategy":"balanced","cores":[{"core":0,"load_pct":42.5,"frequency_mhz":2800,"voltage_mv":-25}],"fan":null,"sensor_fallback":false}"#
        );
    }

    #[test]
    fn test_status_record_with_fan() {
        let record = StatusRecord::Status {
            uptime_ms: 2000,
            strategy: "aggressive".to_string(),
            cores: vec![],
            fan: Some(FanStatus {
                temp_c: 61.5,
                pwm: 115,
                rpm: Some(2400),
                mode: FanMode::Custom,
                error: None,
            }),
            sensor_fallback: false,
        };
        let line = record_line(&record);
        assert!(line.contains(r#""fan":{"temp_c":61.5,"pwm":115,"rpm":2400,"mode":"custom"}"#));
    }

    #[test]
    fn test_unsampled_core_serializes_nulls() {
        let record = StatusRecord::Status {
            uptime_ms: 0,
            strategy: "balanced".to_string(),
            cores: vec![CoreStatus {
                core: 1,
                load_pct: None,
                frequency_mhz: None,
                voltage_mv: 0,
            }],
            fan: None,
            sensor_fallback: true,
        };
        let line = record_line(&record);
        assert!(line.contains(r#""load_pct":null"#));
        assert!(line.contains(r#""frequency_mhz":null"#));
        assert!(line.contains(r#""sensor_fallback":true"#));
    }

    #[test]
    fn test_transition_record_shape() {
        let record = StatusRecord::Transition {
            core: 2,
            from_mv: -15,
            to_mv: -30,
            progress: 0.5,
        };
        assert_eq!(
            record_line(&record).trim_end(),
            r#"{"type":"transition","core":2,"from_mv":-15,"to_mv":-30,"progress":0.5}"#
        );
    }

    #[test]
    fn test_error_record_shape() {
        let record = StatusRecord::Error {
            code: 4,
            message: "actuation failed".to_string(),
        };
        assert_eq!(
            record_line(&record).trim_end(),
            r#"{"type":"error","code":4,"message":"actuation failed"}"#
        );
    }

    #[test]
    fn test_records_parse_back() {
        let line = r#"{"type":"transition","core":0,"from_mv":0,"to_mv":-20,"progress":0.25}"#;
        let parsed: StatusRecord = serde_json::from_str(line).unwrap();
        assert_eq!(
            parsed,
            StatusRecord::Transition {
                core: 0,
                from_mv: 0,
                to_mv: -20,
                progress: 0.25,
            }
        );
    }

    #[test]
    fn test_interval_gate() {
        let mut emitter = StatusEmitter::new(10_000);
        assert!(emitter.should_emit(false));
        // Immediately after emitting, the gate is closed.
        assert!(!emitter.should_emit(false));
        assert!(!emitter.should_emit(false));
    }

    #[test]
    fn test_force_bypasses_gate() {
        let mut emitter = StatusEmitter::new(10_000);
        assert!(emitter.should_emit(false));
        assert!(emitter.should_emit(true));
        assert!(emitter.should_emit(true));
        assert!(!emitter.should_emit(false));
    }

    #[test]
    fn test_gate_reopens_after_interval() {
        let mut emitter = StatusEmitter::new(20);
        assert!(emitter.should_emit(false));
        assert!(!emitter.should_emit(false));
        std::thread::sleep(Duration::from_millis(30));
        assert!(emitter.should_emit(false));
    }

    #[test]
    fn test_uptime_advances() {
        let emitter = StatusEmitter::new(1000);
        let first = emitter.uptime_ms();
        std::thread::sleep(Duration::from_millis(15));
        assert!(emitter.uptime_ms() > first);
    }
}
