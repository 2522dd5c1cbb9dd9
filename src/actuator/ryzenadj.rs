// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! ryzenadj subprocess backend.
//!
//! Offsets are applied one core per invocation through the
//! `--set-coper` flag, which packs the core index and a 20-bit
//! two's-complement millivolt value into a single hex argument.
//! ryzenadj sometimes reports failure on stderr while still exiting 0,
//! so stderr is scanned in addition to the exit status.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;

use super::{CoreOffset, VoltageApplier};
use crate::curves::{SAFE_VOLTAGE_CEILING_MV, SAFE_VOLTAGE_FLOOR_MV};
use crate::error::{ActuationError, Result};

/// Hard ceiling on a single ryzenadj invocation.
pub const APPLY_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_BINARY: &str = "ryzenadj";

/// Pack a core index and millivolt offset into the `--set-coper` value.
///
/// Layout: `core * 0x100000 + (offset_mv & 0xFFFFF)`, rendered as
/// uppercase hex. Core 0 at -30 mV encodes as `0XFFFE2`.
fn encode_coper_value(core: usize, offset_mv: i32) -> String {
    let masked = (offset_mv as u32) & 0xF_FFFF;
    let value = (core as u64) * 0x10_0000 + u64::from(masked);
    format!("0X{value:X}")
}

/// ryzenadj reports some rejections on stderr with a zero exit status.
fn stderr_indicates_failure(stderr: &str) -> bool {
    let lowered = stderr.to_lowercase();
    lowered.contains("error") || lowered.contains("fail")
}

fn check_offset_safe(offset: CoreOffset) -> std::result::Result<(), ActuationError> {
    if !(SAFE_VOLTAGE_FLOOR_MV..=SAFE_VOLTAGE_CEILING_MV).contains(&offset.offset_mv) {
        return Err(ActuationError::Rejected(format!(
            "refusing unsafe offset {} mV for core {}",
            offset.offset_mv, offset.core
        )));
    }
    Ok(())
}

/// Applier that shells out to the ryzenadj binary.
#[derive(Debug, Clone)]
pub struct RyzenadjApplier {
    binary: PathBuf,
    apply_timeout: Duration,
}

impl Default for RyzenadjApplier {
    fn default() -> Self {
        Self::new()
    }
}

impl RyzenadjApplier {
    pub fn new() -> Self {
        Self::with_binary(DEFAULT_BINARY)
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            apply_timeout: APPLY_TIMEOUT,
        }
    }

    #[cfg(test)]
    fn with_timeout(mut self, apply_timeout: Duration) -> Self {
        self.apply_timeout = apply_timeout;
        self
    }

    async fn run_set_coper(&self, offset: CoreOffset) -> std::result::Result<(), ActuationError> {
        check_offset_safe(offset)?;
        let arg = format!("--set-coper={}", encode_coper_value(offset.core, offset.offset_mv));

        let output = timeout(
            self.apply_timeout,
            Command::new(&self.binary)
                .arg(&arg)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| ActuationError::Timeout(self.apply_timeout))?
        .map_err(ActuationError::from)?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(ActuationError::Rejected(format!(
                "exit code {} for core {}: {}",
                output.status.code().unwrap_or(-1),
                offset.core,
                stderr.trim()
            )));
        }
        if stderr_indicates_failure(&stderr) {
            return Err(ActuationError::Rejected(format!(
                "core {}: {}",
                offset.core,
                stderr.trim()
            )));
        }

        tracing::trace!(core = offset.core, offset_mv = offset.offset_mv, "coper applied");
        Ok(())
    }
}

#[async_trait]
impl VoltageApplier for RyzenadjApplier {
    fn name(&self) -> &str {
        "ryzenadj"
    }

    async fn probe(&self) -> Result<()> {
        // Any exit status proves the binary is present and runnable.
        timeout(
            self.apply_timeout,
            Command::new(&self.binary)
                .arg("--help")
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .status(),
        )
        .await
        .map_err(|_| ActuationError::Timeout(self.apply_timeout))?
        .map_err(ActuationError::from)?;
        Ok(())
    }

    async fn apply(&self, offsets: &[CoreOffset]) -> Result<()> {
        for offset in offsets {
            self.run_set_coper(*offset).await?;
        }
        Ok(())
    }

    fn zero_all_sync(&self, core_count: usize) -> Result<()> {
        let mut first_error: Option<ActuationError> = None;
        for core in 0..core_count {
            let arg = format!("--set-coper={}", encode_coper_value(core, 0));
            let result = std::process::Command::new(&self.binary)
                .arg(&arg)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status();
            match result {
                Ok(status) if status.success() => {}
                Ok(status) => {
                    if first_error.is_none() {
                        first_error = Some(ActuationError::Rejected(format!(
                            "zeroing core {core} exited with {status}"
                        )));
                    }
                }
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(ActuationError::from(e));
                    }
                }
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn fake_binary(dir: &TempDir, script: &str) -> PathBuf {
        let path = dir.path().join("ryzenadj");
        fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[test]
    fn test_encode_negative_offset_core_zero() {
        assert_eq!(encode_coper_value(0, -30), "0XFFFE2");
    }

    #[test]
    fn test_encode_core_index_in_high_bits() {
        assert_eq!(encode_coper_value(1, -30), "0X1FFFE2");
        assert_eq!(encode_coper_value(2, -100), "0X2FFF9C");
        assert_eq!(encode_coper_value(7, -1), "0X7FFFFF");
    }

    #[test]
    fn test_encode_zero_offset() {
        assert_eq!(encode_coper_value(0, 0), "0X0");
        assert_eq!(encode_coper_value(3, 0), "0X300000");
    }

    #[test]
    fn test_stderr_failure_detection() {
        assert!(stderr_indicates_failure("Error: unsupported SMU"));
        assert!(stderr_indicates_failure("apply FAILED for table"));
        assert!(!stderr_indicates_failure("applied coper successfully"));
        assert!(!stderr_indicates_failure(""));
    }

    #[test]
    fn test_offset_safety_gate() {
        assert!(check_offset_safe(CoreOffset::new(0, -100)).is_ok());
        assert!(check_offset_safe(CoreOffset::new(0, 0)).is_ok());
        assert!(check_offset_safe(CoreOffset::new(0, -101)).is_err());
        assert!(check_offset_safe(CoreOffset::new(0, 5)).is_err());
    }

    #[tokio::test]
    async fn test_apply_success() {
        let dir = TempDir::new().unwrap();
        let bin = fake_binary(&dir, "exit 0");
        let applier = RyzenadjApplier::with_binary(bin);
        let offsets = [CoreOffset::new(0, -20), CoreOffset::new(1, -20)];
        assert!(applier.apply(&offsets).await.is_ok());
    }

    #[tokio::test]
    async fn test_apply_nonzero_exit_is_rejected() {
        let dir = TempDir::new().unwrap();
        let bin = fake_binary(&dir, "echo 'no access' >&2; exit 1");
        let applier = RyzenadjApplier::with_binary(bin);
        let err = applier.apply(&[CoreOffset::new(0, -10)]).await.unwrap_err();
        assert!(err.to_string().contains("rejected"));
    }

    #[tokio::test]
    async fn test_apply_stderr_error_with_clean_exit_is_rejected() {
        let dir = TempDir::new().unwrap();
        let bin = fake_binary(&dir, "echo 'Error: smu rejected request' >&2; exit 0");
        let applier = RyzenadjApplier::with_binary(bin);
        let err = applier.apply(&[CoreOffset::new(0, -10)]).await.unwrap_err();
        assert!(err.to_string().contains("smu rejected"));
    }

    #[tokio::test]
    async fn test_apply_missing_binary() {
        let applier = RyzenadjApplier::with_binary("/nonexistent/ryzenadj");
        let err = applier.apply(&[CoreOffset::new(0, -10)]).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_apply_timeout() {
        let dir = TempDir::new().unwrap();
        let bin = fake_binary(&dir, "sleep 30");
        let applier =
            RyzenadjApplier::with_binary(bin).with_timeout(Duration::from_millis(100));
        let err = applier.apply(&[CoreOffset::new(0, -10)]).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_probe_missing_binary() {
        let applier = RyzenadjApplier::with_binary("/nonexistent/ryzenadj");
        assert!(applier.probe().await.is_err());
    }

    #[test]
    fn test_zero_all_sync_invokes_every_core() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("calls.log");
        let bin = fake_binary(
            &dir,
            &format!("echo \"$1\" >> {}", log.display()),
        );
        let applier = RyzenadjApplier::with_binary(bin);
        applier.zero_all_sync(3).unwrap();

        let calls = fs::read_to_string(&log).unwrap();
        let lines: Vec<&str> = calls.lines().collect();
        assert_eq!(
            lines,
            vec![
                "--set-coper=0X0",
                "--set-coper=0X100000",
                "--set-coper=0X200000"
            ]
        );
    }

    #[test]
    fn test_zero_all_sync_continues_past_failures() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("calls.log");
        // Fail on core 1 but record every invocation.
        let bin = fake_binary(
            &dir,
            &format!(
                "echo \"$1\" >> {}\ncase \"$1\" in *0X100000) exit 1;; esac",
                log.display()
            ),
        );
        let applier = RyzenadjApplier::with_binary(bin);
        let result = applier.zero_all_sync(3);
        assert!(result.is_err());

        let calls = fs::read_to_string(&log).unwrap();
        assert_eq!(calls.lines().count(), 3);
    }
}
