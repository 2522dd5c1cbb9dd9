// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::collections::HashSet;
use std::io;
use std::time::Duration;

use corevoltd::error::{exit, ActuationError, HwmonError, SensorError, VoltError};
use corevoltd::status::{write_record_to, CoreStatus, StatusRecord};

#[test]
fn test_exit_code_contract() {
    let cases: Vec<(VoltError, i32)> = vec![
        (
            VoltError::Config("bad interval".to_string()),
            exit::INVALID_CONFIG,
        ),
        (
            VoltError::Sensor(SensorError::LoadSourceUnavailable {
                path: "/proc/stat".to_string(),
                reason: "missing".to_string(),
            }),
            exit::SENSOR_UNAVAILABLE,
        ),
        (
            VoltError::Actuation(ActuationError::BinaryNotFound("ryzenadj".to_string())),
            exit::APPLIER_NOT_FOUND,
        ),
        (
            VoltError::Actuation(ActuationError::FaultLimitReached { failures: 5 }),
            exit::APPLY_FAULT,
        ),
        (
            VoltError::WatchdogTimeout(Duration::from_secs(10)),
            exit::WATCHDOG_TIMEOUT,
        ),
        (VoltError::NotRoot, exit::NOT_ROOT),
    ];

    for (err, code) in cases {
        assert_eq!(err.exit_code(), code, "wrong code for {err}");
    }
}

#[test]
fn test_exit_codes_distinct() {
    let codes = [
        exit::CLEAN,
        exit::INVALID_CONFIG,
        exit::SENSOR_UNAVAILABLE,
        exit::APPLIER_NOT_FOUND,
        exit::APPLY_FAULT,
        exit::WATCHDOG_TIMEOUT,
        exit::NOT_ROOT,
    ];
    let unique: HashSet<i32> = codes.iter().copied().collect();
    assert_eq!(unique.len(), codes.len());
}

#[test]
fn test_missing_binary_distinguished_from_runtime_faults() {
    let missing = VoltError::Actuation(ActuationError::BinaryNotFound("no ryzenadj".to_string()));
    assert_eq!(missing.exit_code(), exit::APPLIER_NOT_FOUND);

    for runtime in [
        ActuationError::Timeout(Duration::from_secs(10)),
        ActuationError::Rejected("bad output".to_string()),
        ActuationError::Io("spawn failed".to_string()),
    ] {
        assert_eq!(VoltError::Actuation(runtime).exit_code(), exit::APPLY_FAULT);
    }
}

#[test]
fn test_io_not_found_becomes_missing_binary() {
    let io_err = io::Error::new(io::ErrorKind::NotFound, "ryzenadj: no such file");
    let err: ActuationError = io_err.into();
    match err {
        ActuationError::BinaryNotFound(msg) => assert!(msg.contains("no such file")),
        other => panic!("expected BinaryNotFound, got {other:?}"),
    }
}

#[test]
fn test_io_permission_denied_becomes_hwmon_permission() {
    let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "pwm1: denied");
    let err: HwmonError = io_err.into();
    match err {
        HwmonError::PermissionDenied(msg) => assert!(msg.contains("denied")),
        other => panic!("expected PermissionDenied, got {other:?}"),
    }

    let io_err = io::Error::new(io::ErrorKind::Interrupted, "retry");
    let err: HwmonError = io_err.into();
    assert!(matches!(err, HwmonError::Io(_)));
}

#[test]
fn test_detail_errors_wrap_into_volt_error() {
    let err: VoltError = SensorError::MissingCore(2).into();
    assert!(matches!(err, VoltError::Sensor(_)));
    assert_eq!(err.exit_code(), exit::SENSOR_UNAVAILABLE);

    let err: VoltError = HwmonError::DeviceNotFound("/sys/class/hwmon".to_string()).into();
    assert!(matches!(err, VoltError::Hwmon(_)));
}

#[test]
fn test_error_record_ndjson_shape() {
    let record = StatusRecord::Error {
        code: exit::APPLY_FAULT,
        message: "voltage utility rejected the request".to_string(),
    };

    let mut buf = Vec::new();
    write_record_to(&mut buf, &record).unwrap();

    let line = String::from_utf8(buf).unwrap();
    assert!(line.ends_with('\n'));
    assert_eq!(line.matches('\n').count(), 1);

    let value: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
    assert_eq!(value["type"], "error");
    assert_eq!(value["code"], 4);
    assert!(value["message"]
        .as_str()
        .unwrap()
        .contains("rejected the request"));
}

#[test]
fn test_status_record_type_tags() {
    let status = StatusRecord::Status {
        uptime_ms: 1_500,
        strategy: "balanced".to_string(),
        cores: vec![CoreStatus {
            core: 0,
            load_pct: Some(42.5),
            frequency_mhz: None,
            voltage_mv: -20,
        }],
        fan: None,
        sensor_fallback: false,
    };
    let value = serde_json::to_value(&status).unwrap();
    assert_eq!(value["type"], "status");
    assert_eq!(value["cores"][0]["voltage_mv"], -20);
    assert_eq!(value["cores"][0]["frequency_mhz"], serde_json::Value::Null);

    let transition = StatusRecord::Transition {
        core: 1,
        from_mv: -10,
        to_mv: -25,
        progress: 0.5,
    };
    let value = serde_json::to_value(&transition).unwrap();
    assert_eq!(value["type"], "transition");
    assert_eq!(value["from_mv"], -10);
    assert_eq!(value["to_mv"], -25);
}

#[test]
fn test_record_lines_parse_back() {
    let records = vec![
        StatusRecord::Error {
            code: exit::SENSOR_UNAVAILABLE,
            message: "sensor input lost".to_string(),
        },
        StatusRecord::Transition {
            core: 0,
            from_mv: 0,
            to_mv: -30,
            progress: 0.25,
        },
    ];

    let mut buf = Vec::new();
    for record in &records {
        write_record_to(&mut buf, record).unwrap();
    }

    let text = String::from_utf8(buf).unwrap();
    let parsed: Vec<StatusRecord> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(parsed, records);
}
