// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! corevoltd - adaptive CPU undervolt and fan control daemon
//!
//! Startup order matters: logging first (stderr only; stdout belongs to the
//! status stream), then the privilege and hardware probes that refuse startup
//! with a distinct exit code, then the safe-state hooks, and only then the
//! control loop. Whatever path the process leaves by, the hardware is
//! returned to stock offsets and BIOS fan control first.

use std::sync::Arc;

use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;

use corevoltd::actuator::{RyzenadjApplier, VoltageApplier};
use corevoltd::cli::{self, Cli};
use corevoltd::config::RunConfig;
use corevoltd::daemon::Daemon;
use corevoltd::error::{exit, Result, VoltError};
use corevoltd::fan::{FanController, FanDevice, FanHandle};
use corevoltd::safety::{LkgStore, LkgTracker, SafeState};
use corevoltd::sensors::{detect_core_count, CpuFreqReader, CpuLoadSampler};
use corevoltd::status::{write_record_to, StatusRecord};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let code = match run(cli).await {
        Ok(()) => exit::CLEAN,
        Err(err) => {
            tracing::error!(error = %err, "daemon terminated");
            let record = StatusRecord::Error {
                code: err.exit_code(),
                message: err.to_string(),
            };
            if let Err(e) = write_record_to(std::io::stdout().lock(), &record) {
                tracing::debug!(error = %e, "final error record emit failed");
            }
            err.exit_code()
        }
    };
    std::process::exit(code);
}

fn init_tracing(verbose: u8) {
    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::WARN.into());

    // Practical debug toggle without requiring target names up front.
    // `RUST_LOG` still takes precedence.
    if verbose > 0 {
        let level = if verbose > 1 { "trace" } else { "debug" };
        if let Ok(parsed) = format!("corevoltd={level}").parse() {
            env_filter = env_filter.add_directive(parsed);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Effective-uid root check via the procfs self entry, which the kernel
/// owns as the process euid.
fn running_as_root() -> bool {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata("/proc/self")
        .map(|meta| meta.uid() == 0)
        .unwrap_or(false)
}

fn build_applier(config: &RunConfig) -> Arc<dyn VoltageApplier> {
    match &config.ryzenadj_path {
        Some(path) => Arc::new(RyzenadjApplier::with_binary(path)),
        None => Arc::new(RyzenadjApplier::new()),
    }
}

/// Bring up the fan pipeline, or degrade to voltage-only operation.
///
/// A missing or unwritable fan device is not fatal: the BIOS keeps
/// controlling the fan and status records carry a null fan field.
fn build_fan(config: &RunConfig) -> Option<FanController> {
    if !config.fan.enabled {
        return None;
    }
    let device = match FanDevice::discover() {
        Ok(device) => device,
        Err(e) => {
            tracing::warn!(error = %e, "fan control unavailable, continuing without it");
            return None;
        }
    };
    let mut controller = FanController::new(FanHandle::new(device), &config.fan, config.tick_ms());
    if let Err(e) = controller.start() {
        tracing::warn!(error = %e, "fan control unavailable, continuing without it");
        return None;
    }
    Some(controller)
}

/// Forward process signals into the daemon's channels.
///
/// SIGTERM and SIGINT request shutdown; SIGUSR1 requests an immediate
/// status record.
fn spawn_signal_forwarders(
    shutdown: mpsc::UnboundedSender<()>,
    force_status: mpsc::UnboundedSender<()>,
) -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigusr1 = signal(SignalKind::user_defined1())?;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("SIGTERM received"),
                _ = sigint.recv() => tracing::info!("SIGINT received"),
            }
            if shutdown.send(()).is_err() {
                break;
            }
        }
    });
    tokio::spawn(async move {
        while sigusr1.recv().await.is_some() {
            if force_status.send(()).is_err() {
                break;
            }
        }
    });
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    if !running_as_root() {
        return Err(VoltError::NotRoot);
    }

    let config = cli::load_config(&cli)?;

    let core_count = detect_core_count();
    tracing::info!(core_count, "detected logical cores");

    let load_sampler = CpuLoadSampler::new(core_count);
    load_sampler.probe()?;

    let freq_reader = CpuFreqReader::new(core_count);
    if config.frequency_curve.is_some() {
        freq_reader.probe()?;
    }

    let applier = build_applier(&config);
    applier.probe().await?;

    let lkg = LkgTracker::load(LkgStore::default(), core_count);
    let fan = build_fan(&config);
    let fan_handle = fan.as_ref().map(FanController::handle);

    let safe_state = SafeState::new(applier.clone(), core_count, fan_handle);
    let panic_safe = safe_state.clone();
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        panic_safe.engage();
        default_hook(info);
    }));

    let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
    let (usr1_tx, usr1_rx) = mpsc::unbounded_channel();
    spawn_signal_forwarders(shutdown_tx, usr1_tx)?;

    let daemon = Daemon::new(config, applier, load_sampler, freq_reader, lkg, fan);
    let result = daemon.run(shutdown_rx, usr1_rx).await;

    // Unconditional on every exit path, success included.
    safe_state.engage();
    result
}
