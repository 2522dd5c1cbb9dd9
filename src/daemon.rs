// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! The control loop tying sensors, curves, gating, smoothing, actuation,
//! and the safety net together.
//!
//! A fixed-cadence tick drives everything. Each tick samples the sensors,
//! recomputes per-core targets, walks the smoother one bounded step, and
//! commits changed offsets through the applier. Apply faults feed the
//! progressive recovery ladder; a loop that stops completing ticks trips
//! the watchdog. The fan pipeline runs its own cycle on the shared tick
//! and is unaffected by voltage faults.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::MissedTickBehavior;

use crate::actuator::{CoreOffset, VoltageApplier};
use crate::config::RunConfig;
use crate::control::{HysteresisGate, VoltageSmoother};
use crate::error::{exit, ActuationError, Result, VoltError};
use crate::fan::{FanController, FanStatus};
use crate::safety::{
    FaultCounter, Heartbeat, LkgTracker, ProgressiveRecovery, RecoveryAction, Watchdog,
};
use crate::sensors::{CpuFreqReader, CpuLoadSampler, FreqSample};
use crate::status::{CoreStatus, StatusEmitter, StatusRecord};

/// The voltage/fan control daemon.
///
/// Owns every piece of per-core pipeline state. Constructed once in `main`
/// after the startup probes pass, consumed by [`Daemon::run`].
pub struct Daemon {
    config: RunConfig,
    core_count: usize,
    applier: Arc<dyn VoltageApplier>,
    load_sampler: CpuLoadSampler,
    freq_reader: CpuFreqReader,
    gate: HysteresisGate,
    smoother: VoltageSmoother,
    faults: FaultCounter,
    recovery: ProgressiveRecovery,
    lkg: LkgTracker,
    heartbeat: Heartbeat,
    emitter: StatusEmitter,
    fan: Option<FanController>,
    last_loads: Vec<Option<f64>>,
    last_fan_status: Option<FanStatus>,
    in_fallback: bool,
}

impl Daemon {
    pub fn new(
        config: RunConfig,
        applier: Arc<dyn VoltageApplier>,
        load_sampler: CpuLoadSampler,
        freq_reader: CpuFreqReader,
        lkg: LkgTracker,
        fan: Option<FanController>,
    ) -> Self {
        let core_count = load_sampler.core_count();
        let gate = HysteresisGate::new(core_count, config.hysteresis_pct);
        let smoother = VoltageSmoother::new(
            core_count,
            config.strategy.ramp_time_ms(),
            config.tick_ms(),
        );
        let emitter = StatusEmitter::new(config.status_interval_ms);
        Self {
            core_count,
            applier,
            load_sampler,
            freq_reader,
            gate,
            smoother,
            faults: FaultCounter::new(),
            recovery: ProgressiveRecovery::new(),
            lkg,
            heartbeat: Heartbeat::new(),
            emitter,
            fan,
            last_loads: vec![None; core_count],
            last_fan_status: None,
            in_fallback: false,
            config,
        }
    }

    /// Drive the loop until shutdown, a watchdog stall, or a fatal fault.
    ///
    /// `shutdown` delivers SIGTERM/SIGINT; `force_status` delivers SIGUSR1
    /// requests for an immediate status record. The fan is released on
    /// every return path; voltage zeroing is the caller's safe-state duty.
    pub async fn run(
        mut self,
        mut shutdown: UnboundedReceiver<()>,
        mut force_status: UnboundedReceiver<()>,
    ) -> Result<()> {
        tracing::info!(
            cores = self.core_count,
            strategy = self.config.strategy.name(),
            applier = self.applier.name(),
            fan = self.fan.is_some(),
            "control loop starting"
        );
        self.heartbeat.beat();
        let watchdog = Watchdog::new(self.heartbeat.clone());

        let result = tokio::select! {
            res = self.run_loop(&mut force_status) => res,
            stalled = watchdog.wait_for_stall() => {
                Err(VoltError::WatchdogTimeout(stalled))
            }
            Some(()) = shutdown.recv() => {
                tracing::info!("shutdown requested");
                Ok(())
            }
        };

        if let Some(fan) = &self.fan {
            fan.stop();
        }
        result
    }

    async fn run_loop(&mut self, force_status: &mut UnboundedReceiver<()>) -> Result<()> {
        let mut ticker = tokio::time::interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await?;
                    self.emit_status(false);
                }
                Some(()) = force_status.recv() => {
                    self.emit_status(true);
                }
            }
        }
    }

    /// One control cycle. An error return is fatal to the daemon.
    async fn tick(&mut self) -> Result<()> {
        self.last_loads = self.load_sampler.sample();
        let freqs = self.freq_reader.sample();
        self.observe_fallback();

        if self.recovery.is_recovering() {
            // Hold the retreated offsets; clean cycles walk the recovery
            // machine back to stable before target chasing resumes.
            self.recovery.on_clean_cycle();
        } else {
            let targets = self.compute_targets(&freqs);
            self.apply_targets(&targets).await?;
        }

        if let Some(fan) = &mut self.fan {
            self.last_fan_status = Some(fan.tick());
        }

        self.heartbeat.beat();
        Ok(())
    }

    /// Whether the sensor driving targets has been lost long enough to
    /// force the zero-offset fallback.
    fn sensor_lost(&self) -> bool {
        if self.config.frequency_curve.is_some() {
            self.freq_reader.in_fallback()
        } else {
            self.load_sampler.in_fallback()
        }
    }

    fn observe_fallback(&mut self) {
        let fallback = self.sensor_lost();
        if fallback && !self.in_fallback {
            tracing::warn!("sensor input lost, degrading to zero offset");
            self.emit_error(
                exit::SENSOR_UNAVAILABLE,
                "sensor input lost, running at zero offset".to_string(),
            );
        } else if !fallback && self.in_fallback {
            tracing::info!("sensor input recovered");
        }
        self.in_fallback = fallback;
    }

    /// Next target per core. `None` keeps the core's current target.
    fn compute_targets(&self, freqs: &[FreqSample]) -> Vec<Option<i32>> {
        if self.in_fallback {
            return vec![Some(0); self.core_count];
        }

        match &self.config.frequency_curve {
            Some(curve) => freqs
                .iter()
                .enumerate()
                .map(|(core, sample)| match sample {
                    FreqSample::Changed(mhz) => match curve.voltage_at(*mhz) {
                        Ok(mv) => Some(mv),
                        Err(e) => {
                            tracing::warn!(core, error = %e, "frequency target unavailable");
                            None
                        }
                    },
                    // An unchanged frequency or a transient read failure
                    // leaves the previous target standing.
                    FreqSample::Unchanged(_) | FreqSample::Unavailable => None,
                })
                .collect(),
            None => (0..self.core_count)
                .map(|core| {
                    self.last_loads.get(core).copied().flatten().map(|load| {
                        self.config
                            .strategy
                            .target_mv(self.config.curve_for_core(core), load)
                    })
                })
                .collect(),
        }
    }

    /// Gate new targets, advance ramps, and commit what changed.
    async fn apply_targets(&mut self, targets: &[Option<i32>]) -> Result<()> {
        for (core, target) in targets.iter().enumerate() {
            if let Some(target_mv) = *target {
                if self.gate.accepts(core, target_mv) {
                    self.smoother.set_target(core, target_mv);
                }
            }
        }

        let mut batch = Vec::new();
        for core in 0..self.core_count {
            let value_mv = self.smoother.advance(core);
            let due = match self.gate.last_applied(core) {
                Some(last) => last != value_mv,
                // Hardware boots at offset 0; nothing to commit until a
                // core leaves it.
                None => value_mv != 0,
            };
            if due {
                batch.push(CoreOffset::new(core, value_mv));
            }
        }

        if batch.is_empty() {
            self.note_clean_tick();
            return Ok(());
        }

        match self.applier.apply(&batch).await {
            Ok(()) => {
                for offset in &batch {
                    self.gate.record_applied(offset.core, offset.offset_mv);
                }
                self.faults.record_success();
                self.note_clean_tick();
                Ok(())
            }
            Err(e) => self.handle_apply_fault(&batch, e).await,
        }
    }

    /// Account a tick that completed without an apply fault.
    fn note_clean_tick(&mut self) {
        self.recovery.on_clean_cycle();
        // Fallback ticks run at forced zeros; refreshing the LKG with them
        // would discard the real rollback point.
        if !self.recovery.is_recovering()
            && !self.in_fallback
            && self.lkg.record_stable_tick(&self.smoother.current_all())
        {
            tracing::info!(offsets = ?self.lkg.offsets(), "last known good refreshed");
        }
    }

    async fn handle_apply_fault(&mut self, attempted: &[CoreOffset], err: VoltError) -> Result<()> {
        let consecutive = self.faults.record_fault();
        self.lkg.record_fault();
        tracing::warn!(error = %err, consecutive, "voltage apply failed");
        self.emit_error(exit::APPLY_FAULT, err.to_string());

        // Hardware kept its previous values; walk software state back to
        // them so the retry ramps from reality.
        for offset in attempted {
            let last = self.gate.last_applied(offset.core).unwrap_or(0);
            self.smoother.snap_to(offset.core, last);
        }

        if self.faults.is_exhausted() {
            return Err(ActuationError::FaultLimitReached {
                failures: consecutive,
            }
            .into());
        }
        if self.faults.is_unstable() {
            self.run_recovery().await?;
        }
        Ok(())
    }

    /// Advance the recovery ladder until an apply sticks or it exhausts.
    async fn run_recovery(&mut self) -> Result<()> {
        loop {
            let current = self.smoother.current_all();
            let action = self.recovery.on_instability(&current, self.lkg.offsets());
            let (offsets, is_rollback) = match action {
                RecoveryAction::ApplyReduced(offsets) => (offsets, false),
                RecoveryAction::ApplyLkg(offsets) => (offsets, true),
                RecoveryAction::Exhausted => {
                    return Err(ActuationError::FaultLimitReached {
                        failures: self.faults.consecutive(),
                    }
                    .into());
                }
                RecoveryAction::None => return Ok(()),
            };

            let batch: Vec<CoreOffset> = offsets
                .iter()
                .enumerate()
                .map(|(core, mv)| CoreOffset::new(core, *mv))
                .collect();
            match self.applier.apply(&batch).await {
                Ok(()) => {
                    for offset in &batch {
                        self.smoother.snap_to(offset.core, offset.offset_mv);
                        self.gate.record_applied(offset.core, offset.offset_mv);
                    }
                    self.faults.record_success();
                    if is_rollback {
                        self.recovery.on_rollback_applied();
                    }
                    return Ok(());
                }
                Err(e) => {
                    let consecutive = self.faults.record_fault();
                    self.lkg.record_fault();
                    tracing::error!(error = %e, consecutive, "recovery apply failed");
                    self.emit_error(exit::APPLY_FAULT, e.to_string());
                    if self.faults.is_exhausted() {
                        return Err(ActuationError::FaultLimitReached {
                            failures: consecutive,
                        }
                        .into());
                    }
                }
            }
        }
    }

    /// Snapshot for the status stream.
    fn status_record(&self) -> StatusRecord {
        let cores = (0..self.core_count)
            .map(|core| CoreStatus {
                core,
                load_pct: self.last_loads.get(core).copied().flatten(),
                frequency_mhz: self.freq_reader.last_mhz(core),
                voltage_mv: self.smoother.current(core),
            })
            .collect();
        StatusRecord::Status {
            uptime_ms: self.emitter.uptime_ms(),
            strategy: self.config.strategy.name().to_string(),
            cores,
            fan: self.last_fan_status.clone(),
            sensor_fallback: self.in_fallback,
        }
    }

    fn emit_status(&mut self, force: bool) {
        if !self.emitter.should_emit(force) {
            return;
        }
        for ramp in self.smoother.ramps_in_flight() {
            let record = StatusRecord::Transition {
                core: ramp.core,
                from_mv: ramp.from_mv,
                to_mv: ramp.to_mv,
                progress: ramp.progress,
            };
            if let Err(e) = self.emitter.emit(&record) {
                tracing::debug!(error = %e, "transition record emit failed");
            }
        }
        let record = self.status_record();
        if let Err(e) = self.emitter.emit(&record) {
            tracing::debug!(error = %e, "status record emit failed");
        }
    }

    fn emit_error(&self, code: i32, message: String) {
        let record = StatusRecord::Error { code, message };
        if let Err(e) = self.emitter.emit(&record) {
            tracing::debug!(error = %e, "error record emit failed");
        }
    }
}
