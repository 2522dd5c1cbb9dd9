// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Safety net: fault accounting, heartbeat watchdog, progressive
//! recovery, LKG persistence, and the terminal safe-state routine.

mod faults;
mod lkg;
mod recovery;
mod watchdog;

pub use faults::{FaultCounter, FATAL_THRESHOLD, INSTABILITY_THRESHOLD};
pub use lkg::{LkgStore, LkgTracker, STABLE_TICKS_FOR_REFRESH};
pub use recovery::{
    ProgressiveRecovery, RecoveryAction, RecoveryStage, CLEAN_CYCLES_TO_STABILIZE,
    REDUCTION_STEP_MV,
};
pub use watchdog::{Heartbeat, Watchdog, HEARTBEAT_STALL_LIMIT, WATCHDOG_POLL_INTERVAL};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::actuator::VoltageApplier;
use crate::fan::FanHandle;

/// The terminal hardware-release routine.
///
/// Every exit path (clean shutdown, signals, watchdog, panic hook) funnels
/// through [`SafeState::engage`], which zeroes all voltage offsets and
/// returns the fan to automatic control exactly once. It is synchronous and
/// must stay callable from a panic hook with no runtime alive.
pub struct SafeState {
    applier: Arc<dyn VoltageApplier>,
    core_count: usize,
    fan: Option<FanHandle>,
    engaged: AtomicBool,
}

impl SafeState {
    pub fn new(
        applier: Arc<dyn VoltageApplier>,
        core_count: usize,
        fan: Option<FanHandle>,
    ) -> Arc<Self> {
        Arc::new(Self {
            applier,
            core_count,
            fan,
            engaged: AtomicBool::new(false),
        })
    }

    /// Return the hardware to its safe state. Idempotent; later calls are
    /// no-ops. Failures are logged, never propagated: there is nothing
    /// useful left to do with them on an exit path.
    pub fn engage(&self) {
        if self.engaged.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::warn!("returning hardware to safe state");

        if let Err(e) = self.applier.zero_all_sync(self.core_count) {
            tracing::error!(error = %e, "emergency offset zeroing failed");
        }
        if let Some(fan) = &self.fan {
            fan.release();
        }
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::SeqCst)
    }
}
