// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Progressive instability recovery.
//!
//! First response to instability is a gentle retreat: every core's offset
//! moves a fixed step toward zero. If instability persists, the persisted
//! last-known-good offsets are restored outright. Beyond that the machine
//! declares itself exhausted and the daemon terminates.

/// Millivolts each core retreats toward 0 per recovery attempt.
pub const REDUCTION_STEP_MV: i32 = 5;

/// Clean heartbeat cycles required to leave the reduced stage.
pub const CLEAN_CYCLES_TO_STABILIZE: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStage {
    /// Normal operation.
    Stable,
    /// Offsets retreated; waiting for clean cycles.
    Reduced,
    /// Last-known-good restore in flight.
    RollingBack,
}

impl RecoveryStage {
    pub fn name(&self) -> &'static str {
        match self {
            RecoveryStage::Stable => "stable",
            RecoveryStage::Reduced => "reduced",
            RecoveryStage::RollingBack => "rolling_back",
        }
    }
}

/// What the control loop must do in response to a recovery event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Nothing to change.
    None,
    /// Apply these retreated offsets.
    ApplyReduced(Vec<i32>),
    /// Apply the last-known-good offsets.
    ApplyLkg(Vec<i32>),
    /// Recovery options used up; terminate.
    Exhausted,
}

/// Staged recovery state machine.
#[derive(Debug)]
pub struct ProgressiveRecovery {
    stage: RecoveryStage,
    clean_cycles: u32,
}

impl Default for ProgressiveRecovery {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressiveRecovery {
    pub fn new() -> Self {
        Self {
            stage: RecoveryStage::Stable,
            clean_cycles: 0,
        }
    }

    pub fn stage(&self) -> RecoveryStage {
        self.stage
    }

    pub fn is_recovering(&self) -> bool {
        self.stage != RecoveryStage::Stable
    }

    /// Offsets retreated one step toward zero.
    fn reduced_offsets(current: &[i32]) -> Vec<i32> {
        current
            .iter()
            .map(|mv| (mv + REDUCTION_STEP_MV).min(0))
            .collect()
    }

    /// React to detected instability.
    pub fn on_instability(&mut self, current_offsets: &[i32], lkg_offsets: &[i32]) -> RecoveryAction {
        match self.stage {
            RecoveryStage::Stable => {
                self.stage = RecoveryStage::Reduced;
                self.clean_cycles = 0;
                let reduced = Self::reduced_offsets(current_offsets);
                tracing::warn!(?reduced, "instability: retreating offsets");
                RecoveryAction::ApplyReduced(reduced)
            }
            RecoveryStage::Reduced => {
                self.stage = RecoveryStage::RollingBack;
                tracing::warn!(lkg = ?lkg_offsets, "instability persists: rolling back to last known good");
                RecoveryAction::ApplyLkg(lkg_offsets.to_vec())
            }
            RecoveryStage::RollingBack => {
                tracing::error!("instability during rollback: recovery exhausted");
                RecoveryAction::Exhausted
            }
        }
    }

    /// The rollback apply succeeded.
    pub fn on_rollback_applied(&mut self) {
        if self.stage == RecoveryStage::RollingBack {
            self.stage = RecoveryStage::Stable;
            self.clean_cycles = 0;
            tracing::info!("last known good restored");
        }
    }

    /// One heartbeat cycle passed without faults. Returns true when the
    /// machine just returned to stable.
    pub fn on_clean_cycle(&mut self) -> bool {
        match self.stage {
            RecoveryStage::Reduced => {
                self.clean_cycles += 1;
                if self.clean_cycles >= CLEAN_CYCLES_TO_STABILIZE {
                    self.stage = RecoveryStage::Stable;
                    self.clean_cycles = 0;
                    tracing::info!("reduced offsets held: back to stable");
                    true
                } else {
                    false
                }
            }
            _ => false,
        }
    }
}
