// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Last-known-good offset persistence.
//!
//! The LKG is the rollback target for progressive recovery. It only
//! refreshes after a long uninterrupted run of stable ticks, so one good
//! moment inside a flapping session can never be mistaken for a proven
//! configuration. Absent or unreadable state degrades to all-zero offsets,
//! which is always safe.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Consecutive stable ticks required before the LKG refreshes.
pub const STABLE_TICKS_FOR_REFRESH: u32 = 60;

const DEFAULT_STATE_DIR: &str = "/var/lib/corevoltd";
const LKG_FILE_NAME: &str = "lkg.json";

#[derive(Debug, Serialize, Deserialize)]
struct LkgFile {
    offsets_mv: Vec<i32>,
    saved_at: String,
}

/// On-disk LKG storage.
#[derive(Debug, Clone)]
pub struct LkgStore {
    path: PathBuf,
}

impl Default for LkgStore {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_DIR)
    }
}

impl LkgStore {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            path: state_dir.as_ref().join(LKG_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load persisted offsets, padded or truncated to `core_count`.
    /// Missing or corrupt state yields all zeros.
    pub fn load(&self, core_count: usize) -> Vec<i32> {
        let mut offsets = match std::fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice::<LkgFile>(&bytes) {
                Ok(file) => file.offsets_mv,
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "corrupt LKG state, using zeros");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };
        offsets.resize(core_count, 0);
        // Stored values outside the safe range are not trusted either.
        for mv in &mut offsets {
            *mv = crate::curves::clamp_offset_mv(*mv);
        }
        offsets
    }

    /// Persist offsets as the new LKG.
    pub fn save(&self, offsets: &[i32]) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let file = LkgFile {
            offsets_mv: offsets.to_vec(),
            saved_at: chrono::Utc::now().to_rfc3339(),
        };
        std::fs::write(&self.path, serde_json::to_string_pretty(&file)?)?;
        tracing::debug!(path = %self.path.display(), ?offsets, "LKG saved");
        Ok(())
    }
}

/// Tracks stability and decides when the LKG may refresh.
#[derive(Debug)]
pub struct LkgTracker {
    store: LkgStore,
    offsets: Vec<i32>,
    stable_ticks: u32,
}

impl LkgTracker {
    /// Load state from the store; absent state starts at all zeros.
    pub fn load(store: LkgStore, core_count: usize) -> Self {
        let offsets = store.load(core_count);
        Self {
            store,
            offsets,
            stable_ticks: 0,
        }
    }

    /// Current LKG offsets (the rollback target).
    pub fn offsets(&self) -> &[i32] {
        &self.offsets
    }

    pub fn stable_ticks(&self) -> u32 {
        self.stable_ticks
    }

    /// Record a fault; the stability window starts over.
    pub fn record_fault(&mut self) {
        self.stable_ticks = 0;
    }

    /// Record a stable tick with the currently applied offsets. When the
    /// stability window completes, the LKG refreshes (memory and disk) and
    /// the window restarts. Returns true on refresh.
    pub fn record_stable_tick(&mut self, applied: &[i32]) -> bool {
        self.stable_ticks = self.stable_ticks.saturating_add(1);
        if self.stable_ticks < STABLE_TICKS_FOR_REFRESH {
            return false;
        }

        self.offsets = applied.to_vec();
        self.stable_ticks = 0;
        if let Err(e) = self.store.save(&self.offsets) {
            tracing::warn!(error = %e, "LKG persist failed, keeping in-memory copy");
        }
        tracing::info!(offsets = ?self.offsets, "LKG refreshed");
        true
    }
}
