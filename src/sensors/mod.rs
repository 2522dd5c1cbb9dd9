// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CPU sensor inputs: per-core load and frequency.

mod frequency;
mod load;

pub use frequency::{CpuFreqReader, FreqSample};
pub use load::{CpuLoadSampler, FALLBACK_AFTER_FAILURES};

use sysinfo::System;

/// Number of logical cores visible to the OS.
pub fn detect_core_count() -> usize {
    let sys = System::new_all();
    sys.cpus().len()
}
