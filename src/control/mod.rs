// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Per-tick control stages between curve output and actuation.

mod hysteresis;
mod smoother;

pub use hysteresis::HysteresisGate;
pub use smoother::{RampProgress, VoltageSmoother, MIN_STEP_MV};
