// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Heartbeat liveness monitoring.
//!
//! The control loop beats once per completed tick. A supervisor polls the
//! heartbeat and escalates to a fatal reset when no tick has completed
//! within the stall limit. Beats are millisecond offsets from a shared
//! monotonic origin, so wall-clock jumps cannot fake or mask a stall.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Result, VoltError};

/// No tick for this long means the control loop is gone.
pub const HEARTBEAT_STALL_LIMIT: Duration = Duration::from_secs(10);

/// Supervisor poll cadence.
pub const WATCHDOG_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct HeartbeatInner {
    origin: Instant,
    last_beat_ms: AtomicU64,
}

/// Cloneable beat source shared between the tick loop and the watchdog.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    inner: Arc<HeartbeatInner>,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new()
    }
}

impl Heartbeat {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HeartbeatInner {
                origin: Instant::now(),
                last_beat_ms: AtomicU64::new(0),
            }),
        }
    }

    /// Mark the current tick as completed.
    pub fn beat(&self) {
        let elapsed = self.inner.origin.elapsed().as_millis() as u64;
        self.inner.last_beat_ms.store(elapsed, Ordering::Relaxed);
    }

    /// Time since the most recent beat (or since startup before the first).
    pub fn since_last(&self) -> Duration {
        let now = self.inner.origin.elapsed().as_millis() as u64;
        let last = self.inner.last_beat_ms.load(Ordering::Relaxed);
        Duration::from_millis(now.saturating_sub(last))
    }
}

/// Polls a [`Heartbeat`] against a stall limit.
#[derive(Debug, Clone)]
pub struct Watchdog {
    heartbeat: Heartbeat,
    stall_limit: Duration,
}

impl Watchdog {
    pub fn new(heartbeat: Heartbeat) -> Self {
        Self::with_limit(heartbeat, HEARTBEAT_STALL_LIMIT)
    }

    pub fn with_limit(heartbeat: Heartbeat, stall_limit: Duration) -> Self {
        Self {
            heartbeat,
            stall_limit,
        }
    }

    /// One supervision check.
    pub fn check(&self) -> Result<()> {
        let silence = self.heartbeat.since_last();
        if silence >= self.stall_limit {
            return Err(VoltError::WatchdogTimeout(silence));
        }
        Ok(())
    }

    /// Resolve only when the heartbeat has stalled, with the observed
    /// silence duration.
    pub async fn wait_for_stall(&self) -> Duration {
        let poll = WATCHDOG_POLL_INTERVAL.min(self.stall_limit / 2).max(Duration::from_millis(10));
        loop {
            tokio::time::sleep(poll).await;
            let silence = self.heartbeat.since_last();
            if silence >= self.stall_limit {
                tracing::error!(silence_ms = silence.as_millis() as u64, "watchdog stall detected");
                return silence;
            }
        }
    }
}
