// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Poll Scheduler: fixed-rate read cycle ticks.
//!
//! Ticks are spaced by the poll interval regardless of how long a cycle
//! takes. A cycle that overruns makes the next tick fire immediately, and
//! missed ticks are not queued: the schedule restarts from that late tick.

use crate::shutdown::Shutdown;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// One scheduled read cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Cycle number, starting at 0.
    pub seq: u64,
    /// When the tick fired.
    pub at: Instant,
}

/// Timer-driven tick source with cooperative cancellation.
#[derive(Debug)]
pub struct PollScheduler {
    interval: Interval,
    shutdown: Shutdown,
    ticks: u64,
}

impl PollScheduler {
    /// Create a scheduler; the first tick fires immediately.
    pub fn new(period: Duration, shutdown: Shutdown) -> Self {
        let period = period.max(Duration::from_millis(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval,
            shutdown,
            ticks: 0,
        }
    }

    /// Ticks produced so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Wait for the next tick. `None` once shutdown is requested.
    pub async fn next_tick(&mut self) -> Option<Tick> {
        if self.shutdown.is_triggered() {
            return None;
        }

        tokio::select! {
            biased;
            _ = self.shutdown.wait() => None,
            at = self.interval.tick() => {
                let tick = Tick { seq: self.ticks, at };
                self.ticks += 1;
                Some(tick)
            }
        }
    }
}
