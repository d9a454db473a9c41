// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Exponential reconnect backoff with jitter.
//!
//! The delay after the n-th consecutive failure is
//! `min(base * 2^(n-1), max)` stretched by a random factor in
//! `[1, 1 + jitter]`, and never exceeds `max`.

use std::time::Duration;

/// Reconnect delay policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// Delay after the first failure.
    pub base: Duration,
    /// Delay cap.
    pub max: Duration,
    /// Jitter factor (0.0 - 1.0).
    pub jitter: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(30),
            jitter: 0.2,
        }
    }
}

impl Backoff {
    /// Create with custom base and cap, default jitter.
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            ..Default::default()
        }
    }

    /// Set jitter factor.
    pub fn with_jitter(mut self, factor: f64) -> Self {
        self.jitter = factor.clamp(0.0, 1.0);
        self
    }

    /// Delay to wait after `failures` consecutive failures (1-based).
    pub fn delay(&self, failures: u32) -> Duration {
        self.delay_with(failures, fastrand::f64())
    }

    /// Same as [`delay`](Self::delay) with an explicit random draw in `[0, 1]`.
    pub fn delay_with(&self, failures: u32, unit: f64) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        let raw = self
            .base
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max);

        let stretch = 1.0 + self.jitter.clamp(0.0, 1.0) * unit.clamp(0.0, 1.0);
        raw.mul_f64(stretch).min(self.max)
    }
}
