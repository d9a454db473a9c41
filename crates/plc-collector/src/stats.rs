// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Collector statistics.

use crate::buffer::DroppedBatch;
use crate::sample::{Quality, Sample};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Instant;

/// Running counters of a collector.
#[derive(Debug)]
pub struct CollectorStats {
    /// Read cycles completed.
    pub cycles: AtomicU64,

    /// Ticks skipped because the source was not ready.
    pub cycles_skipped: AtomicU64,

    /// Samples produced by reads.
    pub samples_read: AtomicU64,

    /// Samples with `Good` quality.
    pub samples_good: AtomicU64,

    /// Samples with `Stale` quality.
    pub samples_stale: AtomicU64,

    /// Samples with `Error` quality.
    pub samples_error: AtomicU64,

    /// Batches written.
    pub batches_written: AtomicU64,

    /// Samples written.
    pub samples_written: AtomicU64,

    /// Failed write attempts.
    pub write_failures: AtomicU64,

    /// Batches discarded.
    pub batches_dropped: AtomicU64,

    /// Samples discarded.
    pub samples_dropped: AtomicU64,

    /// Largest number of unwritten samples seen (buffer + retry queue).
    pub peak_backlog: AtomicU64,

    /// Source reconnections.
    pub source_reconnects: AtomicU64,

    /// Sink reconnections.
    pub sink_reconnects: AtomicU64,

    /// Creation time.
    pub created: Instant,
}

impl Default for CollectorStats {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectorStats {
    /// Create zeroed stats.
    pub fn new() -> Self {
        Self {
            cycles: AtomicU64::new(0),
            cycles_skipped: AtomicU64::new(0),
            samples_read: AtomicU64::new(0),
            samples_good: AtomicU64::new(0),
            samples_stale: AtomicU64::new(0),
            samples_error: AtomicU64::new(0),
            batches_written: AtomicU64::new(0),
            samples_written: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            batches_dropped: AtomicU64::new(0),
            samples_dropped: AtomicU64::new(0),
            peak_backlog: AtomicU64::new(0),
            source_reconnects: AtomicU64::new(0),
            sink_reconnects: AtomicU64::new(0),
            created: Instant::now(),
        }
    }

    /// Record the samples of one read cycle.
    pub fn record_cycle(&self, samples: &[Sample]) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.samples_read
            .fetch_add(samples.len() as u64, Ordering::Relaxed);
        for sample in samples {
            let counter = match sample.quality {
                Quality::Good => &self.samples_good,
                Quality::Stale => &self.samples_stale,
                Quality::Error => &self.samples_error,
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a tick skipped for lack of a source session.
    pub fn record_skipped(&self) {
        self.cycles_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a written batch.
    pub fn record_written(&self, samples: usize) {
        self.batches_written.fetch_add(1, Ordering::Relaxed);
        self.samples_written
            .fetch_add(samples as u64, Ordering::Relaxed);
    }

    /// Record a failed write attempt.
    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a dropped batch.
    pub fn record_dropped(&self, dropped: &DroppedBatch) {
        self.batches_dropped.fetch_add(1, Ordering::Relaxed);
        self.samples_dropped
            .fetch_add(dropped.samples as u64, Ordering::Relaxed);
    }

    /// Track the high-water mark of unwritten samples.
    pub fn observe_backlog(&self, samples: usize) {
        self.peak_backlog
            .fetch_max(samples as u64, Ordering::Relaxed);
    }

    /// Publish the reconnection counts of both links.
    pub fn set_reconnects(&self, source: u64, sink: u64) {
        self.source_reconnects.store(source, Ordering::Relaxed);
        self.sink_reconnects.store(sink, Ordering::Relaxed);
    }

    /// Get snapshot of current stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            cycles_skipped: self.cycles_skipped.load(Ordering::Relaxed),
            samples_read: self.samples_read.load(Ordering::Relaxed),
            samples_good: self.samples_good.load(Ordering::Relaxed),
            samples_stale: self.samples_stale.load(Ordering::Relaxed),
            samples_error: self.samples_error.load(Ordering::Relaxed),
            batches_written: self.batches_written.load(Ordering::Relaxed),
            samples_written: self.samples_written.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            batches_dropped: self.batches_dropped.load(Ordering::Relaxed),
            samples_dropped: self.samples_dropped.load(Ordering::Relaxed),
            peak_backlog: self.peak_backlog.load(Ordering::Relaxed),
            source_reconnects: self.source_reconnects.load(Ordering::Relaxed),
            sink_reconnects: self.sink_reconnects.load(Ordering::Relaxed),
            uptime_secs: self.created.elapsed().as_secs(),
        }
    }
}

/// Snapshot of collector statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub cycles: u64,
    pub cycles_skipped: u64,
    pub samples_read: u64,
    pub samples_good: u64,
    pub samples_stale: u64,
    pub samples_error: u64,
    pub batches_written: u64,
    pub samples_written: u64,
    pub write_failures: u64,
    pub batches_dropped: u64,
    pub samples_dropped: u64,
    pub peak_backlog: u64,
    pub source_reconnects: u64,
    pub sink_reconnects: u64,
    pub uptime_secs: u64,
}

impl StatsSnapshot {
    /// Calculate samples read per second.
    pub fn samples_per_second(&self) -> f64 {
        if self.uptime_secs > 0 {
            self.samples_read as f64 / self.uptime_secs as f64
        } else {
            0.0
        }
    }

    /// Calculate samples written per second.
    pub fn writes_per_second(&self) -> f64 {
        if self.uptime_secs > 0 {
            self.samples_written as f64 / self.uptime_secs as f64
        } else {
            0.0
        }
    }
}
