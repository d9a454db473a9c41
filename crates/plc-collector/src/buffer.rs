// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sample batching and the retry queue of unwritten batches.
//!
//! [`BatchBuffer`] accumulates samples and asks to be flushed either when
//! the batch is full or when its oldest sample is too old. Drained batches
//! that could not be written wait in a [`RetryQueue`], oldest first, until
//! they are written, exhaust their attempts, or are pushed out by newer
//! batches when the backlog is full.

use crate::sample::{Batch, Sample};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// A batching buffer that collects samples.
///
/// Samples are accumulated until either:
/// - The buffer holds `max_size` samples (size-based flush)
/// - The oldest sample is `max_age` old (age-based flush)
#[derive(Debug)]
pub struct BatchBuffer {
    samples: Vec<Sample>,
    max_size: usize,
    max_age: Duration,
    oldest: Option<Instant>,
}

impl BatchBuffer {
    /// Create a new batch buffer.
    ///
    /// # Arguments
    /// - `max_size` - Sample count that triggers a flush (at least 1)
    /// - `max_age` - Age of the oldest sample that triggers a flush
    pub fn new(max_size: usize, max_age: Duration) -> Self {
        let max_size = max_size.max(1);
        Self {
            samples: Vec::with_capacity(max_size),
            max_size,
            max_age,
            oldest: None,
        }
    }

    /// Append a sample.
    pub fn add(&mut self, sample: Sample) {
        if self.samples.is_empty() {
            self.oldest = Some(sample.captured_at);
        }
        self.samples.push(sample);
    }

    /// Check if a size or age flush is due.
    pub fn should_flush(&self) -> bool {
        self.should_flush_at(Instant::now())
    }

    /// Same as [`should_flush`](Self::should_flush) against a given clock reading.
    pub fn should_flush_at(&self, now: Instant) -> bool {
        if self.samples.len() >= self.max_size {
            return true;
        }
        match self.oldest {
            Some(oldest) => now.saturating_duration_since(oldest) >= self.max_age,
            None => false,
        }
    }

    /// Remove and return every buffered sample. Empty buffer gives an empty batch.
    pub fn drain(&mut self) -> Batch {
        self.oldest = None;
        Batch::new(std::mem::take(&mut self.samples))
    }

    /// Number of buffered samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Configured size threshold.
    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

// ============================================================================
// Retry queue
// ============================================================================

/// Why a batch was discarded without being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Every allowed write attempt failed.
    RetriesExhausted,
    /// Pushed out of a full backlog by a newer batch.
    BacklogFull,
    /// Rejected by a fatal sink error.
    Fatal,
    /// Still pending when the drain timeout expired.
    Shutdown,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DropReason::RetriesExhausted => "retries exhausted",
            DropReason::BacklogFull => "backlog full",
            DropReason::Fatal => "fatal write error",
            DropReason::Shutdown => "shutdown drain timeout",
        };
        f.write_str(s)
    }
}

/// A discarded batch, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DroppedBatch {
    /// Samples lost.
    pub samples: usize,
    /// Failed write attempts made.
    pub attempts: u32,
    /// Why it was dropped.
    pub reason: DropReason,
}

/// A batch waiting to be written.
#[derive(Debug, Clone)]
pub struct PendingBatch {
    /// The samples.
    pub batch: Batch,
    /// Failed write attempts so far.
    pub attempts: u32,
}

/// FIFO of unwritten batches with per-batch attempt limits.
///
/// Failed batches go back to the front, ahead of newer batches.
#[derive(Debug)]
pub struct RetryQueue {
    queue: VecDeque<PendingBatch>,
    max_pending: usize,
    max_attempts: u32,
}

impl RetryQueue {
    /// Create a queue holding at most `max_pending` batches, each written at
    /// most `max_attempts` times.
    pub fn new(max_pending: usize, max_attempts: u32) -> Self {
        Self {
            queue: VecDeque::new(),
            max_pending: max_pending.max(1),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Queue a freshly drained batch behind the others.
    ///
    /// Empty batches are ignored. A full queue drops its oldest batch, which
    /// is returned for reporting.
    pub fn push(&mut self, batch: Batch) -> Option<DroppedBatch> {
        if batch.is_empty() {
            return None;
        }

        let dropped = if self.queue.len() >= self.max_pending {
            self.queue.pop_front().map(|old| DroppedBatch {
                samples: old.batch.len(),
                attempts: old.attempts,
                reason: DropReason::BacklogFull,
            })
        } else {
            None
        };

        self.queue.push_back(PendingBatch { batch, attempts: 0 });
        dropped
    }

    /// Take the oldest batch for a write attempt.
    pub fn pop_front(&mut self) -> Option<PendingBatch> {
        self.queue.pop_front()
    }

    /// Put back a batch that was not attempted.
    pub fn restore(&mut self, pending: PendingBatch) {
        self.queue.push_front(pending);
    }

    /// Record a failed attempt.
    ///
    /// The batch returns to the front, or is dropped (and returned for
    /// reporting) once it reached the attempt limit.
    pub fn requeue(&mut self, mut pending: PendingBatch) -> Option<DroppedBatch> {
        pending.attempts += 1;
        if pending.attempts >= self.max_attempts {
            return Some(DroppedBatch {
                samples: pending.batch.len(),
                attempts: pending.attempts,
                reason: DropReason::RetriesExhausted,
            });
        }
        self.queue.push_front(pending);
        None
    }

    /// Remove every batch.
    pub fn drain_all(&mut self) -> Vec<PendingBatch> {
        self.queue.drain(..).collect()
    }

    /// Number of queued batches.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Total samples across queued batches.
    pub fn pending_samples(&self) -> usize {
        self.queue.iter().map(|p| p.batch.len()).sum()
    }
}
