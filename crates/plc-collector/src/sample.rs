// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Read results and batches.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

/// A value read from a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// Floating point reading.
    Float(f64),
    /// Integer reading.
    Int(i64),
    /// Boolean reading.
    Bool(bool),
}

impl Value {
    /// Numeric view of the value; booleans map to `1.0` / `0.0`.
    pub fn as_f64(self) -> f64 {
        match self {
            Value::Float(v) => v,
            Value::Int(v) => v as f64,
            Value::Bool(true) => 1.0,
            Value::Bool(false) => 0.0,
        }
    }

    /// `false` for NaN and infinities.
    pub fn is_finite(self) -> bool {
        match self {
            Value::Float(v) => v.is_finite(),
            Value::Int(_) | Value::Bool(_) => true,
        }
    }
}

/// Quality flag of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quality {
    /// Value read successfully.
    Good,
    /// Node answered without a value.
    Stale,
    /// Read failed; no value.
    Error,
}

impl Quality {
    /// Lowercase name used in the `quality` field downstream.
    pub fn as_str(self) -> &'static str {
        match self {
            Quality::Good => "good",
            Quality::Stale => "stale",
            Quality::Error => "error",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One timestamped read result.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Id of the node that was read.
    pub node_id: String,
    /// Value, present only for `Good` samples.
    pub value: Option<Value>,
    /// Read quality.
    pub quality: Quality,
    /// Monotonic capture instant, drives batch age.
    pub captured_at: Instant,
    /// Wall-clock capture time (Unix nanoseconds), written downstream.
    pub timestamp_ns: u64,
}

impl Sample {
    fn with(node_id: &str, value: Option<Value>, quality: Quality) -> Self {
        Self {
            node_id: node_id.to_string(),
            value,
            quality,
            captured_at: Instant::now(),
            timestamp_ns: unix_now_ns(),
        }
    }

    /// Sample for a successful read. Non-finite floats are downgraded to `Error`.
    pub fn good(node_id: &str, value: Value) -> Self {
        if value.is_finite() {
            Self::with(node_id, Some(value), Quality::Good)
        } else {
            Self::error(node_id)
        }
    }

    /// Sample for a node that answered without a value.
    pub fn stale(node_id: &str) -> Self {
        Self::with(node_id, None, Quality::Stale)
    }

    /// Sample for a failed read.
    pub fn error(node_id: &str) -> Self {
        Self::with(node_id, None, Quality::Error)
    }
}

/// Ordered group of samples flushed together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    samples: Vec<Sample>,
}

impl Batch {
    /// Wrap samples in capture order.
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    /// Samples in capture order.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the batch holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Current wall-clock time in Unix nanoseconds (0 if the clock is before the epoch).
pub fn unix_now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
