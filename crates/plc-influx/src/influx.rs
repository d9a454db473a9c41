// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! InfluxDB v2 Line Protocol writer.
//!
//! Line Protocol format:
//! ```text
//! measurement,tag1=val1,tag2=val2 field1=val1,field2=val2 timestamp
//! ```
//!
//! The timestamp unit follows the [`Precision`] passed to the writer and must
//! match the `precision` query parameter of the write request.
//!
//! See: <https://docs.influxdata.com/influxdb/v2/reference/syntax/line-protocol/>

use crate::client::InfluxError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A value that can be stored in an InfluxDB field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// 64-bit floating point.
    Float(f64),
    /// 64-bit signed integer.
    Integer(i64),
    /// UTF-8 string.
    String(String),
    /// Boolean value.
    Boolean(bool),
}

impl FieldValue {
    /// Format this value for InfluxDB Line Protocol.
    ///
    /// - Float: written as-is (e.g., `3.14`)
    /// - Integer: suffixed with `i` (e.g., `42i`)
    /// - String: quoted with double quotes, inner quotes escaped (e.g., `"hello"`)
    /// - Boolean: `true` or `false`
    pub fn to_line_protocol(&self) -> String {
        match self {
            FieldValue::Float(v) => format!("{}", v),
            FieldValue::Integer(v) => format!("{}i", v),
            FieldValue::String(v) => {
                let escaped = v.replace('\\', "\\\\").replace('"', "\\\"");
                format!("\"{}\"", escaped)
            }
            FieldValue::Boolean(v) => v.to_string(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_line_protocol())
    }
}

/// Timestamp precision of a write request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// Nanoseconds.
    #[default]
    Ns,
    /// Microseconds.
    Us,
    /// Milliseconds.
    Ms,
    /// Seconds.
    S,
}

impl Precision {
    /// Value of the `precision` query parameter.
    pub fn as_str(self) -> &'static str {
        match self {
            Precision::Ns => "ns",
            Precision::Us => "us",
            Precision::Ms => "ms",
            Precision::S => "s",
        }
    }

    /// Convert a Unix timestamp in nanoseconds into this precision (truncating).
    pub fn convert(self, timestamp_ns: u64) -> u64 {
        match self {
            Precision::Ns => timestamp_ns,
            Precision::Us => timestamp_ns / 1_000,
            Precision::Ms => timestamp_ns / 1_000_000,
            Precision::S => timestamp_ns / 1_000_000_000,
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single time-series point.
///
/// Tags and fields are kept sorted by key so the encoded line is canonical.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    /// Measurement name.
    pub measurement: String,
    /// Tag set (indexed, for filtering).
    pub tags: BTreeMap<String, String>,
    /// Field set (actual data).
    pub fields: BTreeMap<String, FieldValue>,
    /// Timestamp in nanoseconds since Unix epoch.
    pub timestamp_ns: u64,
}

impl Point {
    /// Start a point for `measurement` with no tags, no fields and timestamp 0.
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp_ns: 0,
        }
    }

    /// Add a tag.
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Add a field.
    pub fn field(mut self, key: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Set the timestamp (nanoseconds since Unix epoch).
    pub fn timestamp_ns(mut self, timestamp_ns: u64) -> Self {
        self.timestamp_ns = timestamp_ns;
        self
    }
}

/// InfluxDB v2 Line Protocol writer.
///
/// Accumulates encoded lines until flushed into a request body.
pub struct LineProtocolWriter {
    precision: Precision,
    buffer: Vec<String>,
}

impl LineProtocolWriter {
    /// Create a new empty writer for the given precision.
    pub fn new(precision: Precision) -> Self {
        Self {
            precision,
            buffer: Vec::new(),
        }
    }

    /// Encode a single point.
    ///
    /// Fails with [`InfluxError::NoFields`] when the point has no fields
    /// (InfluxDB requires at least one).
    pub fn write_point(&mut self, point: &Point) -> Result<(), InfluxError> {
        if point.fields.is_empty() {
            return Err(InfluxError::NoFields(point.measurement.clone()));
        }

        let mut line = escape_measurement(&point.measurement);

        for (key, value) in &point.tags {
            // Empty tag values are not allowed by the protocol.
            if value.is_empty() {
                continue;
            }
            line.push(',');
            line.push_str(&escape_key(key));
            line.push('=');
            line.push_str(&escape_key(value));
        }

        line.push(' ');

        for (i, (key, value)) in point.fields.iter().enumerate() {
            if i > 0 {
                line.push(',');
            }
            line.push_str(&escape_key(key));
            line.push('=');
            line.push_str(&value.to_line_protocol());
        }

        line.push(' ');
        line.push_str(&self.precision.convert(point.timestamp_ns).to_string());

        self.buffer.push(line);
        Ok(())
    }

    /// Encode every point, stopping at the first invalid one.
    pub fn write_points(&mut self, points: &[Point]) -> Result<(), InfluxError> {
        for point in points {
            self.write_point(point)?;
        }
        Ok(())
    }

    /// Flush the buffer, returning all accumulated lines.
    pub fn flush(&mut self) -> Vec<String> {
        std::mem::take(&mut self.buffer)
    }

    /// Flush the buffer as a newline separated request body.
    pub fn flush_body(&mut self) -> String {
        self.flush().join("\n")
    }

    /// Get the current number of buffered lines.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for LineProtocolWriter {
    fn default() -> Self {
        Self::new(Precision::default())
    }
}

/// Escape measurement name: spaces and commas.
fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

/// Escape tag keys, tag values and field keys: commas, equals signs and spaces.
fn escape_key(s: &str) -> String {
    s.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}
