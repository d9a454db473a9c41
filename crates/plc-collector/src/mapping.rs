// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sample mapping to InfluxDB points.
//!
//! Every sample becomes one point:
//! - tags `node_id` and `tag` (the latter omitted when empty)
//! - field `value` as a float, booleans written as `1.0` / `0.0`, absent
//!   when the sample carries no value
//! - field `quality` (`good`, `stale`, `error`), always present
//! - timestamp from the wall-clock capture time

use crate::node::NodeRegistry;
use crate::sample::{Batch, Sample};
use plc_influx::{FieldValue, Point};

/// Default measurement name.
pub const DEFAULT_MEASUREMENT: &str = "machine_status";

/// Maps samples to InfluxDB points of one measurement.
#[derive(Debug, Clone)]
pub struct PointMapper {
    measurement: String,
}

impl PointMapper {
    /// Create a mapper writing to `measurement`.
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
        }
    }

    /// Map one sample. The node's tag is looked up in `nodes`.
    pub fn map_sample(&self, sample: &Sample, nodes: &NodeRegistry) -> Point {
        let tag = nodes.get(&sample.node_id).map(|n| n.tag.as_str()).unwrap_or("");

        let mut point = Point::new(&self.measurement)
            .tag("node_id", &sample.node_id)
            .tag("tag", tag)
            .field("quality", FieldValue::String(sample.quality.as_str().to_string()))
            .timestamp_ns(sample.timestamp_ns);

        if let Some(value) = sample.value {
            point = point.field("value", FieldValue::Float(value.as_f64()));
        }
        point
    }

    /// Map a batch, preserving order.
    pub fn map_batch(&self, batch: &Batch, nodes: &NodeRegistry) -> Vec<Point> {
        batch
            .samples()
            .iter()
            .map(|s| self.map_sample(s, nodes))
            .collect()
    }
}

impl Default for PointMapper {
    fn default() -> Self {
        Self::new(DEFAULT_MEASUREMENT)
    }
}
