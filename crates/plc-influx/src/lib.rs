// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! PLC Collector InfluxDB Sink
//!
//! InfluxDB v2 side of the collector.
//!
//! This crate provides:
//! - Connection settings for an InfluxDB v2 bucket
//! - Line Protocol generation with configurable timestamp precision
//! - An async HTTP client with health probing and batch writes
//! - Classification of write failures into retryable and fatal
//!
//! # Overview
//!
//! ```text
//! Point --> LineProtocolWriter --> body --> InfluxClient::write --> /api/v2/write
//! ```

pub mod client;
pub mod config;
pub mod influx;

pub use client::{InfluxClient, InfluxError};
pub use config::InfluxConfig;
pub use influx::{FieldValue, LineProtocolWriter, Point, Precision};
