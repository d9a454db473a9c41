// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! PLC data collector
//!
//! Polls data points from an industrial-protocol server and forwards them,
//! batched, to an InfluxDB v2 bucket.
//!
//! # Features
//!
//! - **Fixed-rate polling**: ticks independent of read latency, no tick queueing
//! - **Self-healing connections**: per-connection reconnect task with
//!   exponential backoff and jitter
//! - **Batched writes**: size/age triggered batches, bounded retries per batch
//! - **Graceful shutdown**: bounded final flush, every lost batch reported
//!
//! # Quick Start
//!
//! ```bash
//! # Write an example configuration
//! plc-collector gen-config --output collector.toml
//!
//! # Check it
//! plc-collector validate --config collector.toml
//!
//! # Run
//! INFLUX_TOKEN=... plc-collector --config collector.toml
//! ```
//!
//! # Configuration File
//!
//! ```toml
//! [source]
//! endpoint = "sim://simulated-plc"
//!
//! [sink]
//! url = "http://localhost:8086"
//! org = "plant"
//! bucket = "machine_status"
//! token_env = "INFLUX_TOKEN"
//!
//! [[nodes]]
//! id = "ns=3;i=5"
//! tag = "press-1"
//! ```
//!
//! # Embedding
//!
//! With the `opcua` feature, `opc.tcp://` endpoints are read through
//! `OpcUaSource`.
//!
//! The protocol client and the store are injected as [`SourceConnector`] and
//! [`SinkConnector`] trait objects, so a [`Supervisor`] can run against any
//! implementation.

pub mod backoff;
pub mod buffer;
pub mod config;
pub mod connection;
pub mod mapping;
pub mod node;
#[cfg(feature = "opcua")]
pub mod opcua_source;
pub mod sample;
pub mod scheduler;
pub mod session;
pub mod shutdown;
pub mod sink;
pub mod source;
pub mod stats;
pub mod supervisor;

pub use backoff::Backoff;
pub use buffer::{BatchBuffer, DropReason, DroppedBatch, RetryQueue};
pub use config::{CollectorConfig, ConfigError};
pub use connection::{ConnectError, ConnectionState, LinkOptions};
pub use mapping::PointMapper;
pub use node::{NodeRegistry, NodeSpec};
#[cfg(feature = "opcua")]
pub use opcua_source::OpcUaSource;
pub use sample::{Batch, Quality, Sample, Value};
pub use scheduler::{PollScheduler, Tick};
pub use session::{ReadError, SessionManager};
pub use shutdown::Shutdown;
pub use sink::{InfluxSink, SinkConnector, SinkHandle, SinkWriter, WriteError};
pub use source::{SimulatedSource, SourceConnector, SourceError, SourceSession};
pub use stats::{CollectorStats, StatsSnapshot};
pub use supervisor::{CollectorError, Supervisor, SupervisorHandle, SupervisorState};
