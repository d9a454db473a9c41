// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sink Writer: the connection to the time-series store.
//!
//! Writes are all-or-nothing per batch. A rejected batch is handed back to
//! the caller together with the error class:
//! - `Retryable` (timeout, 5xx): the link is degraded and reconnects
//! - `Fatal` (auth, malformed data): the writer halts for good

use crate::connection::{ConnectError, ConnectionState, Connector, Link, LinkOptions};
use crate::mapping::PointMapper;
use crate::node::NodeRegistry;
use crate::sample::Batch;
use async_trait::async_trait;
use plc_influx::{InfluxClient, InfluxConfig, InfluxError, Point, Precision};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Batch write failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WriteError {
    #[error("Sink not ready ({0})")]
    NotReady(ConnectionState),

    #[error("Retryable write failure: {0}")]
    Retryable(String),

    #[error("Fatal write failure: {0}")]
    Fatal(String),
}

impl WriteError {
    /// Whether the error must stop the collector.
    pub fn is_fatal(&self) -> bool {
        matches!(self, WriteError::Fatal(_))
    }
}

/// Opens connections to the store.
#[async_trait]
pub trait SinkConnector: Send + Sync + 'static {
    /// Connect with the configured endpoint and credentials.
    async fn connect(&self) -> Result<Box<dyn SinkHandle>, ConnectError>;
}

/// An open connection to the store.
#[async_trait]
pub trait SinkHandle: Send + Sync {
    /// Whether the store accepts writes.
    async fn health_check(&self) -> bool;

    /// Write all points in one request.
    async fn write_batch(&self, points: &[Point], precision: Precision) -> Result<(), WriteError>;

    /// Release the connection.
    async fn close(&self) {}
}

// ============================================================================
// InfluxDB
// ============================================================================

/// [`SinkConnector`] for an InfluxDB v2 server.
#[derive(Debug, Clone)]
pub struct InfluxSink {
    config: InfluxConfig,
    timeout: Duration,
}

impl InfluxSink {
    /// Connector using `timeout` for every HTTP request.
    pub fn new(config: InfluxConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }
}

#[async_trait]
impl SinkConnector for InfluxSink {
    async fn connect(&self) -> Result<Box<dyn SinkHandle>, ConnectError> {
        let client = InfluxClient::connect(self.config.clone(), self.timeout)
            .await
            .map_err(|e| connect_error(e, self.timeout))?;
        Ok(Box::new(client))
    }
}

#[async_trait]
impl SinkHandle for InfluxClient {
    async fn health_check(&self) -> bool {
        self.health().await
    }

    async fn write_batch(&self, points: &[Point], precision: Precision) -> Result<(), WriteError> {
        self.write(points, precision).await.map_err(write_error)
    }
}

fn connect_error(e: InfluxError, timeout: Duration) -> ConnectError {
    match e {
        InfluxError::Timeout => ConnectError::Timeout(timeout),
        e if e.is_auth() => ConnectError::AuthRefused(e.to_string()),
        e => ConnectError::Unreachable(e.to_string()),
    }
}

fn write_error(e: InfluxError) -> WriteError {
    if e.is_retryable() {
        WriteError::Retryable(e.to_string())
    } else {
        WriteError::Fatal(e.to_string())
    }
}

// ============================================================================
// Sink Writer
// ============================================================================

/// [`Connector`] wrapping a [`SinkConnector`]; probes with the health check.
pub struct SinkLink {
    sink: Arc<dyn SinkConnector>,
}

#[async_trait]
impl Connector for SinkLink {
    type Handle = dyn SinkHandle;

    async fn connect(&self) -> Result<Arc<dyn SinkHandle>, ConnectError> {
        let handle = self.sink.connect().await?;
        Ok(Arc::from(handle))
    }

    async fn probe(&self, handle: &Self::Handle) -> bool {
        handle.health_check().await
    }

    async fn close(&self, handle: Arc<dyn SinkHandle>) {
        handle.close().await;
    }
}

/// A batch the writer could not write, handed back to its owner.
#[derive(Debug)]
pub struct Rejected {
    /// The untouched batch.
    pub batch: Batch,
    /// Why it was rejected.
    pub error: WriteError,
}

/// Owns the sink connection and writes batches in `Ready` state.
pub struct SinkWriter {
    link: Arc<Link<SinkLink>>,
    mapper: PointMapper,
    nodes: NodeRegistry,
    precision: Precision,
    write_timeout: Duration,
    halted: AtomicBool,
}

impl SinkWriter {
    /// Create a writer. Nothing is connected yet.
    pub fn new(
        sink: Arc<dyn SinkConnector>,
        options: LinkOptions,
        mapper: PointMapper,
        nodes: NodeRegistry,
        precision: Precision,
        write_timeout: Duration,
    ) -> Self {
        Self {
            link: Arc::new(Link::new("sink", SinkLink { sink }, options)),
            mapper,
            nodes,
            precision,
            write_timeout,
            halted: AtomicBool::new(false),
        }
    }

    /// Connect and verify health before the reconnect task starts.
    pub async fn connect(&self) -> Result<(), ConnectError> {
        self.link.connect().await
    }

    /// Ask the store whether it accepts writes.
    pub async fn health_check(&self) -> bool {
        if self.is_halted() {
            return false;
        }
        match self.link.handle() {
            Some(handle) => handle.health_check().await,
            None => false,
        }
    }

    /// `true` when a write may be attempted.
    pub fn is_ready(&self) -> bool {
        !self.is_halted() && self.link.is_ready()
    }

    /// `true` after a fatal write error.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.link.state()
    }

    /// Successful reconnections since start.
    pub fn reconnects(&self) -> u64 {
        self.link.reconnects()
    }

    /// Start the reconnect task for this sink.
    pub fn spawn_reconnect(&self) -> JoinHandle<()> {
        self.link.spawn_reconnect()
    }

    /// Stop reconnecting and close the connection.
    pub async fn disconnect(&self) {
        self.link.disconnect().await;
    }

    /// Write one batch, all-or-nothing, under the write timeout.
    pub async fn write(&self, batch: Batch) -> Result<(), Rejected> {
        self.write_within(batch, self.write_timeout).await
    }

    /// [`write`](Self::write) with the timeout cut down to `limit`.
    ///
    /// The batch always comes back on failure, timeouts included.
    pub async fn write_within(&self, batch: Batch, limit: Duration) -> Result<(), Rejected> {
        let limit = limit.min(self.write_timeout);
        if self.is_halted() {
            return Err(Rejected {
                batch,
                error: WriteError::Fatal("writer halted".into()),
            });
        }
        let Some(handle) = self.link.handle() else {
            return Err(Rejected {
                batch,
                error: WriteError::NotReady(self.link.state()),
            });
        };

        let points = self.mapper.map_batch(&batch, &self.nodes);
        let write = handle.write_batch(&points, self.precision);
        let result = match tokio::time::timeout(limit, write).await {
            Ok(result) => result,
            Err(_) => Err(WriteError::Retryable(format!(
                "write timed out after {:?}",
                limit
            ))),
        };

        match result {
            Ok(()) => {
                self.link.confirm();
                debug!(samples = batch.len(), "Batch written");
                Ok(())
            }
            Err(error) => {
                match &error {
                    WriteError::Fatal(reason) => {
                        self.halted.store(true, Ordering::SeqCst);
                        error!(reason = %reason, "Fatal write error, sink writer halted");
                    }
                    WriteError::Retryable(reason) => self.link.degrade(reason),
                    WriteError::NotReady(_) => {}
                }
                Err(Rejected { batch, error })
            }
        }
    }
}
