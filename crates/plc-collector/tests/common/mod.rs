// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Scriptable source and sink shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use plc_collector::{
    CollectorConfig, ConnectError, NodeSpec, SinkConnector, SinkHandle, SourceConnector,
    SourceError, SourceSession, Value, WriteError,
};
use plc_influx::{Point, Precision};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Five nodes `ns=3;i=5` .. `ns=3;i=9`, fake endpoints, defaults elsewhere.
pub fn config(nodes: usize) -> CollectorConfig {
    let mut config = CollectorConfig::default();
    config.source.endpoint = "fake://plc".into();
    config.sink.url = "http://influx.test:8086".into();
    config.sink.org = "plant".into();
    config.sink.bucket = "machine_status".into();
    config.sink.token = Some("test-token".into());
    config.sink.health_check_interval_secs = 0;
    config.stats_interval_secs = 0;
    config.nodes = (0..nodes)
        .map(|i| NodeSpec::new(node_id(i), format!("sensor-{}", i)))
        .collect();
    config
}

/// Id of the i-th node in [`config`].
pub fn node_id(i: usize) -> String {
    format!("ns=3;i={}", i + 5)
}

// ============================================================================
// Source
// ============================================================================

#[derive(Default)]
struct SourceInner {
    refuse: AtomicBool,
    failing: Mutex<HashSet<String>>,
    stale: Mutex<HashSet<String>>,
    drop_once: Mutex<Option<String>>,
    reset_always: AtomicBool,
    connects: AtomicU64,
    reads: AtomicU64,
}

/// Source answering `Float(n)` with a global read counter `n`.
#[derive(Clone, Default)]
pub struct FakeSource {
    inner: Arc<SourceInner>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every read of `id` fails with a node error.
    pub fn failing_node(self, id: &str) -> Self {
        self.inner.failing.lock().insert(id.to_string());
        self
    }

    /// Every read of `id` returns no value.
    pub fn stale_node(self, id: &str) -> Self {
        self.inner.stale.lock().insert(id.to_string());
        self
    }

    /// The first read of `id` kills the session.
    pub fn drop_once_at(self, id: &str) -> Self {
        *self.inner.drop_once.lock() = Some(id.to_string());
        self
    }

    /// Accept every session, then kill it on its first read.
    pub fn reset_every_read(self) -> Self {
        self.inner.reset_always.store(true, Ordering::SeqCst);
        self
    }

    /// Refuse (or accept again) connection attempts.
    pub fn set_refuse(&self, refuse: bool) {
        self.inner.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Successful connections.
    pub fn connects(&self) -> u64 {
        self.inner.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceConnector for FakeSource {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn SourceSession>, ConnectError> {
        if self.inner.refuse.load(Ordering::SeqCst) {
            return Err(ConnectError::Unreachable(format!("{} refused", endpoint)));
        }
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct FakeSession {
    inner: Arc<SourceInner>,
}

#[async_trait]
impl SourceSession for FakeSession {
    async fn read(&self, node_id: &str) -> Result<Option<Value>, SourceError> {
        let n = self.inner.reads.fetch_add(1, Ordering::SeqCst);
        if self.inner.reset_always.load(Ordering::SeqCst) {
            return Err(SourceError::Transport("connection reset by peer".into()));
        }

        {
            let mut drop_once = self.inner.drop_once.lock();
            if drop_once.as_deref() == Some(node_id) {
                *drop_once = None;
                return Err(SourceError::Transport("connection reset by peer".into()));
            }
        }
        if self.inner.failing.lock().contains(node_id) {
            return Err(SourceError::Node {
                node: node_id.to_string(),
                reason: "BadNodeIdUnknown".into(),
            });
        }
        if self.inner.stale.lock().contains(node_id) {
            return Ok(None);
        }
        Ok(Some(Value::Float(n as f64)))
    }

    async fn close(&self) {}
}

// ============================================================================
// Sink
// ============================================================================

/// How the fake sink answers writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkMode {
    Accept,
    Retryable,
    Fatal,
}

struct SinkInner {
    mode: Mutex<SinkMode>,
    refuse: AtomicBool,
    health_hangs: AtomicBool,
    write_delay: Mutex<Duration>,
    written: Mutex<Vec<Point>>,
    attempts: AtomicU64,
    connects: AtomicU64,
}

/// Sink recording accepted points.
#[derive(Clone)]
pub struct FakeSink {
    inner: Arc<SinkInner>,
}

impl FakeSink {
    pub fn new(mode: SinkMode) -> Self {
        Self {
            inner: Arc::new(SinkInner {
                mode: Mutex::new(mode),
                refuse: AtomicBool::new(false),
                health_hangs: AtomicBool::new(false),
                write_delay: Mutex::new(Duration::ZERO),
                written: Mutex::new(Vec::new()),
                attempts: AtomicU64::new(0),
                connects: AtomicU64::new(0),
            }),
        }
    }

    /// Refuse (or accept again) connection attempts.
    pub fn set_refuse(&self, refuse: bool) {
        self.inner.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Health checks never answer.
    pub fn set_health_hangs(&self, hangs: bool) {
        self.inner.health_hangs.store(hangs, Ordering::SeqCst);
    }

    /// Every write takes `delay` before it answers.
    pub fn set_write_delay(&self, delay: Duration) {
        *self.inner.write_delay.lock() = delay;
    }

    /// Points accepted so far.
    pub fn written(&self) -> Vec<Point> {
        self.inner.written.lock().clone()
    }

    /// Write calls, successful or not.
    pub fn attempts(&self) -> u64 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// Successful connections.
    pub fn connects(&self) -> u64 {
        self.inner.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SinkConnector for FakeSink {
    async fn connect(&self) -> Result<Box<dyn SinkHandle>, ConnectError> {
        if self.inner.refuse.load(Ordering::SeqCst) {
            return Err(ConnectError::Unreachable("influx.test refused".into()));
        }
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSinkHandle {
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct FakeSinkHandle {
    inner: Arc<SinkInner>,
}

#[async_trait]
impl SinkHandle for FakeSinkHandle {
    async fn health_check(&self) -> bool {
        if self.inner.health_hangs.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        !self.inner.refuse.load(Ordering::SeqCst)
    }

    async fn write_batch(&self, points: &[Point], _precision: Precision) -> Result<(), WriteError> {
        self.inner.attempts.fetch_add(1, Ordering::SeqCst);
        let delay = *self.inner.write_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mode = *self.inner.mode.lock();
        match mode {
            SinkMode::Accept => {
                self.inner.written.lock().extend_from_slice(points);
                Ok(())
            }
            SinkMode::Retryable => Err(WriteError::Retryable("503 Service Unavailable".into())),
            SinkMode::Fatal => Err(WriteError::Fatal("401 unauthorized".into())),
        }
    }
}
