// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Session Manager: the connection to the data source.

use crate::connection::{ConnectError, ConnectionState, Connector, Link, LinkOptions};
use crate::node::NodeRegistry;
use crate::sample::{Quality, Sample};
use crate::source::{SourceConnector, SourceError, SourceSession};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::warn;

/// Reading is impossible right now.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ReadError {
    #[error("Source session not ready ({0})")]
    NotReady(ConnectionState),
}

/// [`Connector`] opening source sessions on one endpoint.
pub struct SourceLink {
    source: Arc<dyn SourceConnector>,
    endpoint: String,
}

#[async_trait]
impl Connector for SourceLink {
    type Handle = dyn SourceSession;

    async fn connect(&self) -> Result<Arc<dyn SourceSession>, ConnectError> {
        let session = self.source.connect(&self.endpoint).await?;
        Ok(Arc::from(session))
    }

    async fn close(&self, handle: Arc<dyn SourceSession>) {
        handle.close().await;
    }
}

/// Owns the source connection and reads node values in `Ready` state.
pub struct SessionManager {
    link: Arc<Link<SourceLink>>,
    read_timeout: Duration,
}

impl SessionManager {
    /// Create a manager for `endpoint`. Nothing is connected yet.
    pub fn new(
        source: Arc<dyn SourceConnector>,
        endpoint: impl Into<String>,
        options: LinkOptions,
        read_timeout: Duration,
    ) -> Self {
        let connector = SourceLink {
            source,
            endpoint: endpoint.into(),
        };
        Self {
            link: Arc::new(Link::new("source", connector, options)),
            read_timeout,
        }
    }

    /// Establish transport and session before the reconnect task starts.
    pub async fn connect(&self) -> Result<(), ConnectError> {
        self.link.connect().await
    }

    /// `true` while the session is `Ready`.
    pub fn health_check(&self) -> bool {
        self.link.is_ready()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.link.state()
    }

    /// Successful reconnections since start.
    pub fn reconnects(&self) -> u64 {
        self.link.reconnects()
    }

    /// Start the reconnect task for this session.
    pub fn spawn_reconnect(&self) -> JoinHandle<()> {
        self.link.spawn_reconnect()
    }

    /// Stop reconnecting and close the session.
    pub async fn disconnect(&self) {
        self.link.disconnect().await;
    }

    /// Read every node once, in registry order.
    ///
    /// A node failure yields an `Error` sample for that node only. A lost
    /// session or a read timeout aborts the cycle: the remaining nodes get
    /// `Error` samples and the session is marked `Degraded`. Any answer from
    /// the server confirms the session, which resets the reconnect backoff.
    pub async fn read_all(&self, nodes: &NodeRegistry) -> Result<Vec<Sample>, ReadError> {
        let Some(session) = self.link.handle() else {
            return Err(ReadError::NotReady(self.link.state()));
        };

        let mut samples = Vec::with_capacity(nodes.len());
        let mut lost: Option<String> = None;
        let mut answered = false;
        let mut skipped = 0usize;

        for node in nodes {
            if lost.is_some() {
                samples.push(Sample::error(&node.id));
                skipped += 1;
                continue;
            }

            match tokio::time::timeout(self.read_timeout, session.read(&node.id)).await {
                Ok(Ok(Some(value))) => {
                    answered = true;
                    let sample = Sample::good(&node.id, value);
                    if sample.quality == Quality::Error {
                        warn!(node = %node.id, ?value, "Node returned a non-finite value");
                    }
                    samples.push(sample);
                }
                Ok(Ok(None)) => {
                    answered = true;
                    warn!(node = %node.id, "Node returned no value");
                    samples.push(Sample::stale(&node.id));
                }
                Ok(Err(SourceError::Node { reason, .. })) => {
                    answered = true;
                    warn!(node = %node.id, error = %reason, "Node read failed");
                    samples.push(Sample::error(&node.id));
                }
                Ok(Err(SourceError::Transport(reason))) => {
                    samples.push(Sample::error(&node.id));
                    lost = Some(reason);
                }
                Err(_) => {
                    samples.push(Sample::error(&node.id));
                    lost = Some(format!(
                        "read of '{}' timed out after {:?}",
                        node.id, self.read_timeout
                    ));
                }
            }
        }

        if answered {
            self.link.confirm();
        }
        if let Some(reason) = lost {
            warn!(skipped, reason = %reason, "Read cycle aborted");
            self.link.degrade(&reason);
        }

        Ok(samples)
    }
}
