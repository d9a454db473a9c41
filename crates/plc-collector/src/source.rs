// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Data source collaborator interface.
//!
//! The protocol client (an OPC UA SDK binding, a simulator, a test fake)
//! lives behind [`SourceConnector`] and [`SourceSession`], so the collector
//! never depends on a vendor encoding.

use crate::connection::ConnectError;
use crate::sample::Value;
use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

/// Endpoint scheme served by [`SimulatedSource`].
pub const SIM_SCHEME: &str = "sim://";

/// Failure reported by a source session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// This node could not be read; the session is still usable.
    #[error("Node '{node}' read failed: {reason}")]
    Node { node: String, reason: String },

    /// The session itself is gone.
    #[error("Transport failure: {0}")]
    Transport(String),
}

/// Opens sessions to a data source.
#[async_trait]
pub trait SourceConnector: Send + Sync + 'static {
    /// Establish transport and session.
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn SourceSession>, ConnectError>;
}

/// An open session to a data source.
#[async_trait]
pub trait SourceSession: Send + Sync {
    /// Read the current value of a node; `Ok(None)` when it holds no value.
    async fn read(&self, node_id: &str) -> Result<Option<Value>, SourceError>;

    /// Close the session.
    async fn close(&self);
}

// ============================================================================
// Simulated source
// ============================================================================

/// Simulated PLC: every node reports a temperature in `[20.0, 30.0]`,
/// rounded to two decimals.
#[derive(Debug, Default)]
pub struct SimulatedSource {
    seed: Option<u64>,
}

impl SimulatedSource {
    /// Simulator with a random seed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulator producing a reproducible sequence.
    pub fn with_seed(seed: u64) -> Self {
        Self { seed: Some(seed) }
    }

    /// Check whether `endpoint` targets the simulator.
    pub fn accepts(endpoint: &str) -> bool {
        endpoint.starts_with(SIM_SCHEME)
    }
}

#[async_trait]
impl SourceConnector for SimulatedSource {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn SourceSession>, ConnectError> {
        if !Self::accepts(endpoint) {
            return Err(ConnectError::Unreachable(format!(
                "simulator cannot serve '{}'",
                endpoint
            )));
        }

        let rng = match self.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        tracing::debug!(endpoint, "Simulated session opened");
        Ok(Box::new(SimulatedSession {
            rng: Mutex::new(rng),
        }))
    }
}

struct SimulatedSession {
    rng: Mutex<fastrand::Rng>,
}

#[async_trait]
impl SourceSession for SimulatedSession {
    async fn read(&self, _node_id: &str) -> Result<Option<Value>, SourceError> {
        let raw = 20.0 + self.rng.lock().f64() * 10.0;
        Ok(Some(Value::Float((raw * 100.0).round() / 100.0)))
    }

    async fn close(&self) {
        tracing::debug!("Simulated session closed");
    }
}
