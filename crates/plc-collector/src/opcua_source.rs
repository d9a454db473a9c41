// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! OPC UA source on the `async-opcua` client.
//!
//! Anonymous sessions without message security; one `Read` service call per
//! node. Built with the `opcua` feature.

use crate::connection::ConnectError;
use crate::sample::Value;
use crate::source::{SourceConnector, SourceError, SourceSession};
use async_trait::async_trait;
use opcua::client::{ClientBuilder, IdentityToken, Session};
use opcua::crypto::SecurityPolicy;
use opcua::types::{
    MessageSecurityMode, NodeId, ReadValueId, StatusCode, TimestampsToReturn, UserTokenPolicy,
    Variant,
};
use std::str::FromStr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Endpoint scheme served by [`OpcUaSource`].
pub const OPCUA_SCHEME: &str = "opc.tcp://";

/// Opens OPC UA client sessions.
#[derive(Debug, Clone)]
pub struct OpcUaSource {
    application_name: String,
}

impl OpcUaSource {
    /// Client announcing itself as `application_name`.
    pub fn new(application_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
        }
    }

    /// Check whether `endpoint` is an OPC UA TCP endpoint.
    pub fn accepts(endpoint: &str) -> bool {
        endpoint.starts_with(OPCUA_SCHEME)
    }
}

#[async_trait]
impl SourceConnector for OpcUaSource {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn SourceSession>, ConnectError> {
        let uri = format!("urn:{}", self.application_name);
        // The link owns reconnection; the client event loop must not retry.
        let mut client = ClientBuilder::new()
            .application_name(self.application_name.as_str())
            .application_uri(uri.as_str())
            .product_uri(uri.as_str())
            .trust_server_certs(true)
            .create_sample_keypair(true)
            .session_retry_limit(0)
            .client()
            .map_err(|errors| ConnectError::Unreachable(errors.join("; ")))?;

        let (session, event_loop) = client
            .connect_to_matching_endpoint(
                (
                    endpoint,
                    SecurityPolicy::None.to_str(),
                    MessageSecurityMode::None,
                    UserTokenPolicy::anonymous(),
                ),
                IdentityToken::Anonymous,
            )
            .await
            .map_err(|e| ConnectError::Unreachable(format!("{}: {}", endpoint, e)))?;

        let event_loop = event_loop.spawn();
        if !session.wait_for_connection().await {
            event_loop.abort();
            return Err(ConnectError::Unreachable(format!(
                "{}: session not established",
                endpoint
            )));
        }

        debug!(endpoint, "OPC UA session opened");
        Ok(Box::new(OpcUaSession {
            session,
            event_loop,
        }))
    }
}

struct OpcUaSession {
    session: Arc<Session>,
    event_loop: JoinHandle<StatusCode>,
}

#[async_trait]
impl SourceSession for OpcUaSession {
    async fn read(&self, node_id: &str) -> Result<Option<Value>, SourceError> {
        let node_error = |reason: String| SourceError::Node {
            node: node_id.to_string(),
            reason,
        };

        let node = NodeId::from_str(node_id)
            .map_err(|e| node_error(format!("invalid node id: {}", e)))?;
        // A failed service call means the session is unusable.
        let results = self
            .session
            .read(&[ReadValueId::from(node)], TimestampsToReturn::Neither, 0.0)
            .await
            .map_err(|status| SourceError::Transport(format!("read service failed: {}", status)))?;

        let Some(data) = results.into_iter().next() else {
            return Err(node_error("empty read response".into()));
        };
        if let Some(status) = data.status {
            if status.is_bad() {
                return Err(node_error(status.to_string()));
            }
        }
        match data.value {
            Some(variant) => value_from_variant(&variant).map_err(node_error),
            None => Ok(None),
        }
    }

    async fn close(&self) {
        if let Err(status) = self.session.disconnect().await {
            debug!(%status, "OPC UA disconnect failed");
        }
        self.event_loop.abort();
        debug!("OPC UA session closed");
    }
}

/// Map a scalar OPC UA value. `Empty` is no value; non-numeric types fail.
pub fn value_from_variant(variant: &Variant) -> Result<Option<Value>, String> {
    let value = match variant {
        Variant::Empty => return Ok(None),
        Variant::Boolean(v) => Value::Bool(*v),
        Variant::SByte(v) => Value::Int(i64::from(*v)),
        Variant::Byte(v) => Value::Int(i64::from(*v)),
        Variant::Int16(v) => Value::Int(i64::from(*v)),
        Variant::UInt16(v) => Value::Int(i64::from(*v)),
        Variant::Int32(v) => Value::Int(i64::from(*v)),
        Variant::UInt32(v) => Value::Int(i64::from(*v)),
        Variant::Int64(v) => Value::Int(*v),
        Variant::UInt64(v) => match i64::try_from(*v) {
            Ok(v) => Value::Int(v),
            Err(_) => Value::Float(*v as f64),
        },
        Variant::Float(v) => Value::Float(f64::from(*v)),
        Variant::Double(v) => Value::Float(*v),
        other => return Err(format!("unsupported value type: {:?}", other)),
    };
    Ok(Some(value))
}
