// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Registry of polled data points.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Registry construction errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("No nodes configured")]
    Empty,

    #[error("Node {0} has an empty id")]
    EmptyId(usize),

    #[error("Duplicate node id '{0}'")]
    DuplicateId(String),
}

/// A remote data point to poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Node identifier understood by the source (e.g. `ns=3;i=5`).
    pub id: String,

    /// Label used for downstream grouping.
    #[serde(default)]
    pub tag: String,
}

impl NodeSpec {
    /// Create a node spec.
    pub fn new(id: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tag: tag.into(),
        }
    }
}

/// Immutable, cheaply cloneable set of node specs with unique ids.
///
/// Iteration follows configuration order, which is also the read order of
/// every poll cycle.
#[derive(Debug, Clone)]
pub struct NodeRegistry {
    nodes: Arc<[NodeSpec]>,
    index: Arc<HashMap<String, usize>>,
}

impl NodeRegistry {
    /// Build a registry, rejecting empty sets, empty ids and duplicates.
    pub fn new(nodes: Vec<NodeSpec>) -> Result<Self, RegistryError> {
        if nodes.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if node.id.trim().is_empty() {
                return Err(RegistryError::EmptyId(i));
            }
            if index.insert(node.id.clone(), i).is_some() {
                return Err(RegistryError::DuplicateId(node.id.clone()));
            }
        }

        Ok(Self {
            nodes: nodes.into(),
            index: Arc::new(index),
        })
    }

    /// Look up a node by id.
    pub fn get(&self, id: &str) -> Option<&NodeSpec> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Iterate in configuration order.
    pub fn iter(&self) -> std::slice::Iter<'_, NodeSpec> {
        self.nodes.iter()
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false for a constructed registry.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl<'a> IntoIterator for &'a NodeRegistry {
    type Item = &'a NodeSpec;
    type IntoIter = std::slice::Iter<'a, NodeSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
