// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! InfluxDB v2 connection settings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// InfluxDB v2 connection configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfluxConfig {
    /// InfluxDB URL (e.g., "http://localhost:8086").
    pub url: String,
    /// InfluxDB organization.
    pub org: String,
    /// InfluxDB bucket.
    pub bucket: String,
    /// Authentication token.
    pub token: String,
}

impl InfluxConfig {
    /// Create a configuration from its parts.
    pub fn new(
        url: impl Into<String>,
        org: impl Into<String>,
        bucket: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            org: org.into(),
            bucket: bucket.into(),
            token: token.into(),
        }
    }

    /// Base URL without trailing slashes.
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// Endpoint used for the health probe.
    pub fn health_url(&self) -> String {
        format!("{}/health", self.base_url())
    }

    /// Endpoint used for batch writes (query parameters are added by the client).
    pub fn write_url(&self) -> String {
        format!("{}/api/v2/write", self.base_url())
    }
}

// The token never appears in logs.
impl fmt::Debug for InfluxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfluxConfig")
            .field("url", &self.url)
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .field("token", &"<redacted>")
            .finish()
    }
}
