// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Async InfluxDB v2 HTTP client.
//!
//! Only the two endpoints the collector needs are used:
//! - `GET /health` must answer `{"status": "pass"}`
//! - `POST /api/v2/write?org=..&bucket=..&precision=..` with a Line Protocol body
//!
//! Failures are classified so callers can decide between retrying a batch
//! and escalating to an operator:
//!
//! | Failure                         | Class     |
//! |---------------------------------|-----------|
//! | timeout, connection refused     | retryable |
//! | 408, 429, 5xx                   | retryable |
//! | 401, 403                        | fatal (auth) |
//! | other 4xx (400, 404, 413, 422)  | fatal (schema / target) |

use crate::config::InfluxConfig;
use crate::influx::{LineProtocolWriter, Point, Precision};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Longest response body kept in error messages.
const MAX_ERROR_BODY: usize = 256;

/// InfluxDB client errors.
#[derive(Debug, Error)]
pub enum InfluxError {
    #[error("Invalid InfluxDB URL '{0}'")]
    InvalidUrl(String),

    #[error("HTTP client setup failed: {0}")]
    Client(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("InfluxDB rejected request ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("InfluxDB health check reported '{0}'")]
    Unhealthy(String),

    #[error("Point for measurement '{0}' has no fields")]
    NoFields(String),
}

impl InfluxError {
    /// Whether the same request may succeed later.
    pub fn is_retryable(&self) -> bool {
        match self {
            InfluxError::Timeout | InfluxError::Connect(_) | InfluxError::Unhealthy(_) => true,
            InfluxError::Status { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            InfluxError::InvalidUrl(_) | InfluxError::Client(_) | InfluxError::NoFields(_) => {
                false
            }
        }
    }

    /// Whether the server refused the credentials.
    pub fn is_auth(&self) -> bool {
        matches!(self, InfluxError::Status { status: 401 | 403, .. })
    }
}

impl From<reqwest::Error> for InfluxError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            InfluxError::Timeout
        } else if e.is_builder() {
            InfluxError::Client(e.to_string())
        } else {
            InfluxError::Connect(e.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

/// Async InfluxDB v2 client bound to one org/bucket.
#[derive(Debug, Clone)]
pub struct InfluxClient {
    http: reqwest::Client,
    config: InfluxConfig,
}

impl InfluxClient {
    /// Build a client without contacting the server.
    ///
    /// `timeout` bounds every request issued by this client.
    pub fn new(config: InfluxConfig, timeout: Duration) -> Result<Self, InfluxError> {
        let url = Url::parse(&config.url)
            .map_err(|_| InfluxError::InvalidUrl(config.url.clone()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(InfluxError::InvalidUrl(config.url.clone()));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| InfluxError::Client(e.to_string()))?;

        Ok(Self { http, config })
    }

    /// Build a client and verify the server reports itself healthy.
    pub async fn connect(config: InfluxConfig, timeout: Duration) -> Result<Self, InfluxError> {
        let client = Self::new(config, timeout)?;
        client.check_health().await?;
        tracing::debug!(url = %client.config.url, "InfluxDB health check passed");
        Ok(client)
    }

    /// Query `/health`, failing unless the server answers `"pass"`.
    pub async fn check_health(&self) -> Result<(), InfluxError> {
        let response = self.http.get(self.config.health_url()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, response).await);
        }

        let health: HealthResponse = response.json().await?;
        if health.status == "pass" {
            Ok(())
        } else {
            Err(InfluxError::Unhealthy(
                health.message.unwrap_or(health.status),
            ))
        }
    }

    /// `true` when [`check_health`](Self::check_health) succeeds.
    pub async fn health(&self) -> bool {
        match self.check_health().await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(url = %self.config.url, error = %e, "InfluxDB health check failed");
                false
            }
        }
    }

    /// Encode and write a batch of points in a single request.
    pub async fn write(&self, points: &[Point], precision: Precision) -> Result<(), InfluxError> {
        if points.is_empty() {
            return Ok(());
        }
        let mut writer = LineProtocolWriter::new(precision);
        writer.write_points(points)?;
        self.write_lines(writer.flush_body(), precision).await
    }

    /// Write an already encoded Line Protocol body.
    pub async fn write_lines(&self, body: String, precision: Precision) -> Result<(), InfluxError> {
        let response = self
            .http
            .post(self.config.write_url())
            .query(&[
                ("org", self.config.org.as_str()),
                ("bucket", self.config.bucket.as_str()),
                ("precision", precision.as_str()),
            ])
            .header(AUTHORIZATION, format!("Token {}", self.config.token))
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(status_error(status, response).await)
        }
    }
}

async fn status_error(status: StatusCode, response: reqwest::Response) -> InfluxError {
    let mut message = response.text().await.unwrap_or_default();
    if message.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        message.truncate(end);
    }
    InfluxError::Status {
        status: status.as_u16(),
        message,
    }
}
