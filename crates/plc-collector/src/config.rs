// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Collector configuration.
//!
//! Loaded from TOML, validated once at startup. Every invalid setting is a
//! startup failure; nothing is re-read at runtime.

use crate::backoff::Backoff;
use crate::connection::LinkOptions;
use crate::node::{NodeRegistry, NodeSpec};
use plc_influx::{InfluxConfig, Precision};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Collector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Collector name (for identification).
    #[serde(default = "default_name")]
    pub name: String,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Statistics reporting interval (seconds, 0 disables).
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,

    /// Data source connection.
    #[serde(default)]
    pub source: SourceConfig,

    /// Time-series sink connection.
    #[serde(default)]
    pub sink: SinkConfig,

    /// Poll timing.
    #[serde(default)]
    pub poll: PollConfig,

    /// Batching and retry limits.
    #[serde(default)]
    pub batch: BatchConfig,

    /// Reconnect backoff.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Shutdown behaviour.
    #[serde(default)]
    pub shutdown: ShutdownConfig,

    /// Nodes to poll.
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
}

fn default_name() -> String {
    "plc-collector".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_stats_interval() -> u64 {
    10
}

/// Data source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Source endpoint URL (`scheme://...`).
    #[serde(default)]
    pub endpoint: String,

    /// Connection attempt timeout (ms).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Single node read timeout (ms).
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_read_timeout_ms() -> u64 {
    1000
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

/// InfluxDB sink settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Server URL (`http://` or `https://`).
    #[serde(default)]
    pub url: String,

    /// Organization.
    #[serde(default)]
    pub org: String,

    /// Bucket.
    #[serde(default)]
    pub bucket: String,

    /// API token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Environment variable holding the API token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,

    /// Measurement written.
    #[serde(default = "default_measurement")]
    pub measurement: String,

    /// Timestamp precision.
    #[serde(default)]
    pub precision: Precision,

    /// Connection (health check) timeout (ms).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Batch write timeout (ms).
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// Health probe period while connected (seconds, 0 disables).
    #[serde(default = "default_health_interval")]
    pub health_check_interval_secs: u64,
}

fn default_measurement() -> String {
    crate::mapping::DEFAULT_MEASUREMENT.to_string()
}

fn default_write_timeout_ms() -> u64 {
    5000
}

fn default_health_interval() -> u64 {
    10
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            org: String::new(),
            bucket: String::new(),
            token: None,
            token_env: None,
            measurement: default_measurement(),
            precision: Precision::default(),
            connect_timeout_ms: default_connect_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            health_check_interval_secs: default_health_interval(),
        }
    }
}

impl fmt::Debug for SinkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkConfig")
            .field("url", &self.url)
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("token_env", &self.token_env)
            .field("measurement", &self.measurement)
            .field("precision", &self.precision)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("write_timeout_ms", &self.write_timeout_ms)
            .field("health_check_interval_secs", &self.health_check_interval_secs)
            .finish()
    }
}

impl SinkConfig {
    /// Fill `token` from `token_env` when no literal token is given.
    pub fn resolve_token(&mut self) -> Result<(), ConfigError> {
        if self.token.as_deref().is_some_and(|t| !t.is_empty()) {
            return Ok(());
        }
        if let Some(var) = &self.token_env {
            let value = std::env::var(var).map_err(|_| {
                ConfigError::Invalid(format!("sink.token_env: variable '{}' is not set", var))
            })?;
            self.token = Some(value);
        }
        Ok(())
    }

    /// InfluxDB connection settings.
    pub fn influx(&self) -> Result<InfluxConfig, ConfigError> {
        let token = self
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ConfigError::Invalid("sink.token is required".into()))?;
        Ok(InfluxConfig::new(&self.url, &self.org, &self.bucket, token))
    }
}

/// Poll timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Read cycle period (ms).
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Batching and retry limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Samples per batch before a flush.
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    /// Age of the oldest sample before a flush (ms).
    #[serde(default = "default_max_age_ms")]
    pub max_age_ms: u64,

    /// Write attempts per batch before it is dropped.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Unwritten batches kept before the oldest is dropped.
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
}

fn default_max_size() -> usize {
    500
}

fn default_max_age_ms() -> u64 {
    1000
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_pending() -> usize {
    64
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            max_age_ms: default_max_age_ms(),
            max_retries: default_max_retries(),
            max_pending: default_max_pending(),
        }
    }
}

/// Reconnect backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Delay after the first failure (ms).
    #[serde(default = "default_base_ms")]
    pub base_ms: u64,

    /// Delay cap (ms).
    #[serde(default = "default_max_ms")]
    pub max_ms: u64,

    /// Jitter factor (0.0 - 1.0).
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_base_ms() -> u64 {
    1000
}

fn default_max_ms() -> u64 {
    30_000
}

fn default_jitter() -> f64 {
    0.2
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_ms: default_base_ms(),
            max_ms: default_max_ms(),
            jitter: default_jitter(),
        }
    }
}

impl ReconnectConfig {
    /// Backoff policy.
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.base_ms),
            Duration::from_millis(self.max_ms),
        )
        .with_jitter(self.jitter)
    }
}

/// Shutdown behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// Upper bound of the final flush (ms).
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

fn default_drain_timeout_ms() -> u64 {
    5000
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            stats_interval_secs: default_stats_interval(),
            source: SourceConfig::default(),
            sink: SinkConfig::default(),
            poll: PollConfig::default(),
            batch: BatchConfig::default(),
            reconnect: ReconnectConfig::default(),
            shutdown: ShutdownConfig::default(),
            nodes: Vec::new(),
        }
    }
}

impl CollectorConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse, resolve the sink token and validate.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content)?;
        config.sink.resolve_token()?;
        config.validate()?;
        Ok(config)
    }

    /// Example configuration, as written by `gen-config`.
    pub fn example() -> Self {
        let nodes = (5..=9)
            .map(|i| NodeSpec::new(format!("ns=3;i={}", i), format!("sensor-{}", i - 4)))
            .collect();

        Self {
            source: SourceConfig {
                endpoint: "sim://simulated-plc".to_string(),
                ..Default::default()
            },
            sink: SinkConfig {
                url: "http://localhost:8086".to_string(),
                org: "plant".to_string(),
                bucket: "machine_status".to_string(),
                token_env: Some("INFLUX_TOKEN".to_string()),
                ..Default::default()
            },
            nodes,
            ..Default::default()
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.registry()?;

        let endpoint = self.source.endpoint.trim();
        if endpoint.is_empty() {
            return Err(ConfigError::Invalid("source.endpoint is required".into()));
        }
        match endpoint.split_once("://") {
            Some((scheme, _)) if !scheme.is_empty() => {}
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "source.endpoint '{}' has no scheme",
                    endpoint
                )))
            }
        }

        if !(self.sink.url.starts_with("http://") || self.sink.url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "sink.url '{}' must be an http(s) URL",
                self.sink.url
            )));
        }
        if self.sink.org.trim().is_empty() {
            return Err(ConfigError::Invalid("sink.org is required".into()));
        }
        if self.sink.bucket.trim().is_empty() {
            return Err(ConfigError::Invalid("sink.bucket is required".into()));
        }
        if self.sink.measurement.trim().is_empty() {
            return Err(ConfigError::Invalid("sink.measurement is required".into()));
        }
        self.sink.influx()?;

        let positive = [
            ("source.connect_timeout_ms", self.source.connect_timeout_ms),
            ("source.read_timeout_ms", self.source.read_timeout_ms),
            ("sink.connect_timeout_ms", self.sink.connect_timeout_ms),
            ("sink.write_timeout_ms", self.sink.write_timeout_ms),
            ("poll.interval_ms", self.poll.interval_ms),
            ("batch.max_size", self.batch.max_size as u64),
            ("batch.max_age_ms", self.batch.max_age_ms),
            ("batch.max_retries", u64::from(self.batch.max_retries)),
            ("batch.max_pending", self.batch.max_pending as u64),
            ("reconnect.base_ms", self.reconnect.base_ms),
            ("reconnect.max_ms", self.reconnect.max_ms),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be greater than 0", key)));
            }
        }

        if !(0.0..=1.0).contains(&self.reconnect.jitter) {
            return Err(ConfigError::Invalid(format!(
                "reconnect.jitter {} must be within [0, 1]",
                self.reconnect.jitter
            )));
        }
        if self.reconnect.base_ms > self.reconnect.max_ms {
            return Err(ConfigError::Invalid(format!(
                "reconnect.base_ms ({}) exceeds reconnect.max_ms ({})",
                self.reconnect.base_ms, self.reconnect.max_ms
            )));
        }

        Ok(())
    }

    /// Node registry built from `nodes`.
    pub fn registry(&self) -> Result<NodeRegistry, ConfigError> {
        NodeRegistry::new(self.nodes.clone())
            .map_err(|e| ConfigError::Invalid(format!("nodes: {}", e)))
    }

    /// Source link timing.
    pub fn source_link(&self) -> LinkOptions {
        LinkOptions {
            connect_timeout: Duration::from_millis(self.source.connect_timeout_ms),
            backoff: self.reconnect.backoff(),
            probe_interval: None,
        }
    }

    /// Sink link timing; probes health while connected.
    pub fn sink_link(&self) -> LinkOptions {
        let probe = self.sink.health_check_interval_secs;
        LinkOptions {
            connect_timeout: Duration::from_millis(self.sink.connect_timeout_ms),
            backoff: self.reconnect.backoff(),
            probe_interval: (probe > 0).then(|| Duration::from_secs(probe)),
        }
    }

    /// Source read timeout.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.source.read_timeout_ms)
    }

    /// Sink write timeout.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.sink.write_timeout_ms)
    }

    /// Poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll.interval_ms)
    }

    /// Maximum batch age.
    pub fn max_batch_age(&self) -> Duration {
        Duration::from_millis(self.batch.max_age_ms)
    }

    /// Final flush bound.
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown.drain_timeout_ms)
    }
}
