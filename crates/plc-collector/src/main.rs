// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! PLC collector CLI
//!
//! # Usage
//!
//! ```bash
//! # Run with a configuration file
//! plc-collector --config collector.toml
//!
//! # Override the log level
//! plc-collector --config collector.toml --log-level debug
//!
//! # Generate / check a configuration
//! plc-collector gen-config --output collector.toml
//! plc-collector validate --config collector.toml
//! ```
//!
//! Exit codes: 0 clean shutdown, 1 startup failure, 2 fatal write error.

use clap::{Parser, Subcommand};
use plc_collector::{
    CollectorConfig, CollectorError, ConfigError, InfluxSink, SimulatedSource, SourceConnector,
    StatsSnapshot, Supervisor, SupervisorHandle, SupervisorState,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// PLC to InfluxDB data collector
#[derive(Parser, Debug)]
#[command(name = "plc-collector")]
#[command(about = "PLC data collector - polls industrial data points into InfluxDB")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "collector.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Some(cmd) = args.command {
        return match cmd {
            Commands::GenConfig { output } => cmd_gen_config(output),
            Commands::Validate { config } => cmd_validate(config),
        };
    }

    let Some(path) = args.config else {
        eprintln!("Missing --config (create one with `plc-collector gen-config`)");
        return ExitCode::from(1);
    };
    let config = match CollectorConfig::from_file(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            return ExitCode::from(1);
        }
    };

    // Initialize logging
    let level = args.log_level.as_deref().unwrap_or(&config.log_level);
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match run(config).await {
        Ok(stats) => {
            info!("Collector stopped");
            log_stats(&stats);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, exit_code = e.exit_code(), "Collector failed");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(config: CollectorConfig) -> Result<StatsSnapshot, CollectorError> {
    let source = build_source(&config)?;
    let sink = Arc::new(InfluxSink::new(config.sink.influx()?, config.write_timeout()));
    let stats_interval = config.stats_interval_secs;

    let supervisor = Supervisor::new(config, source, sink)?;
    let handle = supervisor.handle();

    let stats_task = (stats_interval > 0).then(|| {
        let handle = handle.clone();
        tokio::spawn(report_stats(handle, Duration::from_secs(stats_interval)))
    });

    let signal_handle = handle.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_handle.stop();
    });

    let result = supervisor.run().await;
    if let Some(task) = stats_task {
        task.abort();
    }
    result
}

#[cfg(feature = "opcua")]
const SUPPORTED_SCHEMES: &str = "sim://, opc.tcp://";
#[cfg(not(feature = "opcua"))]
const SUPPORTED_SCHEMES: &str = "sim://; build with --features opcua for opc.tcp://";

/// Protocol client for the configured endpoint.
fn build_source(config: &CollectorConfig) -> Result<Arc<dyn SourceConnector>, ConfigError> {
    let endpoint = &config.source.endpoint;
    if SimulatedSource::accepts(endpoint) {
        return Ok(Arc::new(SimulatedSource::new()));
    }
    protocol_source(config).ok_or_else(|| {
        ConfigError::Invalid(format!(
            "source.endpoint '{}': no protocol client for this scheme (supported: {})",
            endpoint, SUPPORTED_SCHEMES
        ))
    })
}

#[cfg(feature = "opcua")]
fn protocol_source(config: &CollectorConfig) -> Option<Arc<dyn SourceConnector>> {
    use plc_collector::OpcUaSource;

    if OpcUaSource::accepts(&config.source.endpoint) {
        Some(Arc::new(OpcUaSource::new(config.name.clone())))
    } else {
        None
    }
}

#[cfg(not(feature = "opcua"))]
fn protocol_source(_config: &CollectorConfig) -> Option<Arc<dyn SourceConnector>> {
    None
}

async fn report_stats(handle: SupervisorHandle, period: Duration) {
    let mut interval = tokio::time::interval(period);
    // The first tick completes immediately.
    interval.tick().await;
    loop {
        interval.tick().await;
        if handle.state() == SupervisorState::Stopped {
            break;
        }
        log_stats(&handle.stats());
    }
}

fn log_stats(stats: &StatsSnapshot) {
    info!(
        cycles = stats.cycles,
        skipped = stats.cycles_skipped,
        read = stats.samples_read,
        good = stats.samples_good,
        stale = stats.samples_stale,
        errors = stats.samples_error,
        written = stats.samples_written,
        batches = stats.batches_written,
        write_failures = stats.write_failures,
        dropped = stats.samples_dropped,
        peak_backlog = stats.peak_backlog,
        source_reconnects = stats.source_reconnects,
        sink_reconnects = stats.sink_reconnects,
        samples_per_sec = stats.samples_per_second(),
        "Collector statistics"
    );
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

fn cmd_gen_config(output: PathBuf) -> ExitCode {
    let toml_str = match toml::to_string_pretty(&CollectorConfig::example()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to serialize configuration: {}", e);
            return ExitCode::from(1);
        }
    };

    let content = format!(
        r#"# PLC Collector Configuration
# Generated by plc-collector gen-config
#
# The sink token is read from the INFLUX_TOKEN environment variable;
# set `token = "..."` under [sink] to embed it instead.

{}
"#,
        toml_str
    );

    if let Err(e) = std::fs::write(&output, content) {
        eprintln!("Failed to write {}: {}", output.display(), e);
        return ExitCode::from(1);
    }
    println!("Generated configuration file: {}", output.display());
    ExitCode::SUCCESS
}

fn cmd_validate(config_path: PathBuf) -> ExitCode {
    let config = match CollectorConfig::from_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            return ExitCode::from(1);
        }
    };
    if let Err(e) = build_source(&config) {
        eprintln!("Configuration invalid: {}", e);
        return ExitCode::from(1);
    }

    println!("Configuration valid!");
    println!();
    println!("Collector: {}", config.name);
    println!("Source:    {}", config.source.endpoint);
    println!(
        "Sink:      {} (org {}, bucket {}, measurement {})",
        config.sink.url, config.sink.org, config.sink.bucket, config.sink.measurement
    );
    println!(
        "Polling:   every {} ms, batches of {} / {} ms, {} attempts per batch",
        config.poll.interval_ms,
        config.batch.max_size,
        config.batch.max_age_ms,
        config.batch.max_retries
    );
    println!("Nodes:     {}", config.nodes.len());
    for (i, node) in config.nodes.iter().enumerate() {
        if node.tag.is_empty() {
            println!("  [{}] {}", i, node.id);
        } else {
            println!("  [{}] {} ({})", i, node.id, node.tag);
        }
    }
    ExitCode::SUCCESS
}
