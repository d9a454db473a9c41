// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Collector Supervisor: wiring and the run loop.
//!
//! ```text
//!   Starting --> Running --(shutdown or fatal write)--> Draining --> Stopped
//! ```
//!
//! `Running` polls the source on every tick, batches samples and writes
//! pending batches while the sink is ready. Source and sink reconnect on
//! their own tasks; a tick with no source session is skipped and the
//! scheduler keeps going. `Draining` makes one final flush bounded by the
//! drain timeout, then every batch still pending is reported dropped.
//! `Stopped` releases both connections.

use crate::buffer::{BatchBuffer, DropReason, DroppedBatch, PendingBatch, RetryQueue};
use crate::config::{CollectorConfig, ConfigError};
use crate::mapping::PointMapper;
use crate::node::NodeRegistry;
use crate::sample::Batch;
use crate::scheduler::PollScheduler;
use crate::session::{ReadError, SessionManager};
use crate::shutdown::Shutdown;
use crate::sink::{Rejected, SinkConnector, SinkWriter, WriteError};
use crate::source::SourceConnector;
use crate::stats::{CollectorStats, StatsSnapshot};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Poll period of the drain loop while the sink reconnects.
const DRAIN_RETRY_PERIOD: Duration = Duration::from_millis(50);

/// Supervisor lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SupervisorState {
    /// Components created, connections not yet attempted.
    Starting,
    /// Poll/batch/write cycle active.
    Running,
    /// Ticks stopped, final flush in progress.
    Draining,
    /// Terminal; connections released.
    Stopped,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SupervisorState::Starting => "Starting",
            SupervisorState::Running => "Running",
            SupervisorState::Draining => "Draining",
            SupervisorState::Stopped => "Stopped",
        };
        write!(f, "{}", s)
    }
}

/// Process-level failures.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Unrecoverable write failure: {0}")]
    Fatal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CollectorError {
    /// Process exit code: 1 for startup failures, 2 for runtime faults.
    pub fn exit_code(&self) -> u8 {
        match self {
            CollectorError::Config(_) | CollectorError::Io(_) => 1,
            CollectorError::Fatal(_) => 2,
        }
    }
}

/// Control handle of a running supervisor.
#[derive(Clone)]
pub struct SupervisorHandle {
    shutdown: Shutdown,
    state: watch::Receiver<SupervisorState>,
    stats: Arc<CollectorStats>,
}

impl SupervisorHandle {
    /// Request a graceful shutdown.
    pub fn stop(&self) {
        self.shutdown.trigger();
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    /// Wait until `target` is reached (or `Stopped`); `true` if `target` was reached.
    pub async fn wait_for(&self, target: SupervisorState) -> bool {
        let mut rx = self.state.clone();
        let reached = rx
            .wait_for(|s| *s == target || *s == SupervisorState::Stopped)
            .await
            .map(|state| *state == target);
        reached.unwrap_or_else(|_| *self.state.borrow() == target)
    }

    /// Statistics snapshot.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

/// Owns both connections, the batch buffer and the run loop.
pub struct Supervisor {
    config: CollectorConfig,
    nodes: NodeRegistry,
    session: SessionManager,
    writer: SinkWriter,
    shutdown: Shutdown,
    state: watch::Sender<SupervisorState>,
    stats: Arc<CollectorStats>,
}

impl Supervisor {
    /// Validate the configuration and build the components around the given
    /// collaborators. Nothing connects before [`run`](Self::run).
    pub fn new(
        config: CollectorConfig,
        source: Arc<dyn SourceConnector>,
        sink: Arc<dyn SinkConnector>,
    ) -> Result<Self, CollectorError> {
        config.validate()?;
        let nodes = config.registry()?;

        let session = SessionManager::new(
            source,
            config.source.endpoint.clone(),
            config.source_link(),
            config.read_timeout(),
        );
        let writer = SinkWriter::new(
            sink,
            config.sink_link(),
            PointMapper::new(config.sink.measurement.clone()),
            nodes.clone(),
            config.sink.precision,
            config.write_timeout(),
        );
        let (state, _) = watch::channel(SupervisorState::Starting);

        Ok(Self {
            config,
            nodes,
            session,
            writer,
            shutdown: Shutdown::new(),
            state,
            stats: Arc::new(CollectorStats::new()),
        })
    }

    /// Handle to stop and observe the supervisor.
    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            shutdown: self.shutdown.clone(),
            state: self.state.subscribe(),
            stats: Arc::clone(&self.stats),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    fn set_state(&self, to: SupervisorState) {
        let from = self.state();
        if from == to {
            return;
        }
        self.state.send_replace(to);
        info!(%from, %to, "Supervisor state changed");
    }

    /// Run until shutdown or a fatal write error.
    ///
    /// Returns the final statistics on a clean stop, or
    /// [`CollectorError::Fatal`] once the fatal error has been reported and
    /// both connections released.
    pub async fn run(self) -> Result<StatsSnapshot, CollectorError> {
        info!(
            name = %self.config.name,
            nodes = self.nodes.len(),
            source = %self.config.source.endpoint,
            sink = %self.config.sink.url,
            "Collector starting"
        );

        let source_task = self.session.spawn_reconnect();
        let sink_task = self.writer.spawn_reconnect();
        self.set_state(SupervisorState::Running);

        let mut buffer = BatchBuffer::new(self.config.batch.max_size, self.config.max_batch_age());
        let mut pending = RetryQueue::new(self.config.batch.max_pending, self.config.batch.max_retries);
        let mut scheduler = PollScheduler::new(self.config.poll_interval(), self.shutdown.clone());
        let mut fatal: Option<String> = None;

        while let Some(tick) = scheduler.next_tick().await {
            debug!(seq = tick.seq, "Poll tick");
            self.poll_once(&mut buffer, &mut pending).await;

            if let Err(reason) = self.write_pending(&mut pending, None).await {
                error!(reason = %reason, "Fatal write error, stopping collector");
                fatal = Some(reason);
                self.shutdown.trigger();
                break;
            }

            self.stats
                .observe_backlog(buffer.len() + pending.pending_samples());
            self.stats
                .set_reconnects(self.session.reconnects(), self.writer.reconnects());
        }

        self.set_state(SupervisorState::Draining);
        if !buffer.is_empty() {
            self.enqueue(buffer.drain(), &mut pending);
        }

        if fatal.is_none() && !pending.is_empty() {
            let timeout = self.config.drain_timeout();
            match self.flush_all(&mut pending, Instant::now() + timeout).await {
                Ok(true) => info!("Final flush complete"),
                Ok(false) => warn!(
                    batches = pending.len(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Drain timeout expired"
                ),
                Err(reason) => {
                    error!(reason = %reason, "Fatal write error during final flush");
                    fatal = Some(reason);
                }
            }
        }

        let reason = if fatal.is_some() {
            DropReason::Fatal
        } else {
            DropReason::Shutdown
        };
        for entry in pending.drain_all() {
            self.report_drop(DroppedBatch {
                samples: entry.batch.len(),
                attempts: entry.attempts,
                reason,
            });
        }

        self.session.disconnect().await;
        self.writer.disconnect().await;
        for (link, task) in [("source", source_task), ("sink", sink_task)] {
            if let Err(e) = task.await {
                warn!(link, error = %e, "Reconnect task ended abnormally");
            }
        }
        self.stats
            .set_reconnects(self.session.reconnects(), self.writer.reconnects());
        self.set_state(SupervisorState::Stopped);

        match fatal {
            Some(reason) => Err(CollectorError::Fatal(reason)),
            None => Ok(self.stats.snapshot()),
        }
    }

    /// Read every node and batch the samples.
    async fn poll_once(&self, buffer: &mut BatchBuffer, pending: &mut RetryQueue) {
        match self.session.read_all(&self.nodes).await {
            Ok(samples) => {
                self.stats.record_cycle(&samples);
                for sample in samples {
                    buffer.add(sample);
                    if buffer.len() >= buffer.max_size() {
                        self.enqueue(buffer.drain(), pending);
                    }
                }
            }
            Err(ReadError::NotReady(state)) => {
                self.stats.record_skipped();
                debug!(%state, "Source not ready, cycle skipped");
            }
        }

        if buffer.should_flush() {
            self.enqueue(buffer.drain(), pending);
        }
    }

    fn enqueue(&self, batch: Batch, pending: &mut RetryQueue) {
        if let Some(dropped) = pending.push(batch) {
            self.report_drop(dropped);
        }
    }

    fn report_drop(&self, dropped: DroppedBatch) {
        error!(
            count = dropped.samples,
            reason = %dropped.reason,
            attempts = dropped.attempts,
            "Batch dropped"
        );
        self.stats.record_dropped(&dropped);
    }

    /// Write queued batches, oldest first, while the sink is ready.
    ///
    /// Stops at the first failure or at `deadline`; a write still running at
    /// the deadline is cut short and its batch requeued. `Err` carries the
    /// reason of a fatal error.
    async fn write_pending(
        &self,
        pending: &mut RetryQueue,
        deadline: Option<Instant>,
    ) -> Result<(), String> {
        while self.writer.is_ready() {
            let limit = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        break;
                    }
                    remaining
                }
                None => Duration::MAX,
            };
            let Some(PendingBatch { batch, attempts }) = pending.pop_front() else {
                break;
            };
            let samples = batch.len();

            match self.writer.write_within(batch, limit).await {
                Ok(()) => self.stats.record_written(samples),
                Err(Rejected { batch, error }) => {
                    let entry = PendingBatch { batch, attempts };
                    match error {
                        WriteError::NotReady(_) => {
                            pending.restore(entry);
                            break;
                        }
                        WriteError::Retryable(reason) => {
                            self.stats.record_write_failure();
                            warn!(
                                samples,
                                attempt = attempts + 1,
                                reason = %reason,
                                "Batch write failed"
                            );
                            if let Some(dropped) = pending.requeue(entry) {
                                self.report_drop(dropped);
                            }
                            break;
                        }
                        WriteError::Fatal(reason) => {
                            self.stats.record_write_failure();
                            self.report_drop(DroppedBatch {
                                samples,
                                attempts: attempts + 1,
                                reason: DropReason::Fatal,
                            });
                            return Err(reason);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Write everything pending before `deadline`, waiting for the sink as
    /// needed. `Ok(false)` if the deadline passed with batches left.
    async fn flush_all(&self, pending: &mut RetryQueue, deadline: Instant) -> Result<bool, String> {
        while !pending.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            if self.writer.is_ready() {
                self.write_pending(pending, Some(deadline)).await?;
            } else {
                tokio::time::sleep_until(deadline.min(now + DRAIN_RETRY_PERIOD)).await;
            }
        }
        Ok(true)
    }
}
