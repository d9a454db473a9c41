// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection state machine shared by the source session and the sink.
//!
//! A [`Link`] owns one connection to a collaborator. Its reconnect task is the
//! only writer of `Connecting` and `Ready`; the main loop reads the state
//! before doing I/O and may only mark the link `Degraded`.
//!
//! # State Machine
//!
//! ```text
//!      +--------------+
//!      | Disconnected |<-----------------------+
//!      +------+-------+                        |
//!             | reconnect task                 | connect failed
//!             v                                | (backoff, retry)
//!      +--------------+                        |
//!      |  Connecting  |------------------------+
//!      +------+-------+
//!             | connected
//!             v
//!      +--------------+   read/write failure,
//!      |    Ready     |-- timeout, failed probe --> Degraded
//!      +--------------+                              |
//!             ^                                      | reconnect task
//!             +------------ Connecting <-------------+
//! ```
//!
//! `disconnect()` moves any state to `Disconnected` and stops the task.
//!
//! The backoff counter only restarts once a connection has proven usable
//! (see [`Link::confirm`]). A peer that accepts connections and then fails
//! every operation is reconnected on the backoff schedule, not on every
//! failure.

use crate::backoff::Backoff;
use crate::shutdown::Shutdown;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// ============================================================================
// Connection State
// ============================================================================

/// Connection state of a link.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection, no attempt in progress
    #[default]
    Disconnected,

    /// Connection attempt in progress (time-bounded)
    Connecting,

    /// Connected; reads/writes allowed
    Ready,

    /// Operation failed; reconnect pending
    Degraded,
}

impl ConnectionState {
    /// Check if I/O may be attempted.
    pub fn is_ready(&self) -> bool {
        matches!(self, ConnectionState::Ready)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Ready => "Ready",
            ConnectionState::Degraded => "Degraded",
        };
        write!(f, "{}", s)
    }
}

/// Connection attempt failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("Connect timed out after {0:?}")]
    Timeout(Duration),

    #[error("Authentication refused: {0}")]
    AuthRefused(String),

    #[error("Endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("Link is driven by its reconnect task")]
    Supervised,
}

// ============================================================================
// Connector
// ============================================================================

/// Establishes and releases connections for a [`Link`].
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Live connection handed to callers while the link is `Ready`.
    type Handle: ?Sized + Send + Sync + 'static;

    /// Open a new connection.
    async fn connect(&self) -> Result<Arc<Self::Handle>, ConnectError>;

    /// Periodic liveness check while `Ready`.
    async fn probe(&self, _handle: &Self::Handle) -> bool {
        true
    }

    /// Release a connection.
    async fn close(&self, handle: Arc<Self::Handle>);
}

/// Timing of a link.
#[derive(Debug, Clone, Copy)]
pub struct LinkOptions {
    /// Upper bound of one connection attempt.
    pub connect_timeout: Duration,
    /// Delay policy between failed attempts.
    pub backoff: Backoff,
    /// Probe period while `Ready` (`None` disables probing).
    pub probe_interval: Option<Duration>,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            backoff: Backoff::default(),
            probe_interval: None,
        }
    }
}

// ============================================================================
// Link
// ============================================================================

struct LinkInner<H: ?Sized> {
    state: ConnectionState,
    handle: Option<Arc<H>>,
    failures: u32,
    confirmed: bool,
    connects: u64,
}

/// One supervised connection with its reconnect loop.
pub struct Link<C: Connector> {
    name: &'static str,
    connector: C,
    options: LinkOptions,
    inner: Mutex<LinkInner<C::Handle>>,
    wake: Notify,
    stop: Shutdown,
    supervised: AtomicBool,
}

impl<C: Connector> Link<C> {
    /// Create a disconnected link. `name` identifies it in status events.
    pub fn new(name: &'static str, connector: C, options: LinkOptions) -> Self {
        Self {
            name,
            connector,
            options,
            inner: Mutex::new(LinkInner {
                state: ConnectionState::Disconnected,
                handle: None,
                failures: 0,
                confirmed: false,
                connects: 0,
            }),
            wake: Notify::new(),
            stop: Shutdown::new(),
            supervised: AtomicBool::new(false),
        }
    }

    /// Name used in status events.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The underlying connector.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Check if the link is `Ready`.
    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    /// Failures since the link last proved usable: failed attempts, and
    /// degrades of connections that never completed an operation.
    pub fn failures(&self) -> u32 {
        self.inner.lock().failures
    }

    /// Successful connections after the first one.
    pub fn reconnects(&self) -> u64 {
        self.inner.lock().connects.saturating_sub(1)
    }

    /// Live handle, only while `Ready`.
    pub fn handle(&self) -> Option<Arc<C::Handle>> {
        let inner = self.inner.lock();
        if inner.state.is_ready() {
            inner.handle.clone()
        } else {
            None
        }
    }

    fn transition(&self, inner: &mut LinkInner<C::Handle>, to: ConnectionState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        if to == ConnectionState::Degraded {
            warn!(link = self.name, %from, %to, "Connection state changed");
        } else {
            info!(link = self.name, %from, %to, "Connection state changed");
        }
    }

    /// Run one bounded connection attempt before the reconnect task starts.
    ///
    /// Once [`run_reconnect`](Self::run_reconnect) runs it is the only writer
    /// of `Connecting` and `Ready`, and this fails with
    /// [`ConnectError::Supervised`].
    pub async fn connect(&self) -> Result<(), ConnectError> {
        if self.supervised.load(Ordering::SeqCst) {
            return Err(ConnectError::Supervised);
        }
        self.attempt().await
    }

    /// Success moves the link to `Ready`; failure to `Disconnected` with the
    /// failure counted for backoff.
    async fn attempt(&self) -> Result<(), ConnectError> {
        let previous = {
            let mut inner = self.inner.lock();
            self.transition(&mut inner, ConnectionState::Connecting);
            inner.handle.take()
        };
        if let Some(old) = previous {
            self.connector.close(old).await;
        }

        let timeout = self.options.connect_timeout;
        let result = match tokio::time::timeout(timeout, self.connector.connect()).await {
            Ok(result) => result,
            Err(_) => Err(ConnectError::Timeout(timeout)),
        };

        match result {
            Ok(handle) => {
                // Checked under the lock `disconnect` takes, so a stopped link
                // never ends up holding a handle.
                let refused = {
                    let mut inner = self.inner.lock();
                    if self.stop.is_triggered() {
                        self.transition(&mut inner, ConnectionState::Disconnected);
                        Some(handle)
                    } else {
                        inner.handle = Some(handle);
                        inner.confirmed = false;
                        inner.connects += 1;
                        self.transition(&mut inner, ConnectionState::Ready);
                        None
                    }
                };
                match refused {
                    Some(handle) => {
                        self.connector.close(handle).await;
                        Err(ConnectError::Unreachable(format!("{} link closed", self.name)))
                    }
                    None => Ok(()),
                }
            }
            Err(e) => {
                let mut inner = self.inner.lock();
                inner.failures = inner.failures.saturating_add(1);
                self.transition(&mut inner, ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Record a successful operation on the live connection.
    ///
    /// Resets the backoff; no-op unless `Ready`.
    pub fn confirm(&self) {
        let mut inner = self.inner.lock();
        if inner.state.is_ready() {
            inner.confirmed = true;
            inner.failures = 0;
        }
    }

    /// Mark a `Ready` link `Degraded` and wake the reconnect task.
    ///
    /// No-op in any other state.
    pub fn degrade(&self, reason: &str) {
        {
            let mut inner = self.inner.lock();
            if !inner.state.is_ready() {
                return;
            }
            if !inner.confirmed {
                inner.failures = inner.failures.saturating_add(1);
            }
            warn!(link = self.name, reason, "Connection degraded");
            self.transition(&mut inner, ConnectionState::Degraded);
        }
        self.wake.notify_one();
    }

    /// Reconnect loop: connect, back off on failure, park while `Ready`.
    ///
    /// Runs until [`disconnect`](Self::disconnect).
    pub async fn run_reconnect(self: Arc<Self>) {
        self.supervised.store(true, Ordering::SeqCst);
        loop {
            if self.stop.is_triggered() {
                break;
            }

            if self.is_ready() {
                tokio::select! {
                    _ = self.stop.wait() => break,
                    _ = self.wake.notified() => {}
                    _ = probe_timer(self.options.probe_interval) => {
                        let Some(handle) = self.handle() else {
                            continue;
                        };
                        let limit = self.options.connect_timeout;
                        tokio::select! {
                            _ = self.stop.wait() => break,
                            healthy = tokio::time::timeout(limit, self.connector.probe(&handle)) => {
                                match healthy {
                                    Ok(true) => self.confirm(),
                                    Ok(false) => self.degrade("health check failed"),
                                    Err(_) => self.degrade("health check timed out"),
                                }
                            }
                        }
                    }
                }

                let failures = self.failures();
                if !self.is_ready()
                    && failures > 0
                    && !self.pause(failures, "connection failed before any successful operation").await
                {
                    break;
                }
                continue;
            }

            if let Err(e) = self.attempt().await {
                if self.stop.is_triggered() || !self.pause(self.failures(), &e.to_string()).await {
                    break;
                }
            }
        }
        debug!(link = self.name, "Reconnect task stopped");
    }

    /// Wait out the backoff for `attempt`; `false` if stopped meanwhile.
    async fn pause(&self, attempt: u32, error: &str) -> bool {
        let delay = self.options.backoff.delay(attempt);
        warn!(
            link = self.name,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error,
            "Reconnect scheduled"
        );
        tokio::select! {
            _ = self.stop.wait() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// Spawn [`run_reconnect`](Self::run_reconnect) on the runtime.
    pub fn spawn_reconnect(self: &Arc<Self>) -> JoinHandle<()> {
        self.supervised.store(true, Ordering::SeqCst);
        tokio::spawn(Arc::clone(self).run_reconnect())
    }

    /// Stop reconnecting and release the connection.
    pub async fn disconnect(&self) {
        self.stop.trigger();
        let handle = {
            let mut inner = self.inner.lock();
            self.transition(&mut inner, ConnectionState::Disconnected);
            inner.handle.take()
        };
        if let Some(handle) = handle {
            self.connector.close(handle).await;
        }
    }
}

async fn probe_timer(period: Option<Duration>) {
    match period {
        Some(period) => tokio::time::sleep(period).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU32;

    #[derive(Debug)]
    struct FakeHandle;

    #[derive(Default)]
    struct FakeConnector {
        script: Mutex<VecDeque<Result<(), ConnectError>>>,
        attempts: AtomicU32,
        closes: AtomicU32,
        hang: AtomicBool,
        healthy: AtomicBool,
        probe_hang: AtomicBool,
    }

    impl FakeConnector {
        fn scripted(results: Vec<Result<(), ConnectError>>) -> Self {
            let connector = Self::default();
            *connector.script.lock() = results.into();
            connector.healthy.store(true, Ordering::SeqCst);
            connector
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        type Handle = FakeHandle;

        async fn connect(&self) -> Result<Arc<FakeHandle>, ConnectError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.hang.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            let next = self.script.lock().pop_front().unwrap_or(Ok(()));
            next.map(|_| Arc::new(FakeHandle))
        }

        async fn probe(&self, _handle: &FakeHandle) -> bool {
            if self.probe_hang.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            self.healthy.load(Ordering::SeqCst)
        }

        async fn close(&self, _handle: Arc<FakeHandle>) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn link(connector: FakeConnector, options: LinkOptions) -> Arc<Link<FakeConnector>> {
        Arc::new(Link::new("test", connector, options))
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert_eq!(ConnectionState::Degraded.to_string(), "Degraded");
        assert!(ConnectionState::Ready.is_ready());
        assert!(!ConnectionState::Connecting.is_ready());
    }

    #[tokio::test]
    async fn test_connect_success_and_failure() {
        let link = link(
            FakeConnector::scripted(vec![Err(ConnectError::AuthRefused("bad token".into()))]),
            LinkOptions::default(),
        );

        let err = link.connect().await.unwrap_err();
        assert_eq!(err, ConnectError::AuthRefused("bad token".into()));
        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert_eq!(link.failures(), 1);
        assert!(link.handle().is_none());

        link.connect().await.expect("connect");
        assert_eq!(link.state(), ConnectionState::Ready);
        assert!(link.handle().is_some());
        // Connecting alone does not reset the backoff; a successful operation does.
        assert_eq!(link.failures(), 1);
        link.confirm();
        assert_eq!(link.failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_is_time_bounded() {
        let connector = FakeConnector::default();
        connector.hang.store(true, Ordering::SeqCst);
        let link = link(
            connector,
            LinkOptions {
                connect_timeout: Duration::from_secs(2),
                ..Default::default()
            },
        );

        let err = link.connect().await.unwrap_err();
        assert_eq!(err, ConnectError::Timeout(Duration::from_secs(2)));
        assert_eq!(link.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_degrade_only_from_ready() {
        let link = link(FakeConnector::scripted(vec![]), LinkOptions::default());

        link.degrade("not connected yet");
        assert_eq!(link.state(), ConnectionState::Disconnected);

        link.connect().await.expect("connect");
        link.degrade("read failed");
        assert_eq!(link.state(), ConnectionState::Degraded);
        assert!(link.handle().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_task_backs_off_until_ready() {
        let link = link(
            FakeConnector::scripted(vec![
                Err(ConnectError::Unreachable("refused".into())),
                Err(ConnectError::Unreachable("refused".into())),
            ]),
            LinkOptions::default(),
        );
        let task = link.spawn_reconnect();

        // Failure delays are at most 1.2s then 2.4s.
        tokio::time::sleep(Duration::from_millis(900)).await;
        assert!(!link.is_ready());
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(link.is_ready());
        assert_eq!(link.connector().attempts.load(Ordering::SeqCst), 3);

        link.disconnect().await;
        task.await.expect("join");
        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert_eq!(link.connector().closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_degrade_triggers_reconnect() {
        let link = link(FakeConnector::scripted(vec![]), LinkOptions::default());
        let task = link.spawn_reconnect();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(link.is_ready());
        link.confirm();

        link.degrade("write timed out");
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(link.is_ready());
        assert_eq!(link.reconnects(), 1);
        // The degraded handle is released on reconnect.
        assert_eq!(link.connector().closes.load(Ordering::SeqCst), 1);

        link.disconnect().await;
        task.await.expect("join");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probe_degrades() {
        let link = link(
            FakeConnector::scripted(vec![]),
            LinkOptions {
                probe_interval: Some(Duration::from_secs(10)),
                ..Default::default()
            },
        );
        let task = link.spawn_reconnect();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(link.is_ready());

        link.connector().healthy.store(false, Ordering::SeqCst);
        // The probe fails at 10s; the reconnect follows within 1.2s of backoff.
        tokio::time::sleep(Duration::from_secs(12)).await;
        assert!(link.reconnects() >= 1);

        link.disconnect().await;
        task.await.expect("join");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfirmed_connections_back_off() {
        let link = link(FakeConnector::scripted(vec![]), LinkOptions::default());
        let task = link.spawn_reconnect();

        // Every connection is accepted and then fails its first operation.
        let flapper = {
            let link = Arc::clone(&link);
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    link.degrade("connection reset");
                }
            })
        };

        tokio::time::sleep(Duration::from_secs(30)).await;
        let attempts = link.connector().attempts.load(Ordering::SeqCst);
        assert!((3..=6).contains(&attempts), "attempts: {}", attempts);
        assert!(link.failures() >= 3);

        flapper.abort();
        link.disconnect().await;
        task.await.expect("join");
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmed_connection_reconnects_at_once() {
        let link = link(FakeConnector::scripted(vec![]), LinkOptions::default());
        let task = link.spawn_reconnect();

        for round in 1..=3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert!(link.is_ready(), "round {}", round);
            link.confirm();
            link.degrade("session reset");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(link.reconnects(), 3);
        assert_eq!(link.failures(), 0);

        link.disconnect().await;
        task.await.expect("join");
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_probe_times_out() {
        let connector = FakeConnector::scripted(vec![]);
        connector.probe_hang.store(true, Ordering::SeqCst);
        let link = link(
            connector,
            LinkOptions {
                connect_timeout: Duration::from_secs(2),
                probe_interval: Some(Duration::from_secs(1)),
                ..Default::default()
            },
        );
        let task = link.spawn_reconnect();

        // Probe starts at 1s, times out at 3s, reconnect within 1.2s of backoff.
        tokio::time::sleep(Duration::from_millis(2900)).await;
        assert!(link.is_ready());
        tokio::time::sleep(Duration::from_millis(1400)).await;
        assert_eq!(link.connector().attempts.load(Ordering::SeqCst), 2);

        link.disconnect().await;
        task.await.expect("join");
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_interrupts_running_probe() {
        let connector = FakeConnector::scripted(vec![]);
        connector.probe_hang.store(true, Ordering::SeqCst);
        let link = link(
            connector,
            LinkOptions {
                connect_timeout: Duration::from_secs(60),
                probe_interval: Some(Duration::from_secs(1)),
                ..Default::default()
            },
        );
        let task = link.spawn_reconnect();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        link.disconnect().await;
        tokio::time::timeout(Duration::from_millis(10), task)
            .await
            .expect("reconnect task stopped")
            .expect("join");
        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert_eq!(link.connector().closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connect_after_disconnect_releases_handle() {
        let link = link(FakeConnector::scripted(vec![]), LinkOptions::default());
        link.disconnect().await;

        let err = link.connect().await.unwrap_err();
        assert!(matches!(err, ConnectError::Unreachable(_)));
        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert!(link.handle().is_none());
        assert_eq!(link.connector().closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_refused_once_supervised() {
        let link = link(FakeConnector::scripted(vec![]), LinkOptions::default());
        let task = link.spawn_reconnect();

        assert_eq!(link.connect().await, Err(ConnectError::Supervised));

        link.disconnect().await;
        task.await.expect("join");
    }
}
