// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test code readability over pedantic
#![allow(clippy::cast_possible_truncation)] // Test parameters

//! Supervisor end-to-end tests against scripted collaborators.
//!
//! All tests run on paused time, so a 10 s scenario finishes instantly.

mod common;

use common::{config, node_id, FakeSink, FakeSource, SinkMode};
use plc_collector::{CollectorConfig, Supervisor, SupervisorHandle, SupervisorState};
use plc_influx::FieldValue;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

type RunResult = Result<plc_collector::StatsSnapshot, plc_collector::CollectorError>;

fn start(
    config: CollectorConfig,
    source: &FakeSource,
    sink: &FakeSink,
) -> (SupervisorHandle, JoinHandle<RunResult>) {
    let supervisor =
        Supervisor::new(config, Arc::new(source.clone()), Arc::new(sink.clone())).expect("supervisor");
    let handle = supervisor.handle();
    let task = tokio::spawn(supervisor.run());
    (handle, task)
}

async fn finish(task: JoinHandle<RunResult>) -> RunResult {
    tokio::time::timeout(Duration::from_secs(60), task)
        .await
        .expect("supervisor stopped in time")
        .expect("join")
}

// ============================================================================
// Failing sink
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_always_failing_sink_drops_batches_and_keeps_running() {
    let config = config(5);
    let max_pending = config.batch.max_pending as u64;
    let max_size = config.batch.max_size as u64;
    let source = FakeSource::new();
    let sink = FakeSink::new(SinkMode::Retryable);

    let (handle, task) = start(config, &source, &sink);
    assert!(handle.wait_for(SupervisorState::Running).await);

    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(handle.state(), SupervisorState::Running);
    let stats = handle.stats();
    assert!(stats.batches_dropped >= 1, "stats: {:?}", stats);
    assert!(stats.samples_dropped >= 1);
    assert!(stats.peak_backlog <= (max_pending + 1) * max_size);
    assert_eq!(stats.samples_written, 0);
    // Every failed write is one attempt; no batch gets more than three.
    assert_eq!(stats.write_failures, sink.attempts());
    assert!(sink.attempts() <= 3 * (stats.batches_dropped + max_pending));

    handle.stop();
    let final_stats = finish(task).await.expect("clean stop");
    assert_eq!(handle.state(), SupervisorState::Stopped);
    // Nothing was written, so every sample read ended up dropped.
    assert_eq!(final_stats.samples_dropped, final_stats.samples_read);
}

#[tokio::test(start_paused = true)]
async fn test_batch_dropped_after_three_attempts() {
    let mut config = config(1);
    config.batch.max_size = 1;
    let source = FakeSource::new();
    let sink = FakeSink::new(SinkMode::Retryable);

    let (handle, task) = start(config, &source, &sink);
    // Each failed write backs the sink off (1s, then 2s) before the next try.
    tokio::time::sleep(Duration::from_secs(10)).await;

    let stats = handle.stats();
    assert!(stats.batches_dropped >= 1);
    assert_eq!(stats.batches_dropped, stats.samples_dropped);
    assert_eq!(stats.write_failures, sink.attempts());
    // Attempts never exceed three per dropped or still pending batch.
    assert!(sink.attempts() <= 3 * stats.samples_read);

    handle.stop();
    finish(task).await.expect("clean stop");
}

// ============================================================================
// Clean runs
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_clean_shutdown_writes_every_sample() {
    let source = FakeSource::new()
        .failing_node(&node_id(1))
        .stale_node(&node_id(3));
    let sink = FakeSink::new(SinkMode::Accept);

    let (handle, task) = start(config(5), &source, &sink);
    tokio::time::sleep(Duration::from_millis(5500)).await;
    handle.stop();

    let stats = finish(task).await.expect("clean stop");
    assert!(stats.samples_read >= 20, "stats: {:?}", stats);
    assert_eq!(stats.samples_written, stats.samples_read);
    assert_eq!(stats.batches_dropped, 0);
    assert_eq!(stats.samples_error, stats.cycles);
    assert_eq!(stats.samples_stale, stats.cycles);

    let written = sink.written();
    assert_eq!(written.len() as u64, stats.samples_read);

    // A failing node never costs the other nodes their samples.
    let good = written
        .iter()
        .filter(|p| p.fields.get("quality") == Some(&FieldValue::String("good".into())))
        .count() as u64;
    assert_eq!(good, stats.cycles * 3);

    let failed = node_id(1);
    for point in written
        .iter()
        .filter(|p| p.tags.get("node_id") == Some(&failed))
    {
        assert!(point.fields.get("value").is_none());
        assert_eq!(
            point.fields.get("quality"),
            Some(&FieldValue::String("error".into()))
        );
        assert_eq!(point.tags.get("tag").map(String::as_str), Some("sensor-1"));
        assert_eq!(point.measurement, "machine_status");
    }
}

#[tokio::test(start_paused = true)]
async fn test_fatal_write_stops_with_exit_code_2() {
    let source = FakeSource::new();
    let sink = FakeSink::new(SinkMode::Fatal);

    let (handle, task) = start(config(5), &source, &sink);
    let err = finish(task).await.expect_err("fatal write must stop the collector");

    assert_eq!(err.exit_code(), 2);
    assert_eq!(handle.state(), SupervisorState::Stopped);
    // A stopped supervisor never reaches any other state.
    assert!(!handle.wait_for(SupervisorState::Running).await);
    assert!(handle.wait_for(SupervisorState::Stopped).await);
    assert_eq!(sink.attempts(), 1);
    let stats = handle.stats();
    assert!(stats.batches_dropped >= 1);
    assert_eq!(stats.samples_dropped, stats.samples_read);
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_drain_is_bounded_when_sink_unavailable() {
    let mut config = config(5);
    config.shutdown.drain_timeout_ms = 2000;
    let source = FakeSource::new();
    let sink = FakeSink::new(SinkMode::Accept);
    sink.set_refuse(true);

    let (handle, task) = start(config, &source, &sink);
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(handle.state(), SupervisorState::Running);

    let stopped_at = Instant::now();
    handle.stop();
    let stats = finish(task).await.expect("clean stop");
    let elapsed = Instant::now() - stopped_at;

    assert!(elapsed >= Duration::from_secs(2), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(2500), "elapsed {:?}", elapsed);
    assert_eq!(stats.samples_written, 0);
    assert!(stats.batches_dropped >= 1);
    assert_eq!(stats.samples_dropped, stats.samples_read);
    assert!(sink.written().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_write_cut_by_drain_deadline_is_reported() {
    let mut config = config(5);
    config.shutdown.drain_timeout_ms = 2000;
    // Nothing is flushed before shutdown.
    config.batch.max_age_ms = 60_000;
    let source = FakeSource::new();
    let sink = FakeSink::new(SinkMode::Accept);
    sink.set_write_delay(Duration::from_secs(3));

    let (handle, task) = start(config, &source, &sink);
    tokio::time::sleep(Duration::from_millis(2500)).await;

    let stopped_at = Instant::now();
    handle.stop();
    let stats = finish(task).await.expect("clean stop");
    let elapsed = Instant::now() - stopped_at;

    // The final write outlives the drain deadline: it is cut short and its
    // batch reported, not lost.
    assert!(elapsed >= Duration::from_secs(2), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(2500), "elapsed {:?}", elapsed);
    assert!(stats.samples_read >= 10, "stats: {:?}", stats);
    assert_eq!(stats.samples_written, 0);
    assert_eq!(stats.batches_dropped, 1);
    assert_eq!(stats.samples_dropped, stats.samples_read);
    assert_eq!(stats.write_failures, 1);
    assert!(sink.written().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_hung_health_check_does_not_block_shutdown() {
    let mut config = config(2);
    config.sink.health_check_interval_secs = 1;
    let source = FakeSource::new();
    let sink = FakeSink::new(SinkMode::Accept);
    sink.set_health_hangs(true);

    // The first health check starts at 1s and never answers.
    let (handle, task) = start(config, &source, &sink);
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let stopped_at = Instant::now();
    handle.stop();
    let stats = finish(task).await.expect("clean stop");

    assert!(Instant::now() - stopped_at < Duration::from_secs(1));
    assert_eq!(handle.state(), SupervisorState::Stopped);
    assert_eq!(stats.samples_written, stats.samples_read);
}

#[tokio::test(start_paused = true)]
async fn test_drain_flushes_once_sink_returns() {
    let source = FakeSource::new();
    let sink = FakeSink::new(SinkMode::Accept);
    sink.set_refuse(true);

    let (handle, task) = start(config(2), &source, &sink);
    tokio::time::sleep(Duration::from_secs(3)).await;

    handle.stop();
    sink.set_refuse(false);
    let stats = finish(task).await.expect("clean stop");

    assert_eq!(stats.batches_dropped, 0);
    assert_eq!(stats.samples_written, stats.samples_read);
    assert_eq!(sink.written().len() as u64, stats.samples_read);
}
