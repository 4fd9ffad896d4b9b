//! Lag sampling and the CSV metrics record

mod common;

use common::*;
use consumer_service::monitor::CSV_HEADER;
use consumer_service::{ConsumerStats, LagMonitor};
use event_log::{EventLog, MemoryEventLog, StreamGroup};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn group() -> StreamGroup {
    StreamGroup::new(STREAM, "analytics_consumers")
}

async fn read_lines(path: &std::path::Path) -> Vec<String> {
    tokio::fs::read_to_string(path)
        .await
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_lag_falls_back_to_stream_length_without_group() {
    let log = Arc::new(MemoryEventLog::new());
    for user in 1..=4 {
        append_event(&log, &page_view(user)).await;
    }
    let dir = tempfile::tempdir().unwrap();
    let monitor = LagMonitor::new(log, group(), dir.path().join("metrics.csv"));

    let sample = monitor
        .sample(&mut ConsumerStats::new(Instant::now()))
        .await
        .unwrap();

    assert_eq!(sample.stream_length, 4);
    assert_eq!(sample.lag, 4);
}

#[tokio::test]
async fn test_lag_counts_undelivered_entries() {
    let log = Arc::new(MemoryEventLog::new());
    log.ensure_group(&group()).await.unwrap();
    for user in 1..=5 {
        append_event(&log, &page_view(user)).await;
    }
    log.read_group(&group(), "consumer-1", 2, Duration::ZERO)
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let monitor = LagMonitor::new(log, group(), dir.path().join("metrics.csv"));
    let sample = monitor
        .sample(&mut ConsumerStats::new(Instant::now()))
        .await
        .unwrap();

    assert_eq!(sample.stream_length, 5);
    assert_eq!(sample.lag, 3);
}

#[tokio::test]
async fn test_header_written_once() {
    let log = Arc::new(MemoryEventLog::new());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.csv");
    let monitor = LagMonitor::new(log, group(), &path);
    let mut stats = ConsumerStats::new(Instant::now());

    for _ in 0..3 {
        monitor.sample(&mut stats).await;
    }

    let lines = read_lines(&path).await;
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], CSV_HEADER);
    assert_eq!(lines.iter().filter(|l| *l == CSV_HEADER).count(), 1);
    assert!(lines[1..].iter().all(|l| l.split(',').count() == 5));
}

#[tokio::test]
async fn test_existing_record_is_appended_to() {
    let log = Arc::new(MemoryEventLog::new());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.csv");
    let previous = format!("{CSV_HEADER}\n2025-03-01T12:00:00.000Z,10,0,5,1.00\n");
    tokio::fs::write(&path, &previous).await.unwrap();

    let monitor = LagMonitor::new(log, group(), &path);
    monitor.sample(&mut ConsumerStats::new(Instant::now())).await;

    let lines = read_lines(&path).await;
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], CSV_HEADER);
    assert!(lines[1].starts_with("2025-03-01T12:00:00.000Z"));
}

#[tokio::test(start_paused = true)]
async fn test_sample_resets_throughput_window() {
    let log = Arc::new(MemoryEventLog::new());
    let dir = tempfile::tempdir().unwrap();
    let monitor = LagMonitor::new(log, group(), dir.path().join("metrics.csv"));

    let mut stats = ConsumerStats::new(Instant::now());
    stats.record_committed(200, 0, Duration::from_millis(40));
    tokio::time::advance(Duration::from_secs(10)).await;

    let sample = monitor.sample(&mut stats).await.unwrap();
    assert!((sample.processing_rate - 20.0).abs() < 0.01);
    assert_eq!(sample.events_processed, 200);
    assert_eq!(sample.batch_time_ms, 40);
    assert_eq!(stats.processed_since_sample, 0);

    tokio::time::advance(Duration::from_secs(10)).await;
    let sample = monitor.sample(&mut stats).await.unwrap();
    assert_eq!(sample.processing_rate, 0.0);
    assert_eq!(sample.events_processed, 200);
}

#[tokio::test]
async fn test_write_failure_degrades_to_warning() {
    let log = Arc::new(MemoryEventLog::new());
    append_event(&log, &page_view(1)).await;
    let dir = tempfile::tempdir().unwrap();
    // parent directory does not exist
    let path = dir.path().join("missing").join("metrics.csv");
    let monitor = LagMonitor::new(log, group(), &path);

    let sample = monitor
        .sample(&mut ConsumerStats::new(Instant::now()))
        .await
        .unwrap();

    assert_eq!(sample.stream_length, 1);
    assert!(!path.exists());
}

#[tokio::test(start_paused = true)]
async fn test_unreadable_log_skips_sample() {
    let log = Arc::new(MemoryEventLog::new());
    for user in 1..=50 {
        append_event(&log, &page_view(user)).await;
    }
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.csv");
    let monitor = LagMonitor::new(log.clone(), group(), &path);

    let mut stats = ConsumerStats::new(Instant::now());
    monitor.sample(&mut stats).await.unwrap();

    stats.record_committed(30, 0, Duration::from_millis(15));
    tokio::time::advance(Duration::from_secs(10)).await;
    log.set_unavailable(true);

    assert!(monitor.sample(&mut stats).await.is_none());
    // window still restarts
    assert_eq!(stats.processed_since_sample, 0);

    let lines = read_lines(&path).await;
    assert_eq!(lines.len(), 2);
    assert!(lines[1].contains(",0,50,"));
}
