//! Producer loop: generate, validate, append, pace

use event_log::{EntryId, EventLog};
use event_schema::{encode_event, EVENT_DATA_FIELD};
use rand::Rng;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::RateConfig;
use crate::error::Result;
use crate::generator::generate_event;
use crate::rate::{RateController, RateTransition};

/// Counters owned by one producer
#[derive(Debug, Clone)]
pub struct ProducerStats {
    pub total_events: u64,
    pub errors: u64,
    /// Appends since the last progress snapshot
    pub since_last_log: u64,
    pub last_log_at: Instant,
}

impl ProducerStats {
    fn new(now: Instant) -> Self {
        Self {
            total_events: 0,
            errors: 0,
            since_last_log: 0,
            last_log_at: now,
        }
    }

    /// Events per second over the current window, then start a new window.
    fn take_window(&mut self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_log_at).as_secs_f64();
        let rate = if elapsed > 0.0 {
            self.since_last_log as f64 / elapsed
        } else {
            0.0
        };
        self.since_last_log = 0;
        self.last_log_at = now;
        rate
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub total_events: u64,
    /// Current stream length; `None` when it could not be read
    pub stream_length: Option<u64>,
    pub target_rate: u32,
    pub observed_rate: f64,
    pub errors: u64,
    pub burst: bool,
}

pub struct Producer<R> {
    log: Arc<dyn EventLog>,
    stream: String,
    rate: RateController,
    stats: ProducerStats,
    progress_interval: u64,
    rng: R,
}

impl<R: Rng + Send> Producer<R> {
    pub fn new(
        log: Arc<dyn EventLog>,
        stream: impl Into<String>,
        rate: RateConfig,
        progress_interval: u64,
        rng: R,
    ) -> Self {
        let now = Instant::now();
        Self {
            log,
            stream: stream.into(),
            rate: RateController::new(rate, now),
            stats: ProducerStats::new(now),
            progress_interval: progress_interval.max(1),
            rng,
        }
    }

    pub fn stats(&self) -> &ProducerStats {
        &self.stats
    }

    pub fn rate(&self) -> &RateController {
        &self.rate
    }

    /// Generate one event and append it under the `data` field.
    pub async fn publish_one(&mut self) -> Result<EntryId> {
        let event = generate_event(&mut self.rng);
        event.validate()?;
        let payload = encode_event(&event)?;

        let id = self
            .log
            .append(&self.stream, &[(EVENT_DATA_FIELD, payload.as_slice())])
            .await?;

        debug!(entry_id = %id, event_type = %event.event_type(), "Event appended");
        Ok(id)
    }

    /// One loop iteration without the pacing sleep.
    pub async fn tick(&mut self) {
        match self.rate.poll(Instant::now()) {
            Some(RateTransition::BurstStarted { rate, duration }) => info!(
                rate,
                duration_secs = duration.as_secs_f64(),
                "Burst mode activated"
            ),
            Some(RateTransition::BurstEnded { rate }) => {
                info!(rate, "Burst mode deactivated, returning to normal rate")
            }
            None => {}
        }

        match self.publish_one().await {
            Ok(_) => {
                self.stats.total_events += 1;
                self.stats.since_last_log += 1;
                if self.stats.since_last_log >= self.progress_interval {
                    self.progress().await;
                }
            }
            Err(e) => {
                self.stats.errors += 1;
                error!(error = %e, errors = self.stats.errors, "Failed to publish event");
            }
        }
    }

    /// Log a progress snapshot and start a new rate window.
    pub async fn progress(&mut self) -> ProgressSnapshot {
        let stream_length = match self.log.stream_len(&self.stream).await {
            Ok(len) => Some(len),
            Err(e) => {
                warn!(error = %e, stream = %self.stream, "Failed to read stream length");
                None
            }
        };

        let snapshot = ProgressSnapshot {
            total_events: self.stats.total_events,
            stream_length,
            target_rate: self.rate.current_rate(),
            observed_rate: self.stats.take_window(Instant::now()),
            errors: self.stats.errors,
            burst: self.rate.is_burst(),
        };

        info!(
            total_events = snapshot.total_events,
            stream_length = ?snapshot.stream_length,
            target_rate = snapshot.target_rate,
            observed_rate = %format!("{:.2}", snapshot.observed_rate),
            errors = snapshot.errors,
            burst_mode = snapshot.burst,
            "Progress update"
        );

        snapshot
    }

    /// Produce until `shutdown` flips to true, then flush a final snapshot and
    /// release the log connection.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> ProducerStats {
        info!(
            stream = %self.stream,
            rate = self.rate.current_rate(),
            "Starting event generation"
        );

        while !*shutdown.borrow() {
            self.tick().await;

            tokio::select! {
                _ = tokio::time::sleep(self.rate.delay()) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Shutting down producer");
        self.progress().await;

        if let Err(e) = self.log.close().await {
            warn!(error = %e, "Failed to release event log connection");
        }

        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_log::MemoryEventLog;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn producer(log: Arc<MemoryEventLog>, progress_interval: u64) -> Producer<StdRng> {
        Producer::new(
            log,
            "analytics_events",
            RateConfig::default(),
            progress_interval,
            StdRng::seed_from_u64(11),
        )
    }

    #[tokio::test]
    async fn test_failed_append_counts_error_and_continues() {
        let log = Arc::new(MemoryEventLog::new());
        let mut producer = producer(log.clone(), 100);

        log.set_unavailable(true);
        for _ in 0..3 {
            producer.tick().await;
        }
        assert_eq!(producer.stats().errors, 3);
        assert_eq!(producer.stats().total_events, 0);

        log.set_unavailable(false);
        producer.tick().await;
        assert_eq!(producer.stats().total_events, 1);
        assert_eq!(log.stream_len("analytics_events").await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_window_resets_every_interval() {
        let log = Arc::new(MemoryEventLog::new());
        let mut producer = producer(log.clone(), 5);

        for _ in 0..4 {
            producer.tick().await;
        }
        assert_eq!(producer.stats().since_last_log, 4);

        producer.tick().await;
        assert_eq!(producer.stats().since_last_log, 0);
        assert_eq!(producer.stats().total_events, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_reports_observed_rate() {
        let log = Arc::new(MemoryEventLog::new());
        let mut producer = producer(log.clone(), 1_000);

        for _ in 0..10 {
            producer.tick().await;
        }
        tokio::time::advance(std::time::Duration::from_secs(2)).await;

        let snapshot = producer.progress().await;
        assert_eq!(snapshot.total_events, 10);
        assert_eq!(snapshot.stream_length, Some(10));
        assert_eq!(snapshot.target_rate, 10);
        assert!((snapshot.observed_rate - 5.0).abs() < 1e-9);
        assert!(!snapshot.burst);
    }

    #[tokio::test]
    async fn test_snapshot_survives_unreadable_length() {
        let log = Arc::new(MemoryEventLog::new());
        let mut producer = producer(log.clone(), 1_000);

        log.set_unavailable(true);
        let snapshot = producer.progress().await;
        assert_eq!(snapshot.stream_length, None);
    }
}
