//! Consumer control loop: read, validate, persist, with periodic monitoring and
//! pending-entry recovery

use event_log::{EventLog, LogError, RawEntry};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::config::{ConsumerConfig, MonitorConfig, ReclaimConfig};
use crate::error::{ConsumerError, Result};
use crate::metrics;
use crate::monitor::{LagMonitor, MetricsSample};
use crate::persister::{BatchOutcome, Persister};
use crate::reader::BatchReader;
use crate::reclaim::PendingReclaimer;
use crate::stats::ConsumerStats;
use crate::store::EventStore;
use crate::validator::validate_batch;

pub struct Processor {
    log: Arc<dyn EventLog>,
    reader: BatchReader,
    persister: Persister,
    monitor: LagMonitor,
    reclaimer: PendingReclaimer,
    stats: ConsumerStats,
    monitor_interval: Duration,
    reclaim_interval: Duration,
    error_backoff: Duration,
}

impl Processor {
    pub fn new(
        log: Arc<dyn EventLog>,
        store: Arc<dyn EventStore>,
        consumer: &ConsumerConfig,
        monitor: &MonitorConfig,
        reclaim: &ReclaimConfig,
    ) -> Self {
        let group = consumer.stream_group();
        Self {
            reader: BatchReader::new(log.clone(), consumer),
            persister: Persister::new(log.clone(), store, group.clone()),
            monitor: LagMonitor::new(log.clone(), group.clone(), monitor.metrics_file.clone()),
            reclaimer: PendingReclaimer::new(
                log.clone(),
                group,
                consumer.consumer_name.clone(),
                reclaim.clone(),
            ),
            log,
            stats: ConsumerStats::new(Instant::now()),
            monitor_interval: monitor.interval,
            reclaim_interval: reclaim.interval,
            error_backoff: consumer.error_backoff,
        }
    }

    pub fn stats(&self) -> &ConsumerStats {
        &self.stats
    }

    /// Make sure the consumer group exists. Must succeed before [`Processor::run`].
    pub async fn start(&self) -> Result<()> {
        self.reader.ensure_group().await?;
        Ok(())
    }

    /// Validate `entries` and persist the valid ones as one batch.
    ///
    /// Invalid entries are counted and left pending.
    pub async fn process_entries(&mut self, entries: Vec<RawEntry>) -> BatchOutcome {
        self.process(entries, false).await
    }

    /// Invalid entries are counted on first delivery only, so a poisoned entry
    /// redriven by the reclaimer is not counted once per attempt.
    async fn process(&mut self, entries: Vec<RawEntry>, redelivered: bool) -> BatchOutcome {
        if entries.is_empty() {
            return BatchOutcome::Empty;
        }

        let batch = validate_batch(entries);
        if !batch.invalid.is_empty() && !redelivered {
            let invalid = batch.invalid.len() as u64;
            self.stats.record_invalid(invalid);
            metrics::INVALID_ENTRIES.inc_by(invalid);
        }

        if batch.valid.is_empty() {
            warn!(invalid = batch.invalid.len(), redelivered, "No valid events in batch");
            return BatchOutcome::Empty;
        }

        self.persister.persist(batch.valid, &mut self.stats).await
    }

    /// Pull one batch and process it.
    pub async fn run_once(&mut self) -> Result<BatchOutcome> {
        let entries = self.reader.next_batch().await?;
        Ok(self.process_entries(entries).await)
    }

    /// Take a lag sample now. `None` when the log could not be read.
    pub async fn sample(&mut self) -> Option<MetricsSample> {
        self.monitor.sample(&mut self.stats).await
    }

    /// Run one reclaim pass and re-process what it returns.
    pub async fn reclaim_pending(&mut self) -> BatchOutcome {
        match self.reclaimer.reclaim(&mut self.stats).await {
            Ok(entries) => self.process(entries, true).await,
            Err(e) => {
                warn!(error = %e, "Failed to reclaim pending entries");
                BatchOutcome::Empty
            }
        }
    }

    /// Consume until `shutdown` flips to true.
    ///
    /// The flag is checked between iterations, so a batch transaction is never
    /// abandoned half way. On exit a final sample is taken and both the log and the
    /// store are released.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> ConsumerStats {
        let group = self.reader.group().clone();
        info!(
            stream = %group.stream,
            group = %group.group,
            consumer = %self.reader.consumer(),
            "Starting consumer"
        );

        let mut next_sample = Instant::now() + self.monitor_interval;
        let mut next_reclaim = Instant::now() + self.reclaim_interval;

        while !*shutdown.borrow() && shutdown.has_changed().is_ok() {
            if let Err(e) = self.run_once().await {
                match e {
                    ConsumerError::Log(LogError::Closed) => {
                        error!("Event log closed, stopping consumer");
                        break;
                    }
                    ConsumerError::Log(LogError::GroupMissing { .. }) => {
                        warn!(error = %e, "Consumer group missing, recreating");
                        if let Err(e) = self.reader.ensure_group().await {
                            error!(error = %e, "Failed to recreate consumer group");
                            if backoff(&mut shutdown, self.error_backoff).await {
                                break;
                            }
                        }
                    }
                    e => {
                        error!(
                            error = %e,
                            transient = e.is_transient(),
                            backoff_ms = self.error_backoff.as_millis() as u64,
                            "Error in consumer loop"
                        );
                        if backoff(&mut shutdown, self.error_backoff).await {
                            break;
                        }
                    }
                }
            }

            let now = Instant::now();
            if now >= next_sample {
                self.sample().await;
                next_sample = now + self.monitor_interval;
            }
            if now >= next_reclaim {
                self.reclaim_pending().await;
                next_reclaim = now + self.reclaim_interval;
            }
        }

        info!("Shutting down consumer");
        self.sample().await;

        info!(
            total_processed = self.stats.total_processed,
            total_errors = self.stats.total_errors,
            total_invalid = self.stats.total_invalid,
            total_duplicates = self.stats.total_duplicates,
            total_dead_lettered = self.stats.total_dead_lettered,
            "Consumer stopped"
        );

        if let Err(e) = self.log.close().await {
            warn!(error = %e, "Failed to release event log connection");
        }
        self.persister.store().close().await;

        self.stats
    }
}

/// Sleep for `delay` unless shutdown is requested first. Returns true on shutdown.
async fn backoff(shutdown: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    let changed = tokio::select! {
        _ = tokio::time::sleep(delay) => return false,
        changed = shutdown.changed() => changed,
    };
    changed.is_err() || *shutdown.borrow()
}
