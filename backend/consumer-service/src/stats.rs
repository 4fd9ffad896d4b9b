use std::time::Duration;
use tokio::time::Instant;

/// Counters owned by one consumer process
#[derive(Debug, Clone)]
pub struct ConsumerStats {
    /// Events in committed batches, duplicates included
    pub total_processed: u64,
    /// Events in batches that were rolled back
    pub total_errors: u64,
    pub total_invalid: u64,
    /// Committed events whose row already existed
    pub total_duplicates: u64,
    pub total_dead_lettered: u64,
    /// Duration of the last committed batch
    pub last_batch_time: Duration,
    /// Processed since the last monitor sample
    pub processed_since_sample: u64,
    pub last_sample_at: Instant,
}

impl ConsumerStats {
    pub fn new(now: Instant) -> Self {
        Self {
            total_processed: 0,
            total_errors: 0,
            total_invalid: 0,
            total_duplicates: 0,
            total_dead_lettered: 0,
            last_batch_time: Duration::ZERO,
            processed_since_sample: 0,
            last_sample_at: now,
        }
    }

    pub fn record_committed(&mut self, events: u64, duplicates: u64, elapsed: Duration) {
        self.total_processed += events;
        self.processed_since_sample += events;
        self.total_duplicates += duplicates;
        self.last_batch_time = elapsed;
    }

    pub fn record_failed(&mut self, events: u64) {
        self.total_errors += events;
    }

    pub fn record_invalid(&mut self, entries: u64) {
        self.total_invalid += entries;
    }

    pub fn record_dead_lettered(&mut self, entries: u64) {
        self.total_dead_lettered += entries;
    }

    /// Events per second since the last sample, then start a new window.
    pub fn take_window(&mut self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_sample_at).as_secs_f64();
        let rate = if elapsed > 0.0 {
            self.processed_since_sample as f64 / elapsed
        } else {
            0.0
        };
        self.processed_since_sample = 0;
        self.last_sample_at = now;
        rate
    }
}
