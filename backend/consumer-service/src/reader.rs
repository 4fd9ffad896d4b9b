//! Consumer group reader with short-batch backpressure

use event_log::{EventLog, GroupStatus, RawEntry, StreamGroup};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::ConsumerConfig;
use crate::error::Result;

pub struct BatchReader {
    log: Arc<dyn EventLog>,
    group: StreamGroup,
    consumer: String,
    batch_size: usize,
    block: Duration,
    min_batch_delay: Duration,
}

impl BatchReader {
    pub fn new(log: Arc<dyn EventLog>, config: &ConsumerConfig) -> Self {
        Self {
            log,
            group: config.stream_group(),
            consumer: config.consumer_name.clone(),
            batch_size: config.batch_size,
            block: config.block,
            min_batch_delay: config.min_batch_delay,
        }
    }

    pub fn group(&self) -> &StreamGroup {
        &self.group
    }

    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    /// Create the consumer group if it does not exist yet.
    pub async fn ensure_group(&self) -> Result<GroupStatus> {
        let status = self.log.ensure_group(&self.group).await?;
        match status {
            GroupStatus::Created => info!(
                stream = %self.group.stream,
                group = %self.group.group,
                "Created consumer group"
            ),
            GroupStatus::AlreadyExists => info!(
                stream = %self.group.stream,
                group = %self.group.group,
                "Consumer group already exists"
            ),
        }
        Ok(status)
    }

    /// Pull the next batch of undelivered entries.
    ///
    /// Waits up to the block timeout for the first entry; an empty batch means the
    /// wait timed out. A non-empty batch shorter than `batch_size` is held for the
    /// accumulation delay before it is returned, so a trickle of events is processed
    /// in fewer, larger transactions.
    pub async fn next_batch(&self) -> Result<Vec<RawEntry>> {
        let entries = self
            .log
            .read_group(&self.group, &self.consumer, self.batch_size, self.block)
            .await?;

        if !entries.is_empty() && entries.len() < self.batch_size {
            debug!(
                batch_size = entries.len(),
                delay_ms = self.min_batch_delay.as_millis() as u64,
                "Short batch, waiting before processing"
            );
            tokio::time::sleep(self.min_batch_delay).await;
        }

        Ok(entries)
    }
}
