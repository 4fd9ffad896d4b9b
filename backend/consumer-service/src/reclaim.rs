//! Recovery of entries stuck in the consumer group's pending set
//!
//! Entries stay pending when their batch was rolled back, when they were invalid, or
//! when the consumer that read them died. The reclaimer takes over entries idle for
//! longer than `min_idle`. Entries delivered fewer than `max_deliveries` times are
//! returned for another pass through validation and persistence; the rest are copied
//! to the dead-letter stream and acknowledged.

use event_log::{EntryId, EventLog, PendingEntry, RawEntry, StreamGroup};
use event_schema::EVENT_DATA_FIELD;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ReclaimConfig;
use crate::error::Result;
use crate::metrics;
use crate::stats::ConsumerStats;

pub const DEAD_LETTER_REASON: &str = "max_deliveries_exceeded";

pub fn dead_letter_stream(stream: &str) -> String {
    format!("{stream}:dead-letter")
}

pub struct PendingReclaimer {
    log: Arc<dyn EventLog>,
    group: StreamGroup,
    consumer: String,
    config: ReclaimConfig,
    dead_letter_stream: String,
}

impl PendingReclaimer {
    pub fn new(
        log: Arc<dyn EventLog>,
        group: StreamGroup,
        consumer: impl Into<String>,
        config: ReclaimConfig,
    ) -> Self {
        let dead_letter_stream = dead_letter_stream(&group.stream);
        Self {
            log,
            group,
            consumer: consumer.into(),
            config,
            dead_letter_stream,
        }
    }

    pub fn dead_letter_stream(&self) -> &str {
        &self.dead_letter_stream
    }

    /// Claim idle pending entries and dead-letter the exhausted ones.
    ///
    /// Returns the claimed entries that should be processed again.
    pub async fn reclaim(&self, stats: &mut ConsumerStats) -> Result<Vec<RawEntry>> {
        let pending = self.log.pending(&self.group, self.config.batch_size).await?;

        let idle: HashMap<EntryId, PendingEntry> = pending
            .into_iter()
            .filter(|p| p.idle >= self.config.min_idle)
            .map(|p| (p.id.clone(), p))
            .collect();
        if idle.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<EntryId> = idle.keys().cloned().collect();
        let mut claimed = self
            .log
            .claim(&self.group, &self.consumer, self.config.min_idle, &ids)
            .await?;
        claimed.sort_by_key(|entry| entry_order(&entry.id));
        let claimed_count = claimed.len();

        let (exhausted, redrive): (Vec<_>, Vec<_>) = claimed.into_iter().partition(|entry| {
            idle.get(&entry.id)
                .is_some_and(|p| p.deliveries >= self.config.max_deliveries)
        });

        let mut dead_lettered = Vec::with_capacity(exhausted.len());
        for entry in exhausted {
            let deliveries = idle.get(&entry.id).map(|p| p.deliveries).unwrap_or_default();
            match self.dead_letter(&entry, deliveries).await {
                Ok(dlq_id) => {
                    warn!(
                        entry_id = %entry.id,
                        dead_letter_id = %dlq_id,
                        deliveries,
                        "Moved entry to dead-letter stream"
                    );
                    dead_lettered.push(entry.id);
                }
                Err(e) => warn!(entry_id = %entry.id, error = %e, "Failed to dead-letter entry"),
            }
        }

        // A failed ack leaves the originals pending; they are dead-lettered again on a
        // later pass.
        if !dead_lettered.is_empty() {
            match self.log.ack(&self.group, &dead_lettered).await {
                Ok(_) => {
                    let count = dead_lettered.len() as u64;
                    stats.record_dead_lettered(count);
                    metrics::DEAD_LETTERED.inc_by(count);
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        entries = dead_lettered.len(),
                        "Failed to acknowledge dead-lettered entries"
                    );
                    dead_lettered.clear();
                }
            }
        }

        info!(
            claimed = claimed_count,
            redriven = redrive.len(),
            dead_lettered = dead_lettered.len(),
            "Reclaimed pending entries"
        );
        debug!(dead_letter_stream = %self.dead_letter_stream, "Reclaim pass finished");

        Ok(redrive)
    }

    async fn dead_letter(&self, entry: &RawEntry, deliveries: u64) -> Result<EntryId> {
        let deliveries = deliveries.to_string();
        let data = entry.field(EVENT_DATA_FIELD).unwrap_or_default();

        let id = self
            .log
            .append(
                &self.dead_letter_stream,
                &[
                    (EVENT_DATA_FIELD, data),
                    ("original_id", entry.id.as_str().as_bytes()),
                    ("deliveries", deliveries.as_bytes()),
                    ("reason", DEAD_LETTER_REASON.as_bytes()),
                ],
            )
            .await?;
        Ok(id)
    }
}

/// Sort key for `<millis>-<seq>` ids; malformed ids sort last.
fn entry_order(id: &EntryId) -> (u64, u64) {
    id.as_str()
        .split_once('-')
        .and_then(|(ms, seq)| Some((ms.parse().ok()?, seq.parse().ok()?)))
        .unwrap_or((u64::MAX, u64::MAX))
}
