//! Transactional persistence of validated batches, acknowledging what committed

use event_log::{EntryId, EventLog, StreamGroup};
use event_schema::{EventRow, SchemaResult};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::metrics;
use crate::stats::ConsumerStats;
use crate::store::EventStore;
use crate::validator::ValidEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Nothing to persist
    Empty,
    Committed {
        inserted: u64,
        duplicates: u64,
        acked: u64,
    },
    /// Rolled back; every entry of the batch stays pending
    Failed { events: u64 },
}

pub struct Persister {
    log: Arc<dyn EventLog>,
    store: Arc<dyn EventStore>,
    group: StreamGroup,
}

impl Persister {
    pub fn new(log: Arc<dyn EventLog>, store: Arc<dyn EventStore>, group: StreamGroup) -> Self {
        Self { log, store, group }
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// Insert `batch` in one transaction, then acknowledge its entries.
    ///
    /// Entries are acknowledged only after the commit. When the transaction fails
    /// nothing is acknowledged and the whole batch counts as errors.
    pub async fn persist(&self, batch: Vec<ValidEvent>, stats: &mut ConsumerStats) -> BatchOutcome {
        if batch.is_empty() {
            return BatchOutcome::Empty;
        }

        let start = Instant::now();
        let events = batch.len() as u64;

        let inserted = match self.insert(&batch).await {
            Ok(inserted) => inserted,
            Err(e) => {
                stats.record_failed(events);
                metrics::PERSIST_ERRORS.inc_by(events);
                error!(
                    error = %e,
                    batch_size = events,
                    total_errors = stats.total_errors,
                    "Error processing batch, transaction rolled back"
                );
                return BatchOutcome::Failed { events };
            }
        };

        let ids: Vec<EntryId> = batch.into_iter().map(|v| v.id).collect();
        let acked = match self.log.ack(&self.group, &ids).await {
            Ok(acked) => acked,
            Err(e) => {
                // rows are committed; redelivery of these entries is absorbed by the
                // (event_id, time) key
                warn!(error = %e, batch_size = events, "Failed to acknowledge committed batch");
                0
            }
        };

        let elapsed = start.elapsed();
        let duplicates = events.saturating_sub(inserted);
        stats.record_committed(events, duplicates, elapsed);

        metrics::EVENTS_PROCESSED.inc_by(events);
        metrics::DUPLICATE_EVENTS.inc_by(duplicates);
        metrics::BATCH_DURATION.observe(elapsed.as_secs_f64());

        info!(
            batch_size = events,
            inserted,
            duplicates,
            acked,
            batch_time_ms = elapsed.as_millis() as u64,
            total_processed = stats.total_processed,
            "Batch processed successfully"
        );

        BatchOutcome::Committed {
            inserted,
            duplicates,
            acked,
        }
    }

    async fn insert(&self, batch: &[ValidEvent]) -> Result<u64> {
        let rows = batch
            .iter()
            .map(|v| EventRow::from_event(&v.event))
            .collect::<SchemaResult<Vec<_>>>()?;
        self.store.insert_batch(&rows).await
    }
}
