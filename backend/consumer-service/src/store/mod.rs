//! Durable event storage behind a transactional batch insert

use async_trait::async_trait;
use event_schema::EventRow;

use crate::error::Result;

mod memory;
mod postgres;

pub use memory::MemoryEventStore;
pub use postgres::{PgEventStore, MIGRATOR};

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert `rows` in one transaction, skipping rows whose `(event_id, time)` key
    /// already exists. Returns the number of rows actually inserted.
    ///
    /// On error nothing from this call is visible.
    async fn insert_batch(&self, rows: &[EventRow]) -> Result<u64>;

    /// Release store connections.
    async fn close(&self);
}
