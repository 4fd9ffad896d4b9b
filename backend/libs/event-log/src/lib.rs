//! Durable append-only event log with consumer groups
//!
//! [`EventLog`] is the seam between the pipeline services and the log backend.
//! [`RedisEventLog`] maps it onto Redis Streams (XADD / XREADGROUP / XACK / XPENDING /
//! XCLAIM); [`MemoryEventLog`] keeps the same delivery semantics in process for tests
//! and local runs.
//!
//! Delivery model: every entry appended to a stream is handed to exactly one consumer
//! of a group by [`EventLog::read_group`]. It then stays pending for that group until
//! [`EventLog::ack`] removes it. Pending entries can be taken over by another consumer
//! with [`EventLog::claim`] once they have been idle long enough.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

mod error;
mod memory;
mod redis_log;

pub use error::{LogError, LogResult};
pub use memory::MemoryEventLog;
pub use redis_log::RedisEventLog;

/// Opaque, log-assigned identifier of an entry. Ordered within one stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryId(String);

impl EntryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An entry as read back from the log
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntry {
    pub id: EntryId,
    pub fields: Vec<(String, Vec<u8>)>,
}

impl RawEntry {
    pub fn field(&self, name: &str) -> Option<&[u8]> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_slice())
    }
}

/// Stream plus consumer group a reader belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamGroup {
    pub stream: String,
    pub group: String,
}

impl StreamGroup {
    pub fn new(stream: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            group: group.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupStatus {
    Created,
    AlreadyExists,
}

/// A delivered but unacknowledged entry
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEntry {
    pub id: EntryId,
    pub consumer: String,
    /// Time since the entry was last delivered
    pub idle: Duration,
    /// How many times the entry has been delivered
    pub deliveries: u64,
}

#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append one entry and return its id.
    async fn append(&self, stream: &str, fields: &[(&str, &[u8])]) -> LogResult<EntryId>;

    /// Create the consumer group, and the stream if absent, reading from the start
    /// of the stream. An existing group is left untouched.
    async fn ensure_group(&self, group: &StreamGroup) -> LogResult<GroupStatus>;

    /// Deliver up to `count` entries never delivered to the group before, waiting up
    /// to `block` for the first one. A zero `block` returns immediately.
    async fn read_group(
        &self,
        group: &StreamGroup,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> LogResult<Vec<RawEntry>>;

    /// Acknowledge entries for the group. Returns how many were still pending.
    async fn ack(&self, group: &StreamGroup, ids: &[EntryId]) -> LogResult<u64>;

    /// Total number of entries in the stream. A missing stream has length 0.
    async fn stream_len(&self, stream: &str) -> LogResult<u64>;

    /// Entries appended but not yet delivered to the group, when the backend reports it.
    async fn group_lag(&self, group: &StreamGroup) -> LogResult<Option<u64>>;

    /// Up to `count` pending entries of the group, oldest first.
    async fn pending(&self, group: &StreamGroup, count: usize) -> LogResult<Vec<PendingEntry>>;

    /// Transfer ownership of pending entries idle for at least `min_idle` to `consumer`.
    /// Each claimed entry counts as a new delivery.
    async fn claim(
        &self,
        group: &StreamGroup,
        consumer: &str,
        min_idle: Duration,
        ids: &[EntryId],
    ) -> LogResult<Vec<RawEntry>>;

    /// Release the underlying connection. Later calls fail with [`LogError::Closed`].
    async fn close(&self) -> LogResult<()>;
}
