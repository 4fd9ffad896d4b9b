use async_trait::async_trait;
use chrono::{DateTime, Utc};
use event_schema::EventRow;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::EventStore;
use crate::error::{ConsumerError, Result};

/// In-process [`EventStore`] keyed like the `events` table.
///
/// Each batch is staged on a copy of the rows and swapped in on commit, so an injected
/// commit failure leaves the store untouched.
#[derive(Default)]
pub struct MemoryEventStore {
    rows: Mutex<BTreeMap<(Uuid, DateTime<Utc>), EventRow>>,
    failing_commits: AtomicUsize,
    closed: AtomicBool,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` commits after their rows were staged.
    pub fn fail_next_commits(&self, count: usize) {
        self.failing_commits.store(count, Ordering::SeqCst);
    }

    pub async fn rows(&self) -> Vec<EventRow> {
        self.rows.lock().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn take_commit_failure(&self) -> bool {
        self.failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn insert_batch(&self, rows: &[EventRow]) -> Result<u64> {
        let mut committed = self.rows.lock().await;

        let mut staged = committed.clone();
        let mut inserted = 0;
        for row in rows {
            let key = (row.event_id, row.time);
            if !staged.contains_key(&key) {
                staged.insert(key, row.clone());
                inserted += 1;
            }
        }

        if self.take_commit_failure() {
            return Err(ConsumerError::CommitFailed(format!(
                "injected failure after staging {inserted} rows"
            )));
        }

        *committed = staged;
        Ok(inserted)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_schema::EventType;
    use serde_json::json;

    fn row(n: u128) -> EventRow {
        EventRow {
            time: DateTime::<Utc>::from_timestamp(1_740_830_400, 0).unwrap(),
            event_id: Uuid::from_u128(n),
            event_type: EventType::PageView,
            user_id: format!("user_{n:03}"),
            properties: json!({ "page_url": "https://example.com/" }),
        }
    }

    #[tokio::test]
    async fn test_reinserting_a_batch_is_idempotent() {
        let store = MemoryEventStore::new();
        let batch: Vec<_> = (1..=4).map(row).collect();

        assert_eq!(store.insert_batch(&batch).await.unwrap(), 4);
        assert_eq!(store.insert_batch(&batch).await.unwrap(), 0);
        assert_eq!(store.len().await, 4);
    }

    #[tokio::test]
    async fn test_same_id_different_time_is_distinct() {
        let store = MemoryEventStore::new();
        let mut later = row(1);
        later.time += chrono::Duration::seconds(1);

        store.insert_batch(&[row(1), later]).await.unwrap();
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_no_rows() {
        let store = MemoryEventStore::new();
        store.insert_batch(&[row(1)]).await.unwrap();

        store.fail_next_commits(1);
        let err = store.insert_batch(&[row(2), row(3)]).await.unwrap_err();
        assert!(matches!(err, ConsumerError::CommitFailed(_)));
        assert_eq!(store.len().await, 1);

        // failure budget is spent
        assert_eq!(store.insert_batch(&[row(2), row(3)]).await.unwrap(), 2);
    }
}
