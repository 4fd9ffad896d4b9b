#![allow(dead_code)]

use consumer_service::{ConsumerConfig, MemoryEventStore, MonitorConfig, Processor, ReclaimConfig};
use event_log::{EntryId, EventLog, MemoryEventLog};
use event_schema::{encode_event, AnalyticsEvent, EventEnvelope, PageViewProperties};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const STREAM: &str = "analytics_events";

pub fn page_view(user: u32) -> AnalyticsEvent {
    AnalyticsEvent::PageView(EventEnvelope::new(
        format!("user_{user:03}"),
        PageViewProperties {
            page_url: "https://example.com/products".to_string(),
            referrer: "https://google.com".to_string(),
            session_id: Uuid::new_v4(),
            viewport_width: 1280,
            viewport_height: 800,
        },
    ))
}

pub async fn append_event(log: &MemoryEventLog, event: &AnalyticsEvent) -> EntryId {
    let payload = encode_event(event).unwrap();
    log.append(STREAM, &[("data", payload.as_slice())])
        .await
        .unwrap()
}

pub async fn append_raw(log: &MemoryEventLog, payload: &[u8]) -> EntryId {
    log.append(STREAM, &[("data", payload)]).await.unwrap()
}

pub fn consumer_config() -> ConsumerConfig {
    ConsumerConfig::default()
}

pub fn monitor_config(dir: &Path) -> MonitorConfig {
    MonitorConfig {
        interval: Duration::from_secs(10),
        metrics_file: dir.join("metrics.csv"),
    }
}

pub fn reclaim_config(max_deliveries: u64) -> ReclaimConfig {
    ReclaimConfig {
        max_deliveries,
        ..ReclaimConfig::default()
    }
}

pub struct Pipeline {
    pub log: Arc<MemoryEventLog>,
    pub store: Arc<MemoryEventStore>,
    pub processor: Processor,
    pub dir: tempfile::TempDir,
}

pub async fn pipeline(consumer: ConsumerConfig, reclaim: ReclaimConfig) -> Pipeline {
    let log = Arc::new(MemoryEventLog::new());
    let store = Arc::new(MemoryEventStore::new());
    let dir = tempfile::tempdir().unwrap();

    let processor = Processor::new(
        log.clone(),
        store.clone(),
        &consumer,
        &monitor_config(dir.path()),
        &reclaim,
    );
    processor.start().await.unwrap();

    Pipeline {
        log,
        store,
        processor,
        dir,
    }
}
