//! Consumer pipeline against a real Redis stream
//!
//! Run tests:
//! ```bash
//! export REDIS_URL="redis://localhost:6379"
//! cargo test --package consumer-service --test redis_pipeline_test -- --ignored
//! ```

use consumer_service::{
    BatchOutcome, ConsumerConfig, MemoryEventStore, MonitorConfig, Processor, ReclaimConfig,
};
use event_log::{EventLog, RedisEventLog};
use event_schema::{encode_event, AnalyticsEvent, ButtonClickProperties, EventEnvelope};
use redis_utils::RedisPool;
use std::env;
use std::sync::Arc;
use uuid::Uuid;

fn get_redis_url() -> String {
    env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
}

fn button_click() -> AnalyticsEvent {
    AnalyticsEvent::ButtonClick(EventEnvelope::new(
        "user_010",
        ButtonClickProperties {
            button_id: "btn-buy-now".to_string(),
            button_text: "Buy Now".to_string(),
            page_url: "https://example.com/pricing".to_string(),
            session_id: Uuid::new_v4(),
            click_x: 300,
            click_y: 420,
        },
    ))
}

#[ignore = "Requires Redis"]
#[tokio::test]
async fn test_batch_round_trip_through_redis_stream() {
    let redis = RedisPool::connect(&get_redis_url())
        .await
        .expect("Failed to connect to Redis");
    let log = Arc::new(RedisEventLog::new(&redis));
    let store = Arc::new(MemoryEventStore::new());
    let dir = tempfile::tempdir().unwrap();

    let consumer = ConsumerConfig {
        stream_name: format!("analytics_events_test_{}", Uuid::new_v4().simple()),
        ..ConsumerConfig::default()
    };
    let monitor = MonitorConfig {
        metrics_file: dir.path().join("metrics.csv"),
        ..MonitorConfig::default()
    };
    let mut processor = Processor::new(
        log.clone(),
        store.clone(),
        &consumer,
        &monitor,
        &ReclaimConfig::default(),
    );
    processor.start().await.unwrap();

    for _ in 0..3 {
        let payload = encode_event(&button_click()).unwrap();
        log.append(&consumer.stream_name, &[("data", payload.as_slice())])
            .await
            .unwrap();
    }
    log.append(&consumer.stream_name, &[("data", &b"{broken"[..])])
        .await
        .unwrap();

    let outcome = processor.run_once().await.unwrap();
    assert!(matches!(outcome, BatchOutcome::Committed { inserted: 3, acked: 3, .. }));
    assert_eq!(store.len().await, 3);

    let group = consumer.stream_group();
    let pending = log.pending(&group, 10).await.unwrap();
    assert_eq!(pending.len(), 1);

    let sample = processor.sample().await.unwrap();
    assert_eq!(sample.stream_length, 4);

    let mut conn = redis.manager();
    let _: i64 = redis::cmd("DEL")
        .arg(&consumer.stream_name)
        .query_async(&mut conn)
        .await
        .unwrap();
}
