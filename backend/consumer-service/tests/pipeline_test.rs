//! Batch scenarios through reader, validator and persister

mod common;

use common::*;
use consumer_service::BatchOutcome;
use event_log::EventLog;

#[tokio::test(start_paused = true)]
async fn test_malformed_entry_is_excluded_from_batch() {
    let consumer = consumer_service::ConsumerConfig {
        batch_size: 4,
        ..consumer_config()
    };
    let mut p = pipeline(consumer, reclaim_config(5)).await;

    for user in 1..=2 {
        append_event(&p.log, &page_view(user)).await;
    }
    let malformed = append_raw(&p.log, b"{\"event_type\":\"page_view\",\"user_id\":").await;
    append_event(&p.log, &page_view(3)).await;

    let outcome = p.processor.run_once().await.unwrap();

    assert_eq!(
        outcome,
        BatchOutcome::Committed {
            inserted: 3,
            duplicates: 0,
            acked: 3
        }
    );
    assert_eq!(p.store.len().await, 3);
    assert_eq!(p.processor.stats().total_invalid, 1);
    assert_eq!(p.processor.stats().total_processed, 3);

    let group = consumer_config().stream_group();
    let pending = p.log.pending(&group, 10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, malformed);
}

#[tokio::test(start_paused = true)]
async fn test_commit_failure_rolls_back_whole_batch() {
    let mut p = pipeline(consumer_config(), reclaim_config(5)).await;

    for user in 1..=5 {
        append_event(&p.log, &page_view(user)).await;
    }
    p.store.fail_next_commits(1);

    let outcome = p.processor.run_once().await.unwrap();

    assert_eq!(outcome, BatchOutcome::Failed { events: 5 });
    assert!(p.store.is_empty().await);
    assert_eq!(p.processor.stats().total_errors, 5);
    assert_eq!(p.processor.stats().total_processed, 0);

    let group = consumer_config().stream_group();
    assert_eq!(p.log.pending(&group, 10).await.unwrap().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_batch_without_valid_events_acks_nothing() {
    let mut p = pipeline(consumer_config(), reclaim_config(5)).await;

    append_raw(&p.log, b"not json").await;
    append_raw(&p.log, b"{}").await;

    let outcome = p.processor.run_once().await.unwrap();

    assert_eq!(outcome, BatchOutcome::Empty);
    assert_eq!(p.processor.stats().total_invalid, 2);

    let group = consumer_config().stream_group();
    assert_eq!(p.log.pending(&group, 10).await.unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_batches_respect_batch_size() {
    let consumer = consumer_service::ConsumerConfig {
        batch_size: 4,
        ..consumer_config()
    };
    let mut p = pipeline(consumer, reclaim_config(5)).await;

    for user in 1..=10 {
        append_event(&p.log, &page_view(user)).await;
    }

    let mut sizes = Vec::new();
    for _ in 0..3 {
        match p.processor.run_once().await.unwrap() {
            BatchOutcome::Committed { inserted, .. } => sizes.push(inserted),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    assert_eq!(sizes, [4, 4, 2]);
    assert_eq!(p.store.len().await, 10);
}

#[tokio::test(start_paused = true)]
async fn test_redelivered_event_is_stored_once() {
    let mut p = pipeline(consumer_config(), reclaim_config(5)).await;
    let event = page_view(9);

    append_event(&p.log, &event).await;
    p.processor.run_once().await.unwrap();

    // the producer retried the append
    append_event(&p.log, &event).await;
    let outcome = p.processor.run_once().await.unwrap();

    assert_eq!(
        outcome,
        BatchOutcome::Committed {
            inserted: 0,
            duplicates: 1,
            acked: 1
        }
    );
    assert_eq!(p.store.len().await, 1);
    assert_eq!(p.processor.stats().total_processed, 2);
}

#[tokio::test(start_paused = true)]
async fn test_empty_read_times_out_quietly() {
    let mut p = pipeline(consumer_config(), reclaim_config(5)).await;

    assert_eq!(p.processor.run_once().await.unwrap(), BatchOutcome::Empty);
    assert_eq!(p.processor.stats().total_invalid, 0);
}
