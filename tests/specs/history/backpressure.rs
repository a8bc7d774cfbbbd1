//! Bounded-queue backpressure surfaces as QueueFull, never as blocking.

use crate::prelude::*;
use relay_core::event_types;
use relay_storage::{AsyncHistoryStore, HistoryConfig, HistoryError, MemoryBackend};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn third_append_fails_queue_full_with_no_consumer() {
    // Queue capacity 2, append timeout 1ms, no consumer.
    let (store, _queues) = AsyncHistoryStore::without_worker(
        Arc::new(MemoryBackend::new()),
        HistoryConfig {
            queue_capacity: 2,
            append_timeout: Duration::from_millis(1),
            ..HistoryConfig::default()
        },
    );

    store
        .append(envelope("s1", event_types::NODE_STARTED, 1))
        .await
        .unwrap();
    store
        .append(envelope("s1", event_types::NODE_STARTED, 2))
        .await
        .unwrap();

    let err = store
        .append(envelope("s1", event_types::NODE_STARTED, 3))
        .await
        .unwrap_err();
    assert!(matches!(err, HistoryError::QueueFull));
}

#[tokio::test]
async fn producer_side_emit_never_fails_on_backpressure() {
    // A broadcaster in front of a saturated store logs and counts, but
    // the producer-facing emit still returns.
    let (history, _queues) = AsyncHistoryStore::without_worker(
        Arc::new(MemoryBackend::new()),
        HistoryConfig {
            queue_capacity: 1,
            append_timeout: Duration::from_millis(1),
            ..HistoryConfig::default()
        },
    );
    let hub = relay_engine::EventBroadcaster::default().with_history(history);

    for ts in 0..5 {
        hub.emit(envelope("s1", event_types::NODE_STARTED, ts)).await;
    }
}
