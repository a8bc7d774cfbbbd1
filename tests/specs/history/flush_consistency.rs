//! Reads flush pending writes first: stream-after-append always observes
//! the append.

use crate::prelude::*;
use relay_core::{event_types, HistoryFilter};
use relay_storage::{AsyncHistoryStore, HistoryConfig, HistoryError, MemoryBackend};
use std::sync::Arc;
use std::time::Duration;

fn slow_ticker_config() -> HistoryConfig {
    // The ticker never fires during the test; only the flush-on-read
    // contract can make the event visible.
    HistoryConfig {
        flush_interval: Duration::from_secs(3600),
        ..HistoryConfig::default()
    }
}

#[tokio::test]
async fn stream_observes_enqueued_event_exactly_once() {
    let store = AsyncHistoryStore::spawn(Arc::new(MemoryBackend::new()), slow_ticker_config());

    store
        .append(envelope("s1", event_types::NODE_STARTED, 1))
        .await
        .unwrap();

    let mut seen = Vec::new();
    store
        .stream(&HistoryFilter::session("s1"), &mut |e| seen.push(e))
        .await
        .unwrap();
    assert_eq!(seen.len(), 1);

    // A second read observes it exactly once more, not twice.
    let mut seen = Vec::new();
    store
        .stream(&HistoryFilter::session("s1"), &mut |e| seen.push(e))
        .await
        .unwrap();
    assert_eq!(seen.len(), 1);

    store.close().await.unwrap();
}

#[tokio::test]
async fn has_and_delete_flush_first_too() {
    let store = AsyncHistoryStore::spawn(Arc::new(MemoryBackend::new()), slow_ticker_config());

    store
        .append(envelope("s1", event_types::NODE_STARTED, 1))
        .await
        .unwrap();
    assert!(store.has_session_events(&sid("s1")).await.unwrap());

    store
        .append(envelope("s1", event_types::NODE_STARTED, 2))
        .await
        .unwrap();
    store.delete_session(&sid("s1")).await.unwrap();
    assert!(!store.has_session_events(&sid("s1")).await.unwrap());

    store.close().await.unwrap();
}

#[tokio::test]
async fn close_is_idempotent_and_final() {
    let backend = Arc::new(MemoryBackend::new());
    let store = AsyncHistoryStore::spawn(backend.clone(), slow_ticker_config());

    store
        .append(envelope("s1", event_types::NODE_STARTED, 1))
        .await
        .unwrap();
    store.close().await.unwrap();
    store.close().await.unwrap();

    assert_eq!(backend.len(), 1);
    assert!(matches!(
        store
            .append(envelope("s1", event_types::NODE_STARTED, 2))
            .await,
        Err(HistoryError::Closed)
    ));
    assert_eq!(backend.len(), 1);
}
