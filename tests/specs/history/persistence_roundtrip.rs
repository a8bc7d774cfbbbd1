//! Persisted events survive a store → stream → decode round trip on
//! every backend.

use crate::prelude::*;
use relay_core::{event_types, Event, EventMeta, HistoryFilter, SubtaskDetails};
use relay_storage::{HistoryBackend, JsonlBackend, MemoryBackend, SqliteBackend};
use serde_json::Value;

fn rich_event() -> Event {
    Event::wrap_subtask(
        SubtaskDetails {
            index: 1,
            total: 3,
            preview: "shard".to_string(),
            max_parallel: 2,
        },
        Event::envelope(
            EventMeta::for_session("s1")
                .with_task("t1")
                .with_timestamp(42),
            event_types::RESULT_FINAL,
            [
                ("answer".to_string(), Value::from("done")),
                ("iterations".to_string(), Value::from(3)),
            ]
            .into_iter()
            .collect(),
        ),
    )
}

async fn roundtrip(backend: &dyn HistoryBackend) {
    let original = rich_event();
    backend.append(&original).await.unwrap();

    let mut seen = Vec::new();
    backend
        .stream(&HistoryFilter::session("s1"), &mut |e| seen.push(e))
        .await
        .unwrap();

    assert_eq!(seen.len(), 1);
    let decoded = &seen[0];
    // Base fields, event type, and wrapper metadata all survive.
    assert_eq!(decoded, &original);
    assert_eq!(decoded.base().event_type(), event_types::RESULT_FINAL);
    assert_eq!(decoded.subtask_details().map(|d| d.total), Some(3));
    assert_eq!(decoded.base().meta.task_id, "t1");
}

#[tokio::test]
async fn memory_backend_roundtrip() {
    roundtrip(&MemoryBackend::new()).await;
}

#[tokio::test]
async fn jsonl_backend_roundtrip() {
    let dir = tempfile::TempDir::new().unwrap();
    let backend = JsonlBackend::open(&dir.path().join("events.jsonl")).unwrap();
    roundtrip(&backend).await;
}

#[tokio::test]
async fn sqlite_backend_roundtrip() {
    let backend = SqliteBackend::open_in_memory().unwrap();
    roundtrip(&backend).await;
}

#[tokio::test]
async fn clear_then_stream_yields_nothing() {
    let stack = Stack::new();
    stack
        .broadcaster
        .emit(envelope("s1", event_types::NODE_STARTED, 1))
        .await;
    assert_eq!(stack.broadcaster.get_history(&sid("s1")).await.unwrap().len(), 1);

    stack.broadcaster.clear_history(&sid("s1")).await.unwrap();
    assert!(stack
        .broadcaster
        .get_history(&sid("s1"))
        .await
        .unwrap()
        .is_empty());

    stack.history.close().await.unwrap();
}
