//! Large inline attachment payloads never reach durable storage.

use crate::prelude::*;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use relay_adapters::MemoryAttachmentStorer;
use relay_core::{Attachment, Event, EventKind, EventMeta};
use relay_engine::EventBroadcaster;
use relay_storage::{AsyncHistoryStore, HistoryConfig, MemoryBackend};
use std::collections::HashMap;
use std::sync::Arc;

fn ten_megabyte_image(name: &str) -> Attachment {
    Attachment {
        name: name.to_string(),
        media_type: "image/png".to_string(),
        data: BASE64.encode(vec![0u8; 10 * 1024 * 1024]),
        ..Attachment::default()
    }
}

fn input_event(att: Attachment) -> Event {
    Event::input(
        EventMeta::for_session("s1").with_timestamp(1),
        "describe this image",
        HashMap::from([(att.name.clone(), att)]),
    )
}

fn persisted_attachment(history: &[Event], name: &str) -> Attachment {
    history
        .iter()
        .find_map(|e| match &e.base().kind {
            EventKind::InputReceived(input) => input.attachments.get(name).cloned(),
            _ => None,
        })
        .expect("input event persisted")
}

#[tokio::test]
async fn huge_inline_image_is_offloaded_when_storer_configured() {
    let storer = Arc::new(MemoryAttachmentStorer::new());
    let history = AsyncHistoryStore::spawn(
        Arc::new(MemoryBackend::new()),
        HistoryConfig::default(),
    );
    let hub = EventBroadcaster::default()
        .with_history(Arc::clone(&history))
        .with_attachment_storer(Arc::clone(&storer) as Arc<dyn relay_adapters::AttachmentStorer>);

    hub.emit(input_event(ten_megabyte_image("huge.png"))).await;

    let persisted = hub.get_history(&sid("s1")).await.unwrap();
    let att = persisted_attachment(&persisted, "huge.png");
    assert!(att.data.is_empty());
    assert!(att.uri.starts_with("mem://attachments/"));
    assert_eq!(storer.len(), 1);

    history.close().await.unwrap();
}

#[tokio::test]
async fn huge_inline_image_is_stripped_without_storer() {
    let hub = EventBroadcaster::default();

    let mut att = ten_megabyte_image("huge.png");
    att.uri = "https://cdn/huge.png".to_string();
    hub.emit(input_event(att)).await;

    let persisted = hub.get_history(&sid("s1")).await.unwrap();
    let att = persisted_attachment(&persisted, "huge.png");
    assert!(att.data.is_empty());
    // The pre-existing external URI survives.
    assert_eq!(att.uri, "https://cdn/huge.png");
}

#[tokio::test]
async fn broadcast_copy_keeps_inline_data_for_live_subscribers() {
    // Sanitization applies to the persisted copy, not the live fan-out.
    let hub = EventBroadcaster::default();
    let queue = relay_engine::EventQueue::bounded(4);
    hub.register_subscriber(&sid("s1"), Arc::clone(&queue));

    hub.emit(input_event(ten_megabyte_image("huge.png"))).await;

    let live = queue.try_recv().unwrap();
    let EventKind::InputReceived(input) = &live.kind else {
        panic!("expected input event");
    };
    assert!(!input.attachments["huge.png"].data.is_empty());
}
