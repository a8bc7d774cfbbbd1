//! Per-session delivery order matches emission order; a subscriber sees a
//! contiguous subsequence even under drops.

use crate::prelude::*;
use relay_core::event_types;
use relay_engine::{EventBroadcaster, EventQueue};
use std::sync::Arc;

#[tokio::test]
async fn subscriber_observes_emission_order() {
    let hub = EventBroadcaster::default();
    let queue = EventQueue::bounded(64);
    hub.register_subscriber(&sid("s1"), Arc::clone(&queue));

    for ts in 0..20 {
        hub.emit(envelope("s1", event_types::NODE_STARTED, ts)).await;
    }

    let mut seen = Vec::new();
    while let Some(event) = queue.try_recv() {
        seen.push(event.meta.timestamp_ms);
    }
    assert_eq!(seen, (0..20).collect::<Vec<_>>());
}

#[tokio::test]
async fn concurrent_producers_preserve_per_session_fifo() {
    let hub = Arc::new(EventBroadcaster::default());
    let q1 = EventQueue::bounded(256);
    let q2 = EventQueue::bounded(256);
    hub.register_subscriber(&sid("a"), Arc::clone(&q1));
    hub.register_subscriber(&sid("b"), Arc::clone(&q2));

    let producer = |session: &'static str| {
        let hub = Arc::clone(&hub);
        tokio::spawn(async move {
            for ts in 0..100 {
                hub.emit(envelope(session, event_types::NODE_STARTED, ts))
                    .await;
            }
        })
    };
    let (ra, rb) = tokio::join!(producer("a"), producer("b"));
    ra.unwrap();
    rb.unwrap();

    for queue in [&q1, &q2] {
        let mut previous = None;
        while let Some(event) = queue.try_recv() {
            let ts = event.meta.timestamp_ms;
            if let Some(prev) = previous {
                assert!(ts > prev, "per-session order violated: {ts} after {prev}");
            }
            previous = Some(ts);
        }
        assert_eq!(previous, Some(99));
    }
}
