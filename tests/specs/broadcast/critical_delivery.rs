//! Critical events override drop-on-full by evicting the oldest event.

use crate::prelude::*;
use relay_core::event_types;
use relay_engine::{EventBroadcaster, EventQueue};
use std::sync::Arc;

#[tokio::test]
async fn critical_event_displaces_oldest_on_full_queue() {
    // Subscriber queue capacity 1, pre-filled with a non-critical event.
    let hub = EventBroadcaster::default();
    let queue = EventQueue::bounded(1);
    hub.register_subscriber(&sid("s1"), Arc::clone(&queue));

    hub.emit(envelope("s1", event_types::NODE_STARTED, 1)).await;
    // Dropped: queue full, not critical.
    hub.emit(envelope("s1", event_types::NODE_STARTED, 2)).await;
    assert_eq!(hub.metrics().events_dropped(), 1);

    hub.emit(final_result("s1")).await;

    let delivered = queue.try_recv().unwrap();
    assert_eq!(delivered.base().event_type(), event_types::RESULT_FINAL);
    assert!(queue.try_recv().is_none());
    assert_eq!(hub.metrics().events_dropped(), 1);
    assert_eq!(hub.metrics().events_sent(), 2);
}

#[tokio::test]
async fn critical_delivery_reaches_every_registered_subscriber() {
    let hub = EventBroadcaster::default();
    let queues: Vec<_> = (0..4).map(|_| EventQueue::bounded(1)).collect();
    for queue in &queues {
        hub.register_subscriber(&sid("s1"), Arc::clone(queue));
    }
    // Saturate every queue.
    hub.emit(envelope("s1", event_types::NODE_STARTED, 1)).await;

    hub.emit(final_result("s1")).await;

    for queue in &queues {
        let delivered = queue.try_recv().unwrap();
        assert_eq!(delivered.base().event_type(), event_types::RESULT_FINAL);
    }
}
