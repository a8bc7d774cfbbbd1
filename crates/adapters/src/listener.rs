// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event listener contract.
//!
//! The interface the broadcaster satisfies, and the channel through which
//! an agent execution reports its progress.

use async_trait::async_trait;
use relay_core::Event;

/// Receives events produced during a task execution.
#[async_trait]
pub trait EventListener: Send + Sync + 'static {
    async fn on_event(&self, event: Event);
}

/// Listener that records every event it sees, for tests.
#[cfg(any(test, feature = "test-support"))]
#[derive(Default)]
pub struct CollectingListener {
    events: parking_lot::Mutex<Vec<Event>>,
}

#[cfg(any(test, feature = "test-support"))]
impl CollectingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl EventListener for CollectingListener {
    async fn on_event(&self, event: Event) {
        self.events.lock().push(event);
    }
}
