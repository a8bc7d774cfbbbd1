// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded per-subscriber event queue.
//!
//! A tokio `mpsc` sender cannot drain its own receiver, which the
//! critical-event drop-oldest override requires, so subscribers register
//! this explicit queue instead: a bounded buffer the broadcaster pushes
//! into and the client awaits on.

use parking_lot::Mutex;
use relay_core::Event;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;

/// Bounded FIFO of events for one subscriber.
pub struct EventQueue {
    capacity: usize,
    inner: Mutex<VecDeque<Event>>,
    notify: Notify,
}

impl EventQueue {
    /// Create a queue holding at most `capacity` events (min 1).
    pub fn bounded(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity: capacity.max(1),
            inner: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Non-blocking push. Returns the event back when the queue is full.
    pub fn try_push(&self, event: Event) -> Result<(), Event> {
        {
            let mut inner = self.inner.lock();
            if inner.len() >= self.capacity {
                return Err(event);
            }
            inner.push_back(event);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Remove and return the oldest buffered event, if any.
    pub fn drop_oldest(&self) -> Option<Event> {
        self.inner.lock().pop_front()
    }

    /// Non-blocking receive.
    pub fn try_recv(&self) -> Option<Event> {
        self.inner.lock().pop_front()
    }

    /// Wait until an event is available and return it.
    pub async fn recv(&self) -> Event {
        loop {
            // Register interest before checking, so a push between the
            // check and the await cannot be missed.
            let notified = self.notify.notified();
            if let Some(event) = self.try_recv() {
                return event;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
