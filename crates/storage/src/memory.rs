// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory history backend.
//!
//! The default backend for embedded use and tests. Events are held in
//! arrival order with a monotonic sequence.

use crate::{EventVisitor, HistoryBackend, HistoryError};
use async_trait::async_trait;
use parking_lot::Mutex;
use relay_core::{Event, HistoryFilter, SessionId};
#[cfg(any(test, feature = "test-support"))]
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
struct MemoryInner {
    next_seq: u64,
    events: Vec<(u64, Event)>,
}

/// History backend backed by a process-local vector.
#[derive(Default)]
pub struct MemoryBackend {
    inner: Mutex<MemoryInner>,
    #[cfg(any(test, feature = "test-support"))]
    fail_appends: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of retained events.
    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().events.is_empty()
    }

    /// Make subsequent appends fail, to exercise flush failure paths.
    #[cfg(any(test, feature = "test-support"))]
    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    fn check_injected_failure(&self) -> Result<(), HistoryError> {
        #[cfg(any(test, feature = "test-support"))]
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(HistoryError::Backend("injected append failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl HistoryBackend for MemoryBackend {
    async fn append(&self, event: &Event) -> Result<(), HistoryError> {
        self.check_injected_failure()?;
        let mut inner = self.inner.lock();
        inner.next_seq += 1;
        let seq = inner.next_seq;
        inner.events.push((seq, event.clone()));
        Ok(())
    }

    async fn append_batch(&self, events: &[Event]) -> Result<(), HistoryError> {
        self.check_injected_failure()?;
        let mut inner = self.inner.lock();
        for event in events {
            inner.next_seq += 1;
            let seq = inner.next_seq;
            inner.events.push((seq, event.clone()));
        }
        Ok(())
    }

    async fn stream(
        &self,
        filter: &HistoryFilter,
        visitor: EventVisitor<'_>,
    ) -> Result<(), HistoryError> {
        let matching: Vec<Event> = {
            let inner = self.inner.lock();
            inner
                .events
                .iter()
                .filter(|(_, e)| filter.matches(e))
                .map(|(_, e)| e.clone())
                .collect()
        };
        for event in matching {
            visitor(event);
        }
        Ok(())
    }

    async fn delete_session(&self, session_id: &SessionId) -> Result<(), HistoryError> {
        let mut inner = self.inner.lock();
        inner.events.retain(|(_, e)| e.meta.session_id != *session_id);
        Ok(())
    }

    async fn has_session_events(&self, session_id: &SessionId) -> Result<bool, HistoryError> {
        let inner = self.inner.lock();
        Ok(inner
            .events
            .iter()
            .any(|(_, e)| e.meta.session_id == *session_id))
    }

    async fn prune_before(&self, cutoff_ms: u64, limit: u64) -> Result<u64, HistoryError> {
        let mut inner = self.inner.lock();
        let mut deleted = 0u64;
        inner.events.retain(|(_, e)| {
            if deleted < limit && e.meta.timestamp_ms < cutoff_ms {
                deleted += 1;
                false
            } else {
                true
            }
        });
        Ok(deleted)
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
