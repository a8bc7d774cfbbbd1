// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The durable storage contract consumed by the async history store.

use crate::HistoryError;
use async_trait::async_trait;
use relay_core::{Event, HistoryFilter, SessionId};

/// Callback receiving replayed events in retained order.
pub type EventVisitor<'a> = &'a mut (dyn FnMut(Event) + Send);

/// Durable event storage.
///
/// The async history store is the sole writer under this layer; reads may
/// come from any task. Implementations stamp a monotonic sequence so
/// replay observes arrival order.
#[async_trait]
pub trait HistoryBackend: Send + Sync + 'static {
    /// Persist one event.
    async fn append(&self, event: &Event) -> Result<(), HistoryError>;

    /// Persist a batch of events. The default delegates to serial
    /// `append`; backends with cheaper batch paths override it.
    async fn append_batch(&self, events: &[Event]) -> Result<(), HistoryError> {
        for event in events {
            self.append(event).await?;
        }
        Ok(())
    }

    /// Replay retained events matching `filter` in sequence order.
    async fn stream(
        &self,
        filter: &HistoryFilter,
        visitor: EventVisitor<'_>,
    ) -> Result<(), HistoryError>;

    /// Delete every retained event of a session.
    async fn delete_session(&self, session_id: &SessionId) -> Result<(), HistoryError>;

    /// Whether any event of the session is retained.
    async fn has_session_events(&self, session_id: &SessionId) -> Result<bool, HistoryError>;

    /// Best-effort retention pruning: delete up to `limit` events older
    /// than `cutoff_ms`. Returns the number deleted. The default is a
    /// no-op for backends without retention support.
    async fn prune_before(&self, cutoff_ms: u64, limit: u64) -> Result<u64, HistoryError> {
        let _ = (cutoff_ms, limit);
        Ok(0)
    }
}
