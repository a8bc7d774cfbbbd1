// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broadcast delivery metrics.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters updated on the emit path.
#[derive(Debug, Default)]
pub struct BroadcastMetrics {
    total_events_sent: AtomicU64,
    dropped_events: AtomicU64,
    total_connections: AtomicU64,
    active_connections: AtomicU64,
}

impl BroadcastMetrics {
    pub fn record_sent(&self) {
        self.total_events_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                n.checked_sub(1)
            });
    }

    pub fn events_sent(&self) -> u64 {
        self.total_events_sent.load(Ordering::Relaxed)
    }

    pub fn events_dropped(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }
}

/// Point-in-time view of the broadcaster, for diagnostics endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_events_sent: u64,
    pub dropped_events: u64,
    pub total_connections: u64,
    pub active_connections: u64,
    pub session_count: usize,
    pub sessions: Vec<SessionQueueDepth>,
}

/// Per-session subscriber buffer depth.
#[derive(Debug, Clone, Serialize)]
pub struct SessionQueueDepth {
    pub session_id: String,
    pub subscribers: usize,
    pub buffered_events: usize,
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
