// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener composition for task workers.

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_adapters::EventListener;
use relay_core::{Event, ProgressSignal};
use std::sync::Arc;

/// Fans events out to several listeners, in registration order.
pub struct MultiListener {
    listeners: Vec<Arc<dyn EventListener>>,
}

impl MultiListener {
    pub fn new(listeners: Vec<Arc<dyn EventListener>>) -> Self {
        Self { listeners }
    }
}

#[async_trait]
impl EventListener for MultiListener {
    async fn on_event(&self, event: Event) {
        for listener in &self.listeners {
            listener.on_event(event.clone()).await;
        }
    }
}

/// Latest progress observed by a [`ProgressTracker`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressState {
    pub current_iteration: u32,
    pub tokens_used: u64,
    pub total_iterations: u32,
    pub total_tokens: u64,
}

/// Listener that tracks the newest progress signal seen on the stream.
///
/// Late out-of-order events never regress the counters.
#[derive(Default)]
pub struct ProgressTracker {
    state: Mutex<ProgressState>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> ProgressState {
        *self.state.lock()
    }
}

#[async_trait]
impl EventListener for ProgressTracker {
    async fn on_event(&self, event: Event) {
        let Some(signal) = event.progress_signal() else {
            return;
        };
        let mut state = self.state.lock();
        match signal {
            ProgressSignal::NodeStarted { iteration } => {
                state.current_iteration = state.current_iteration.max(iteration);
            }
            ProgressSignal::NodeCompleted {
                iteration,
                tokens_used,
            } => {
                state.current_iteration = state.current_iteration.max(iteration);
                state.tokens_used = state.tokens_used.max(tokens_used);
            }
            ProgressSignal::FinalResult {
                total_iterations,
                total_tokens,
            } => {
                state.total_iterations = state.total_iterations.max(total_iterations);
                state.total_tokens = state.total_tokens.max(total_tokens);
            }
        }
    }
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
