// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! relay-engine: the real-time distribution core.
//!
//! Wires the event broadcaster, task lifecycle registry, async task
//! executor facade, and session services on top of relay-core and
//! relay-storage.

pub mod broadcaster;
pub mod error;
pub mod executor;
pub mod listener;
pub mod metrics;
pub mod queue;
pub mod sanitize;
pub mod session;
pub mod task_store;

pub use broadcaster::{BroadcasterConfig, EventBroadcaster};
pub use error::DispatchError;
pub use executor::{ExecutorConfig, ExecutorDeps, TaskExecutor, TaskRequest};
pub use listener::{MultiListener, ProgressState, ProgressTracker};
pub use metrics::{BroadcastMetrics, MetricsSnapshot, SessionQueueDepth};
pub use queue::EventQueue;
pub use sanitize::{sanitize_attachment, sanitize_event, MAX_INLINE_TEXT_BYTES};
pub use session::SessionService;
pub use task_store::{ProgressSink, TaskStore};
