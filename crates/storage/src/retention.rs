// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Best-effort retention pruning.
//!
//! A background task deletes events older than the configured window in
//! bounded batches, at most once per retention interval.

use crate::{HistoryBackend, HistoryConfig};
use relay_core::Clock;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Handle to the periodic prune task.
pub struct RetentionPruner {
    handle: JoinHandle<()>,
    shutdown_tx: oneshot::Sender<()>,
}

impl RetentionPruner {
    /// Start pruning with the given config. Returns `None` when the
    /// retention window is zero (retention disabled).
    pub fn spawn<C: Clock>(
        backend: Arc<dyn HistoryBackend>,
        config: HistoryConfig,
        clock: C,
    ) -> Option<Self> {
        if config.retention_window.is_zero() {
            return None;
        }
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let window_ms = config.retention_window.as_millis() as u64;
        let batch = config.retention_batch.max(1);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.retention_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => return,
                    _ = ticker.tick() => {
                        let cutoff_ms = clock.epoch_ms().saturating_sub(window_ms);
                        match backend.prune_before(cutoff_ms, batch).await {
                            Ok(0) => {}
                            Ok(deleted) => {
                                debug!(deleted, cutoff_ms, "pruned expired history events");
                            }
                            Err(e) => {
                                warn!(error = %e, "history retention prune failed");
                            }
                        }
                    }
                }
            }
        });

        Some(Self {
            handle,
            shutdown_tx,
        })
    }

    /// Stop the prune task and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.handle.await;
    }
}

#[cfg(test)]
#[path = "retention_tests.rs"]
mod tests;
