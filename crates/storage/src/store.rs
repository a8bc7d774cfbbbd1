// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Asynchronous, batching history store.
//!
//! Decouples latency-sensitive event producers from slow durable storage:
//! appends land on a bounded channel with a short timed wait, a single
//! background worker batches them into the backend, and reads flush first
//! so `stream` after a successful `append` always observes that append.

use crate::{HistoryBackend, HistoryError};
use parking_lot::Mutex;
use relay_core::{Event, HistoryFilter, SessionId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Deadline for one backend flush, independent of any caller deadline.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// After a failed flush, ticker-driven flushes are skipped for this long.
/// Explicit flush requests are always honored.
const FLUSH_FAILURE_BACKOFF: Duration = Duration::from_secs(1);

/// Tuning for the async history store and retention pruning.
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    /// Max events per flush.
    pub batch_size: usize,
    /// Ticker period for time-driven flushes.
    pub flush_interval: Duration,
    /// Max wait when the append queue is full.
    pub append_timeout: Duration,
    /// Bounded append channel size.
    pub queue_capacity: usize,
    /// Events older than this are pruned. Zero disables retention.
    pub retention_window: Duration,
    /// Minimum gap between prune passes.
    pub retention_interval: Duration,
    /// Events deleted per prune pass.
    pub retention_batch: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            batch_size: 200,
            flush_interval: Duration::from_millis(250),
            append_timeout: Duration::from_millis(50),
            queue_capacity: 8192,
            retention_window: Duration::ZERO,
            retention_interval: Duration::from_secs(600),
            retention_batch: 1000,
        }
    }
}

enum ControlMsg {
    Flush(oneshot::Sender<Result<(), HistoryError>>),
    Shutdown(oneshot::Sender<()>),
}

/// Batching writer in front of a [`HistoryBackend`].
///
/// The worker task is the sole writer to the backend. `stream`,
/// `delete_session`, and `has_session_events` flush pending events and
/// wait for the result before consulting the backend.
pub struct AsyncHistoryStore {
    backend: Arc<dyn HistoryBackend>,
    event_tx: mpsc::Sender<Event>,
    control_tx: mpsc::Sender<ControlMsg>,
    worker: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
    append_timeout: Duration,
}

impl AsyncHistoryStore {
    /// Start the store's background worker.
    pub fn spawn(backend: Arc<dyn HistoryBackend>, config: HistoryConfig) -> Arc<Self> {
        let (store, event_rx, control_rx) = Self::channels(backend, &config);
        let worker = Worker {
            backend: Arc::clone(&store.backend),
            buffer: Vec::new(),
            batch_size: config.batch_size.max(1),
            backoff_until: None,
        };
        let handle = tokio::spawn(worker.run(event_rx, control_rx, config.flush_interval));
        *store.worker.lock() = Some(handle);
        store
    }

    /// Build the store without a worker, so tests can exercise queue
    /// behavior with no consumer draining it.
    #[cfg(any(test, feature = "test-support"))]
    pub fn without_worker(
        backend: Arc<dyn HistoryBackend>,
        config: HistoryConfig,
    ) -> (Arc<Self>, DetachedQueues) {
        let (store, event_rx, control_rx) = Self::channels(backend, &config);
        (
            store,
            DetachedQueues {
                _event_rx: event_rx,
                _control_rx: control_rx,
            },
        )
    }

    fn channels(
        backend: Arc<dyn HistoryBackend>,
        config: &HistoryConfig,
    ) -> (Arc<Self>, mpsc::Receiver<Event>, mpsc::Receiver<ControlMsg>) {
        let (event_tx, event_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (control_tx, control_rx) = mpsc::channel(8);
        let store = Arc::new(Self {
            backend,
            event_tx,
            control_tx,
            worker: Mutex::new(None),
            closed: AtomicBool::new(false),
            append_timeout: config.append_timeout,
        });
        (store, event_rx, control_rx)
    }

    /// Enqueue an event for persistence. Latency-critical: a full queue
    /// is waited on for at most the configured append timeout.
    pub async fn append(&self, event: Event) -> Result<(), HistoryError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(HistoryError::Closed);
        }
        match self.event_tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Closed(_)) => Err(HistoryError::Closed),
            Err(TrySendError::Full(event)) => {
                match tokio::time::timeout(self.append_timeout, self.event_tx.send(event)).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(_)) => Err(HistoryError::Closed),
                    Err(_) => Err(HistoryError::QueueFull),
                }
            }
        }
    }

    /// Flush buffered events to the backend and wait for the result.
    pub async fn flush(&self) -> Result<(), HistoryError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.control_tx
            .send(ControlMsg::Flush(reply_tx))
            .await
            .map_err(|_| HistoryError::Closed)?;
        reply_rx.await.map_err(|_| HistoryError::Cancelled)?
    }

    /// Replay retained events. Flushes first so a successful `append`
    /// is always observed.
    pub async fn stream(
        &self,
        filter: &HistoryFilter,
        visitor: crate::EventVisitor<'_>,
    ) -> Result<(), HistoryError> {
        self.flush().await?;
        self.backend.stream(filter, visitor).await
    }

    /// Delete a session's retained events. Flushes first so in-flight
    /// events of the session do not survive the delete.
    pub async fn delete_session(&self, session_id: &SessionId) -> Result<(), HistoryError> {
        self.flush().await?;
        self.backend.delete_session(session_id).await
    }

    pub async fn has_session_events(&self, session_id: &SessionId) -> Result<bool, HistoryError> {
        self.flush().await?;
        self.backend.has_session_events(session_id).await
    }

    /// Shut down the worker after a final flush. Idempotent.
    pub async fn close(&self) -> Result<(), HistoryError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let (done_tx, done_rx) = oneshot::channel();
        if self
            .control_tx
            .send(ControlMsg::Shutdown(done_tx))
            .await
            .is_ok()
        {
            let _ = done_rx.await;
        }
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        Ok(())
    }
}

/// Holds the unconsumed channel ends of a store built with
/// [`AsyncHistoryStore::without_worker`].
#[cfg(any(test, feature = "test-support"))]
pub struct DetachedQueues {
    _event_rx: mpsc::Receiver<Event>,
    _control_rx: mpsc::Receiver<ControlMsg>,
}

struct Worker {
    backend: Arc<dyn HistoryBackend>,
    buffer: Vec<Event>,
    batch_size: usize,
    backoff_until: Option<Instant>,
}

impl Worker {
    async fn run(
        mut self,
        mut event_rx: mpsc::Receiver<Event>,
        mut control_rx: mpsc::Receiver<ControlMsg>,
        flush_interval: Duration,
    ) {
        let mut ticker = tokio::time::interval(flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                Some(msg) = control_rx.recv() => match msg {
                    ControlMsg::Flush(reply) => {
                        self.drain_pending(&mut event_rx);
                        let result = self.flush().await;
                        let _ = reply.send(result);
                    }
                    ControlMsg::Shutdown(done) => {
                        self.drain_pending(&mut event_rx);
                        self.flush_logged().await;
                        let _ = done.send(());
                        return;
                    }
                },

                maybe_event = event_rx.recv() => match maybe_event {
                    Some(event) => {
                        self.buffer.push(event);
                        if self.buffer.len() >= self.batch_size {
                            self.flush_logged().await;
                        }
                    }
                    // All senders dropped: final flush, exit.
                    None => {
                        self.flush_logged().await;
                        return;
                    }
                },

                _ = ticker.tick() => {
                    if !self.buffer.is_empty() && !self.in_backoff() {
                        self.flush_logged().await;
                    }
                }
            }
        }
    }

    fn drain_pending(&mut self, event_rx: &mut mpsc::Receiver<Event>) {
        while let Ok(event) = event_rx.try_recv() {
            self.buffer.push(event);
        }
    }

    fn in_backoff(&self) -> bool {
        self.backoff_until.is_some_and(|until| Instant::now() < until)
    }

    /// Write the buffer to the backend under the flush deadline.
    ///
    /// The buffer is cleared whether or not the write succeeds; a failed
    /// batch is not retried (the backoff only suppresses ticker flushes).
    async fn flush(&mut self) -> Result<(), HistoryError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.buffer);
        let result = match tokio::time::timeout(FLUSH_TIMEOUT, self.backend.append_batch(&batch))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(HistoryError::Timeout),
        };
        match &result {
            Ok(()) => {
                self.backoff_until = None;
                debug!(events = batch.len(), "flushed history batch");
            }
            Err(e) => {
                self.backoff_until = Some(Instant::now() + FLUSH_FAILURE_BACKOFF);
                warn!(events = batch.len(), error = %e, "history flush failed, batch dropped");
            }
        }
        result
    }

    async fn flush_logged(&mut self) {
        // Error already logged inside flush; nothing more to do here.
        let _ = self.flush().await;
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
