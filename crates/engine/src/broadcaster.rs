// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session-keyed event fan-out hub.
//!
//! The sole ingress for task events: classifies, sanitizes and persists
//! the retained subset, feeds task progress, and fans out to subscriber
//! queues with a drop-on-full policy that critical events override by
//! dropping the oldest buffered event instead.

use crate::metrics::{BroadcastMetrics, MetricsSnapshot, SessionQueueDepth};
use crate::queue::EventQueue;
use crate::sanitize::sanitize_event;
use crate::task_store::ProgressSink;
use crate::DispatchError;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use relay_adapters::{AttachmentStorer, EventListener};
use relay_core::{
    is_critical, is_high_volume, should_persist, Attachment, Event, EventKind, HistoryFilter,
    ProgressSignal, SessionId, TaskId,
};
use relay_storage::{AsyncHistoryStore, EventVisitor};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tuning for the broadcaster.
#[derive(Debug, Clone)]
pub struct BroadcasterConfig {
    /// In-memory ring size per session when no history store is wired.
    pub max_history: usize,
    /// Log every Nth suppressed high-volume event.
    pub high_volume_log_every: u64,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            max_history: 1000,
            high_volume_log_every: 10,
        }
    }
}

/// Session-keyed pub/sub hub with bounded subscriber buffers.
pub struct EventBroadcaster {
    config: BroadcasterConfig,
    subscribers: RwLock<HashMap<SessionId, Vec<Arc<EventQueue>>>>,
    task_sessions: RwLock<HashMap<SessionId, TaskId>>,
    history: Option<Arc<AsyncHistoryStore>>,
    progress: Option<Arc<dyn ProgressSink>>,
    storer: Option<Arc<dyn AttachmentStorer>>,
    session_history: Mutex<HashMap<SessionId, VecDeque<Event>>>,
    global_history: Mutex<VecDeque<Event>>,
    session_attachments: Mutex<HashMap<SessionId, HashMap<String, Attachment>>>,
    high_volume_counts: Mutex<HashMap<SessionId, u64>>,
    no_subscriber_logged: Mutex<HashSet<SessionId>>,
    metrics: BroadcastMetrics,
}

impl EventBroadcaster {
    pub fn new(config: BroadcasterConfig) -> Self {
        Self {
            config,
            subscribers: RwLock::new(HashMap::new()),
            task_sessions: RwLock::new(HashMap::new()),
            history: None,
            progress: None,
            storer: None,
            session_history: Mutex::new(HashMap::new()),
            global_history: Mutex::new(VecDeque::new()),
            session_attachments: Mutex::new(HashMap::new()),
            high_volume_counts: Mutex::new(HashMap::new()),
            no_subscriber_logged: Mutex::new(HashSet::new()),
            metrics: BroadcastMetrics::default(),
        }
    }

    /// Persist retained events through the async store instead of the
    /// in-memory ring.
    pub fn with_history(mut self, history: Arc<AsyncHistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    /// Wire task progress updates derived from observed events.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Offload large binary attachment payloads during sanitization.
    pub fn with_attachment_storer(mut self, storer: Arc<dyn AttachmentStorer>) -> Self {
        self.storer = Some(storer);
        self
    }

    // --- subscriptions ---

    /// Add a subscriber queue to a session's fan-out list.
    pub fn register_subscriber(&self, session_id: &SessionId, queue: Arc<EventQueue>) {
        self.subscribers
            .write()
            .entry(session_id.clone())
            .or_default()
            .push(queue);
        self.no_subscriber_logged.lock().remove(session_id);
        self.metrics.connection_opened();
        debug!(session = %session_id.short(12), "subscriber registered");
    }

    /// Remove one matching queue. When the session has no subscribers
    /// left, its auxiliary counters and accumulated attachments are
    /// released.
    pub fn unregister_subscriber(&self, session_id: &SessionId, queue: &Arc<EventQueue>) {
        let last_gone = {
            let mut subscribers = self.subscribers.write();
            let Some(list) = subscribers.get_mut(session_id) else {
                return;
            };
            let Some(pos) = list.iter().position(|q| Arc::ptr_eq(q, queue)) else {
                return;
            };
            list.remove(pos);
            self.metrics.connection_closed();
            if list.is_empty() {
                subscribers.remove(session_id);
                true
            } else {
                false
            }
        };

        if last_gone {
            self.high_volume_counts.lock().remove(session_id);
            let attachments = self.session_attachments.lock().remove(session_id);
            if let Some(attachments) = attachments {
                if !attachments.is_empty() {
                    // Export hook: downstream exporters read this signal.
                    info!(
                        session = %session_id.short(12),
                        attachments = attachments.len(),
                        "last subscriber left session with accumulated attachments",
                    );
                }
            }
        }
        debug!(session = %session_id.short(12), "subscriber unregistered");
    }

    /// Bind progress updates for a session's events to a task record.
    pub fn register_task_session(&self, session_id: &SessionId, task_id: &TaskId) {
        self.task_sessions
            .write()
            .insert(session_id.clone(), task_id.clone());
    }

    pub fn unregister_task_session(&self, session_id: &SessionId) {
        self.task_sessions.write().remove(session_id);
    }

    // --- ingress ---

    /// The sole event ingress, invoked from any producer task.
    ///
    /// Never fails toward the producer: persistence problems are logged
    /// and counted, full subscriber buffers drop events (oldest-first for
    /// critical events).
    pub async fn emit(&self, event: Event) {
        let base_type = event.base().event_type().to_string();
        let session_id = event.meta.session_id.clone();

        if is_high_volume(&base_type) {
            let suppressed = {
                let mut counts = self.high_volume_counts.lock();
                let count = counts.entry(session_id.clone()).or_insert(0);
                *count += 1;
                *count
            };
            if suppressed % self.config.high_volume_log_every.max(1) == 0 {
                debug!(
                    session = %session_id.short(12),
                    event_type = %base_type,
                    suppressed,
                    "high-volume event stream",
                );
            }
        } else {
            debug!("{}", event.log_summary());
        }

        if should_persist(&event) {
            // Clone-before-mutate: the emitted event is shared read-only.
            let sanitized = sanitize_event(&event, self.storer.as_deref()).await;
            self.accumulate_attachments(&sanitized);
            if let Some(history) = &self.history {
                if let Err(e) = history.append(sanitized).await {
                    warn!(error = %e, event_type = %base_type, "history append failed, event not persisted");
                }
            } else {
                self.push_memory_history(sanitized);
            }
        }

        if let Some(signal) = event.progress_signal() {
            self.apply_progress(&session_id, signal);
        }

        let targets: Vec<Arc<EventQueue>> = {
            let subscribers = self.subscribers.read();
            if session_id.is_empty() {
                subscribers.values().flatten().cloned().collect()
            } else {
                subscribers.get(&session_id).cloned().unwrap_or_default()
            }
        };

        if targets.is_empty() {
            if self.no_subscriber_logged.lock().insert(session_id.clone()) {
                debug!(session = %session_id.short(12), "no subscribers for session");
            }
            return;
        }

        let critical = is_critical(&event);
        for queue in &targets {
            self.deliver(queue, event.clone(), critical);
        }
    }

    /// Non-blocking push with the critical-event drop-oldest override.
    fn deliver(&self, queue: &EventQueue, event: Event, critical: bool) {
        let event = match queue.try_push(event) {
            Ok(()) => {
                self.metrics.record_sent();
                return;
            }
            Err(event) => event,
        };

        if !critical {
            self.metrics.record_dropped();
            return;
        }

        // The consumer may have drained between attempts.
        let event = match queue.try_push(event) {
            Ok(()) => {
                self.metrics.record_sent();
                return;
            }
            Err(event) => event,
        };

        if queue.drop_oldest().is_some() {
            debug!(
                event_type = %event.base().event_type(),
                "dropped oldest buffered event to deliver critical event",
            );
        }
        match queue.try_push(event) {
            Ok(()) => self.metrics.record_sent(),
            Err(event) => {
                self.metrics.record_dropped();
                warn!(
                    event_type = %event.base().event_type(),
                    "critical event dropped, subscriber queue still full",
                );
            }
        }
    }

    fn apply_progress(&self, session_id: &SessionId, signal: ProgressSignal) {
        let Some(progress) = &self.progress else {
            return;
        };
        let task_id = {
            let task_sessions = self.task_sessions.read();
            task_sessions.get(session_id).cloned()
        };
        let Some(task_id) = task_id else {
            return;
        };
        match signal {
            ProgressSignal::NodeStarted { iteration } => {
                progress.update_progress(&task_id, iteration, None);
            }
            ProgressSignal::NodeCompleted {
                iteration,
                tokens_used,
            } => {
                progress.update_progress(&task_id, iteration, Some(tokens_used));
            }
            ProgressSignal::FinalResult {
                total_iterations,
                total_tokens,
            } => {
                progress.update_totals(&task_id, total_iterations, total_tokens);
            }
        }
    }

    fn accumulate_attachments(&self, event: &Event) {
        let base = event.base();
        let EventKind::InputReceived(input) = &base.kind else {
            return;
        };
        if base.meta.session_id.is_empty() || input.attachments.is_empty() {
            return;
        }
        let mut sessions = self.session_attachments.lock();
        let entry = sessions.entry(base.meta.session_id.clone()).or_default();
        for (name, attachment) in &input.attachments {
            entry.insert(name.clone(), attachment.clone());
        }
    }

    fn push_memory_history(&self, event: Event) {
        let max = self.config.max_history.max(1);
        if event.meta.session_id.is_empty() {
            let mut ring = self.global_history.lock();
            ring.push_back(event);
            while ring.len() > max {
                ring.pop_front();
            }
        } else {
            let mut rings = self.session_history.lock();
            let ring = rings.entry(event.meta.session_id.clone()).or_default();
            ring.push_back(event);
            while ring.len() > max {
                ring.pop_front();
            }
        }
    }

    // --- history reads ---

    /// Replay retained events through `visitor`. With an async history
    /// store wired, pending events are flushed first.
    pub async fn stream_history(
        &self,
        filter: &HistoryFilter,
        visitor: EventVisitor<'_>,
    ) -> Result<(), DispatchError> {
        if let Some(history) = &self.history {
            history.stream(filter, visitor).await?;
            return Ok(());
        }

        let matching: Vec<Event> = {
            let rings = self.session_history.lock();
            let global = self.global_history.lock();
            if filter.session_id.is_empty() {
                global
                    .iter()
                    .chain(rings.values().flatten())
                    .filter(|e| filter.matches(e))
                    .cloned()
                    .collect()
            } else {
                rings
                    .get(&filter.session_id)
                    .map(|ring| ring.iter().filter(|e| filter.matches(e)).cloned().collect())
                    .unwrap_or_default()
            }
        };
        for event in matching {
            visitor(event);
        }
        Ok(())
    }

    /// Snapshot of a session's retained history.
    pub async fn get_history(&self, session_id: &SessionId) -> Result<Vec<Event>, DispatchError> {
        let mut events = Vec::new();
        let filter = HistoryFilter::session(session_id.clone());
        self.stream_history(&filter, &mut |e| events.push(e)).await?;
        Ok(events)
    }

    /// Snapshot of all retained history.
    pub async fn get_global_history(&self) -> Result<Vec<Event>, DispatchError> {
        let mut events = Vec::new();
        self.stream_history(&HistoryFilter::default(), &mut |e| events.push(e))
            .await?;
        Ok(events)
    }

    /// Delete a session's retained history, in memory and in the store.
    pub async fn clear_history(&self, session_id: &SessionId) -> Result<(), DispatchError> {
        self.session_history.lock().remove(session_id);
        if let Some(history) = &self.history {
            history.delete_session(session_id).await?;
        }
        Ok(())
    }

    /// Whether any retained event exists for the session.
    pub async fn has_session_events(
        &self,
        session_id: &SessionId,
    ) -> Result<bool, DispatchError> {
        if let Some(history) = &self.history {
            return Ok(history.has_session_events(session_id).await?);
        }
        Ok(self
            .session_history
            .lock()
            .get(session_id)
            .is_some_and(|ring| !ring.is_empty()))
    }

    /// Attachments accumulated from the session's sanitized input events.
    pub fn session_attachments(&self, session_id: &SessionId) -> HashMap<String, Attachment> {
        self.session_attachments
            .lock()
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    // --- metrics ---

    pub fn metrics(&self) -> &BroadcastMetrics {
        &self.metrics
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        let subscribers = self.subscribers.read();
        let sessions: Vec<SessionQueueDepth> = subscribers
            .iter()
            .map(|(session_id, queues)| SessionQueueDepth {
                session_id: session_id.to_string(),
                subscribers: queues.len(),
                buffered_events: queues.iter().map(|q| q.len()).sum(),
            })
            .collect();
        MetricsSnapshot {
            total_events_sent: self.metrics.events_sent(),
            dropped_events: self.metrics.events_dropped(),
            total_connections: self.metrics.total_connections(),
            active_connections: self.metrics.active_connections(),
            session_count: sessions.len(),
            sessions,
        }
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(BroadcasterConfig::default())
    }
}

#[async_trait]
impl EventListener for EventBroadcaster {
    async fn on_event(&self, event: Event) {
        self.emit(event).await;
    }
}

#[cfg(test)]
#[path = "broadcaster_tests.rs"]
mod tests;
