// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Async task executor facade.
//!
//! Dispatching a task is synchronous up to the point the caller holds a
//! confirmed session id and a task record; the execution itself runs in
//! a detached worker whose cancellation is independent of the caller.
//! Cancellation is a cause-carrying handle in a map keyed by task id.

use crate::broadcaster::EventBroadcaster;
use crate::listener::MultiListener;
use crate::session::SessionService;
use crate::task_store::TaskStore;
use crate::DispatchError;
use parking_lot::Mutex;
use relay_adapters::{AgentExecutor, EventListener};
use relay_core::{
    event_types, normalize_user_uploads, Attachment, Clock, Event, EventMeta, IdGen, SessionId,
    Task, TaskConfig, TaskId, TaskStatus, TerminationReason,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinError;
use tracing::{error, info, warn, Instrument};

/// Tuning for the executor facade.
#[derive(Debug, Clone, Default)]
pub struct ExecutorConfig {
    /// Deadline after which a running task is cancelled with reason
    /// `timeout`. `None` disables the deadline.
    pub task_timeout: Option<Duration>,
}

/// One task dispatch request.
#[derive(Debug, Clone, Default)]
pub struct TaskRequest {
    pub text: String,
    pub session_id: SessionId,
    pub parent_task_id: TaskId,
    pub attachments: HashMap<String, Attachment>,
    pub agent_preset: String,
    pub tool_preset: String,
}

/// Why a worker was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CancelCause {
    User,
    Deadline,
}

/// Collaborators the executor drives.
pub struct ExecutorDeps<A: AgentExecutor, C: Clock, G: IdGen> {
    pub agent: Option<Arc<A>>,
    pub broadcaster: Arc<EventBroadcaster>,
    pub tasks: Arc<TaskStore<C, G>>,
    pub sessions: Arc<SessionService<C, G>>,
}

/// Dispatches agent tasks and tracks their cancel handles.
pub struct TaskExecutor<A: AgentExecutor, C: Clock, G: IdGen> {
    agent: Option<Arc<A>>,
    broadcaster: Arc<EventBroadcaster>,
    tasks: Arc<TaskStore<C, G>>,
    sessions: Arc<SessionService<C, G>>,
    cancels: Arc<Mutex<HashMap<TaskId, oneshot::Sender<CancelCause>>>>,
    progress_listener: Option<Arc<dyn EventListener>>,
    config: ExecutorConfig,
    clock: C,
    id_gen: G,
}

impl<A, C, G> TaskExecutor<A, C, G>
where
    A: AgentExecutor,
    C: Clock,
    G: IdGen,
{
    pub fn new(deps: ExecutorDeps<A, C, G>, clock: C, id_gen: G, config: ExecutorConfig) -> Self {
        Self {
            agent: deps.agent,
            broadcaster: deps.broadcaster,
            tasks: deps.tasks,
            sessions: deps.sessions,
            cancels: Arc::new(Mutex::new(HashMap::new())),
            progress_listener: None,
            config,
            clock,
            id_gen,
        }
    }

    /// Add a listener composed next to the broadcaster for every task's
    /// event stream.
    pub fn with_progress_listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.progress_listener = Some(listener);
        self
    }

    /// Dispatch a task. Synchronous prefix: confirm the session, stamp
    /// the input event, create the record; then a detached worker runs
    /// the agent. Returns a copy of the freshly created task record.
    pub async fn execute_task_async(&self, request: TaskRequest) -> Result<Task, DispatchError> {
        let agent = self
            .agent
            .clone()
            .ok_or_else(|| DispatchError::Unavailable("agent executor not configured".to_string()))?;

        // A confirmed session id comes before any further work.
        let session = agent.get_session(&request.session_id).await?;
        if session.id.is_empty() {
            return Err(DispatchError::Validation(
                "agent returned an empty session id".to_string(),
            ));
        }
        let session = self.sessions.upsert(session)?;
        let session_id = session.id;

        let task_id = TaskId::new(self.id_gen.next());

        // The input event carries the cleaned attachment set.
        let attachments = normalize_user_uploads(request.attachments);
        self.broadcaster
            .emit(Event::input(
                EventMeta {
                    session_id: session_id.clone(),
                    task_id: task_id.clone(),
                    parent_task_id: request.parent_task_id.clone(),
                    timestamp_ms: self.clock.epoch_ms(),
                    ..EventMeta::default()
                },
                request.text.clone(),
                attachments,
            ))
            .await;

        let task = self.tasks.create(TaskConfig {
            id: task_id.clone(),
            session_id: session_id.clone(),
            parent_task_id: request.parent_task_id,
            description: request.text.clone(),
            agent_preset: request.agent_preset,
            tool_preset: request.tool_preset,
        });

        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.cancels.lock().insert(task_id.clone(), cancel_tx);

        let worker = TaskWorker {
            agent,
            broadcaster: Arc::clone(&self.broadcaster),
            tasks: Arc::clone(&self.tasks),
            cancels: Arc::clone(&self.cancels),
            progress_listener: self.progress_listener.clone(),
            task_id: task_id.clone(),
            session_id,
            text: request.text,
            timeout: self.config.task_timeout,
        };
        let span = tracing::info_span!("task_worker", task = %task_id.short(12));
        tokio::spawn(worker.run(cancel_rx).instrument(span));

        Ok(task)
    }

    /// Cancel a live task. Terminal tasks conflict; unknown ids are not
    /// found. The terminal envelope reaches every still-connected
    /// subscriber through the critical-event policy.
    pub async fn cancel_task(&self, task_id: &TaskId) -> Result<(), DispatchError> {
        let task = self.tasks.get(task_id)?;
        if !matches!(task.status, TaskStatus::Pending | TaskStatus::Running) {
            return Err(DispatchError::Conflict(format!(
                "task {} is already {}",
                task_id, task.status
            )));
        }

        let cancel = self.cancels.lock().remove(task_id);
        match cancel {
            Some(handle) => {
                let _ = handle.send(CancelCause::User);
            }
            None => {
                // No live worker: transition the record directly.
                let _ = self
                    .tasks
                    .set_termination_reason(task_id, TerminationReason::Cancelled);
                let _ = self.tasks.set_status(task_id, TaskStatus::Cancelled);
            }
        }

        let mut payload = Map::new();
        payload.insert("reason".to_string(), Value::from("cancelled"));
        self.broadcaster
            .emit(Event::envelope(
                EventMeta {
                    session_id: task.session_id.clone(),
                    task_id: task_id.clone(),
                    parent_task_id: task.parent_task_id.clone(),
                    timestamp_ms: self.clock.epoch_ms(),
                    ..EventMeta::default()
                },
                event_types::RESULT_CANCELLED,
                payload,
            ))
            .await;
        Ok(())
    }

    pub fn get_task(&self, task_id: &TaskId) -> Result<Task, DispatchError> {
        self.tasks.get(task_id)
    }

    pub fn list_tasks(&self, limit: usize, offset: usize) -> (Vec<Task>, usize) {
        self.tasks.list(limit, offset)
    }

    pub fn list_session_tasks(&self, session_id: &SessionId) -> Vec<Task> {
        self.tasks.list_by_session(session_id)
    }
}

enum Outcome {
    Finished(Result<relay_core::TaskResult, relay_adapters::AgentError>),
    Cancelled(CancelCause),
    Panicked(String),
    Aborted,
}

struct TaskWorker<A: AgentExecutor, C: Clock, G: IdGen> {
    agent: Arc<A>,
    broadcaster: Arc<EventBroadcaster>,
    tasks: Arc<TaskStore<C, G>>,
    cancels: Arc<Mutex<HashMap<TaskId, oneshot::Sender<CancelCause>>>>,
    progress_listener: Option<Arc<dyn EventListener>>,
    task_id: TaskId,
    session_id: SessionId,
    text: String,
    timeout: Option<Duration>,
}

impl<A, C, G> TaskWorker<A, C, G>
where
    A: AgentExecutor,
    C: Clock,
    G: IdGen,
{
    async fn run(self, mut cancel_rx: oneshot::Receiver<CancelCause>) {
        self.broadcaster
            .register_task_session(&self.session_id, &self.task_id);
        let _ = self.tasks.set_status(&self.task_id, TaskStatus::Running);

        let hub: Arc<dyn EventListener> = Arc::clone(&self.broadcaster) as Arc<dyn EventListener>;
        let listener: Arc<dyn EventListener> = match &self.progress_listener {
            Some(extra) => Arc::new(MultiListener::new(vec![hub, Arc::clone(extra)])),
            None => hub,
        };

        // The agent call runs in its own task so a panic is isolated and
        // reported through the join error.
        let agent = Arc::clone(&self.agent);
        let text = self.text.clone();
        let session_id = self.session_id.clone();
        let mut inner =
            tokio::spawn(async move { agent.execute_task(&text, &session_id, listener).await });

        let outcome = tokio::select! {
            joined = &mut inner => match joined {
                Ok(result) => Outcome::Finished(result),
                Err(join_err) => classify_join_error(join_err),
            },
            cause = &mut cancel_rx => {
                inner.abort();
                Outcome::Cancelled(cause.unwrap_or(CancelCause::User))
            }
            _ = deadline_sleep(self.timeout) => {
                inner.abort();
                Outcome::Cancelled(CancelCause::Deadline)
            }
        };

        match outcome {
            Outcome::Finished(Ok(result)) => {
                info!(
                    task = %self.task_id.short(12),
                    iterations = result.iterations,
                    tokens = result.tokens_used,
                    "task completed",
                );
                let _ = self.tasks.set_result(&self.task_id, result);
            }
            Outcome::Finished(Err(e)) => {
                warn!(task = %self.task_id.short(12), error = %e, "task failed");
                let _ = self.tasks.set_error(&self.task_id, e.to_string());
            }
            Outcome::Cancelled(cause) => {
                let reason = match cause {
                    CancelCause::Deadline => TerminationReason::Timeout,
                    CancelCause::User => TerminationReason::Cancelled,
                };
                let _ = self.tasks.set_termination_reason(&self.task_id, reason);
                let _ = self.tasks.set_status(&self.task_id, TaskStatus::Cancelled);
                info!(task = %self.task_id.short(12), reason = %reason, "task cancelled");
            }
            Outcome::Panicked(message) => {
                error!(task = %self.task_id.short(12), %message, "task worker panicked");
                eprintln!("task {} panicked: {message}", self.task_id);
                let _ = self
                    .tasks
                    .set_error(&self.task_id, format!("panic: {message}"));
            }
            Outcome::Aborted => {
                let _ = self.tasks.set_error(&self.task_id, "task aborted");
            }
        }

        self.cancels.lock().remove(&self.task_id);
        self.broadcaster.unregister_task_session(&self.session_id);
    }
}

fn classify_join_error(err: JoinError) -> Outcome {
    if !err.is_panic() {
        return Outcome::Aborted;
    }
    let message = match err.try_into_panic() {
        Ok(panic) => {
            if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else if let Some(s) = panic.downcast_ref::<&str>() {
                (*s).to_string()
            } else {
                "unknown panic".to_string()
            }
        }
        Err(_) => "unknown panic".to_string(),
    };
    Outcome::Panicked(message)
}

async fn deadline_sleep(timeout: Option<Duration>) {
    match timeout {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
