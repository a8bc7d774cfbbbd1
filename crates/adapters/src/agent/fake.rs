// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted fake agent executor for tests.

use super::{AgentError, AgentExecutor, Session};
use crate::EventListener;
use async_trait::async_trait;
use parking_lot::Mutex;
use relay_core::{Event, SessionId, TaskResult};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Recorded call against the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentCall {
    GetSession { session_id: String },
    ExecuteTask { task_text: String, session_id: String },
}

/// How the next `execute_task` call behaves.
pub enum FakeOutcome {
    /// Return this result.
    Succeed(TaskResult),
    /// Return an execution error with this message.
    Fail(String),
    /// Never return; lets callers exercise cancellation and timeouts.
    Hang,
    /// Panic with this message; lets callers exercise panic recovery.
    Panic(String),
}

/// Fake [`AgentExecutor`] with scripted outcomes and call recording.
///
/// Each `execute_task` first forwards any queued events to the listener,
/// then performs the next scripted outcome (default: succeed with a
/// result echoing the session id).
pub struct FakeAgentExecutor {
    session_counter: AtomicU64,
    outcomes: Mutex<VecDeque<FakeOutcome>>,
    events_to_emit: Mutex<Vec<Event>>,
    calls: Mutex<Vec<AgentCall>>,
}

impl FakeAgentExecutor {
    pub fn new() -> Self {
        Self {
            session_counter: AtomicU64::new(1),
            outcomes: Mutex::new(VecDeque::new()),
            events_to_emit: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue the outcome for the next `execute_task` call.
    pub fn push_outcome(&self, outcome: FakeOutcome) {
        self.outcomes.lock().push_back(outcome);
    }

    /// Queue events forwarded to the listener before the outcome applies.
    pub fn emit_events(&self, events: Vec<Event>) {
        self.events_to_emit.lock().extend(events);
    }

    pub fn calls(&self) -> Vec<AgentCall> {
        self.calls.lock().clone()
    }
}

impl Default for FakeAgentExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentExecutor for FakeAgentExecutor {
    async fn get_session(&self, session_id: &SessionId) -> Result<Session, AgentError> {
        self.calls.lock().push(AgentCall::GetSession {
            session_id: session_id.as_str().to_string(),
        });
        let id = if session_id.is_empty() {
            let n = self.session_counter.fetch_add(1, Ordering::SeqCst);
            SessionId::new(format!("session-{n}"))
        } else {
            session_id.clone()
        };
        Ok(Session {
            id,
            ..Session::default()
        })
    }

    async fn execute_task(
        &self,
        task_text: &str,
        session_id: &SessionId,
        listener: Arc<dyn EventListener>,
    ) -> Result<TaskResult, AgentError> {
        self.calls.lock().push(AgentCall::ExecuteTask {
            task_text: task_text.to_string(),
            session_id: session_id.as_str().to_string(),
        });

        let events: Vec<Event> = self.events_to_emit.lock().drain(..).collect();
        for event in events {
            listener.on_event(event).await;
        }

        let outcome = self.outcomes.lock().pop_front();
        match outcome {
            None => Ok(TaskResult {
                answer: "ok".to_string(),
                iterations: 1,
                tokens_used: 1,
                stop_reason: "completed".to_string(),
                session_id: session_id.clone(),
                ..TaskResult::default()
            }),
            Some(FakeOutcome::Succeed(result)) => Ok(result),
            Some(FakeOutcome::Fail(message)) => Err(AgentError::ExecutionFailed(message)),
            Some(FakeOutcome::Hang) => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            Some(FakeOutcome::Panic(message)) => std::panic::panic_any(message),
        }
    }
}
