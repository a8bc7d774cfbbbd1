// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent execution contract.
//!
//! The LLM/agent engine lives outside this core; the executor facade
//! drives it through [`AgentExecutor`] and observes its event stream
//! through an [`EventListener`].

use crate::EventListener;
use async_trait::async_trait;
use relay_core::{SessionId, TaskResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors from the agent collaborator
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    #[error("agent unavailable: {0}")]
    Unavailable(String),
}

/// A conversational session as known to the agent engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    #[serde(default)]
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

/// Executes agent tasks on behalf of the core.
#[async_trait]
pub trait AgentExecutor: Send + Sync + 'static {
    /// Fetch the session, creating it when the id is empty or unknown.
    /// The returned session id is the confirmed one for all further work.
    async fn get_session(&self, session_id: &SessionId) -> Result<Session, AgentError>;

    /// Run one task to completion, reporting events through `listener`.
    async fn execute_task(
        &self,
        task_text: &str,
        session_id: &SessionId,
        listener: Arc<dyn EventListener>,
    ) -> Result<TaskResult, AgentError>;
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{AgentCall, FakeAgentExecutor, FakeOutcome};
