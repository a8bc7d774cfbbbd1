// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task record and lifecycle state machine.

use crate::clock::Clock;
use crate::id::{SessionId, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Lifecycle status of a task.
///
/// `pending → running → {completed | failed | cancelled}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Why a task reached a terminal status.
///
/// Serialized as the empty string while the task is live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    #[default]
    #[serde(rename = "")]
    None,
    Completed,
    Cancelled,
    Timeout,
    Error,
}

impl TerminationReason {
    /// Reason implied by a terminal status when none was set explicitly.
    pub fn infer(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Completed => TerminationReason::Completed,
            TaskStatus::Failed => TerminationReason::Error,
            TaskStatus::Cancelled => TerminationReason::Cancelled,
            TaskStatus::Pending | TaskStatus::Running => TerminationReason::None,
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::None => Ok(()),
            TerminationReason::Completed => write!(f, "completed"),
            TerminationReason::Cancelled => write!(f, "cancelled"),
            TerminationReason::Timeout => write!(f, "timeout"),
            TerminationReason::Error => write!(f, "error"),
        }
    }
}

/// Outcome returned by the agent collaborator for one task execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub iterations: u32,
    #[serde(default)]
    pub tokens_used: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stop_reason: String,
    #[serde(default, skip_serializing_if = "SessionId::is_empty")]
    pub session_id: SessionId,
    #[serde(default, skip_serializing_if = "TaskId::is_empty")]
    pub parent_task_id: TaskId,
}

/// Configuration for creating a new task record.
#[derive(Debug, Clone, Default)]
pub struct TaskConfig {
    pub id: TaskId,
    pub session_id: SessionId,
    pub parent_task_id: TaskId,
    pub description: String,
    pub agent_preset: String,
    pub tool_preset: String,
}

/// One execution of an agent request.
///
/// Progress fields are always serialized, even at zero, so external
/// consumers see a stable wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub session_id: SessionId,
    #[serde(default, skip_serializing_if = "TaskId::is_empty")]
    pub parent_task_id: TaskId,
    pub status: TaskStatus,
    #[serde(default)]
    pub description: String,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    pub termination_reason: TerminationReason,
    pub current_iteration: u32,
    pub total_iterations: u32,
    pub tokens_used: u64,
    pub total_tokens: u64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub agent_preset: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tool_preset: String,
}

impl Task {
    /// Create a new pending task stamped with the clock's wall time.
    pub fn new(config: TaskConfig, clock: &impl Clock) -> Self {
        Self::new_with_epoch_ms(config, clock.epoch_ms())
    }

    /// Create a new pending task with an explicit creation timestamp.
    pub fn new_with_epoch_ms(config: TaskConfig, epoch_ms: u64) -> Self {
        Self {
            id: config.id,
            session_id: config.session_id,
            parent_task_id: config.parent_task_id,
            status: TaskStatus::Pending,
            description: config.description,
            created_at_ms: epoch_ms,
            started_at_ms: None,
            completed_at_ms: None,
            error: None,
            result: None,
            termination_reason: TerminationReason::None,
            current_iteration: 0,
            total_iterations: 0,
            tokens_used: 0,
            total_tokens: 0,
            metadata: HashMap::new(),
            agent_preset: config.agent_preset,
            tool_preset: config.tool_preset,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Transition the task's status.
    ///
    /// `started_at_ms` is stamped on the first entry into `running`;
    /// terminal statuses stamp `completed_at_ms` once and infer the
    /// termination reason when none was set.
    pub fn set_status(&mut self, status: TaskStatus, epoch_ms: u64) {
        self.status = status;
        if status == TaskStatus::Running && self.started_at_ms.is_none() {
            self.started_at_ms = Some(epoch_ms);
        }
        if status.is_terminal() {
            if self.completed_at_ms.is_none() {
                self.completed_at_ms = Some(epoch_ms);
            }
            if self.termination_reason == TerminationReason::None {
                self.termination_reason = TerminationReason::infer(status);
            }
        }
    }

    /// Record a successful result: implies `completed`, copies the
    /// result's totals, and adopts its session id when the task was
    /// created without one.
    pub fn apply_result(&mut self, result: TaskResult, epoch_ms: u64) {
        self.total_iterations = result.iterations;
        self.tokens_used = result.tokens_used;
        self.total_tokens = result.tokens_used;
        if self.session_id.is_empty() && !result.session_id.is_empty() {
            self.session_id = result.session_id.clone();
        }
        self.result = Some(result);
        self.set_status(TaskStatus::Completed, epoch_ms);
    }

    /// Record a failure: implies `failed` with reason `error`.
    pub fn apply_error(&mut self, error: impl Into<String>, epoch_ms: u64) {
        self.error = Some(error.into());
        self.termination_reason = TerminationReason::Error;
        self.set_status(TaskStatus::Failed, epoch_ms);
    }

    /// Update progress counters from an observed event.
    ///
    /// Late out-of-order events must not regress the counters, so values
    /// strictly below the current ones are skipped.
    pub fn update_progress(&mut self, iteration: u32, tokens_used: Option<u64>) {
        if iteration >= self.current_iteration {
            self.current_iteration = iteration;
        }
        if let Some(tokens) = tokens_used {
            if tokens >= self.tokens_used {
                self.tokens_used = tokens;
            }
        }
    }

    /// One-line summary for structured logs.
    pub fn log_summary(&self) -> String {
        format!(
            "task id={} session={} status={} iter={}/{}",
            self.id.short(12),
            self.session_id.short(12),
            self.status,
            self.current_iteration,
            self.total_iterations,
        )
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
