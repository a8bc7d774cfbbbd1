// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event types flowing through the distribution core.
//!
//! Serializes with `{"type": "tag", ...meta, ...fields}` format. Unknown
//! type tags deserialize to `Custom`. The workflow envelope additionally
//! carries a free-form `event_type` string (`workflow.node.started`,
//! `workflow.result.final`, ...) which is what classification operates on.

use crate::attachment::Attachment;
use crate::id::{SessionId, TaskId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Well-known workflow envelope event types.
pub mod event_types {
    pub const NODE_STARTED: &str = "workflow.node.started";
    pub const NODE_COMPLETED: &str = "workflow.node.completed";
    pub const RESULT_FINAL: &str = "workflow.result.final";
    pub const RESULT_CANCELLED: &str = "workflow.result.cancelled";
    pub const OUTPUT_DELTA: &str = "workflow.output.delta";
    pub const TOOL_PROGRESS: &str = "workflow.tool.progress";
    /// Prefix of executor-internal diagnostics, never persisted.
    pub const EXECUTOR_PREFIX: &str = "workflow.executor.";

    pub const INPUT_RECEIVED: &str = "task.input";
    pub const CONTEXT_SNAPSHOT: &str = "diagnostic.context";
    pub const ITERATION_STARTED: &str = "iteration.started";
    pub const ITERATION_COMPLETED: &str = "iteration.completed";
    pub const TASK_COMPLETED: &str = "task.completed";
    pub const TOOL_COMPLETED: &str = "tool.completed";
    pub const SUBTASK_WRAPPED: &str = "subtask.wrapped";
}

/// Which layer of the agent stack produced an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentLevel {
    #[default]
    Core,
    Subagent,
}

/// Attributes shared by every event variant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMeta {
    #[serde(default, skip_serializing_if = "SessionId::is_empty")]
    pub session_id: SessionId,
    #[serde(default, skip_serializing_if = "TaskId::is_empty")]
    pub task_id: TaskId,
    #[serde(default, skip_serializing_if = "TaskId::is_empty")]
    pub parent_task_id: TaskId,
    #[serde(default)]
    pub agent_level: AgentLevel,
    #[serde(default)]
    pub timestamp_ms: u64,
}

impl EventMeta {
    pub fn for_session(session_id: impl Into<SessionId>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Self::default()
        }
    }

    pub fn with_task(mut self, task_id: impl Into<TaskId>) -> Self {
        self.task_id = task_id.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }
}

/// Generic workflow event with a versioned free-form payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEnvelope {
    #[serde(default)]
    pub version: u32,
    /// Free-form event tag, e.g. `workflow.node.started`.
    pub event_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub workflow_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub run_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtask: Option<SubtaskDetails>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub payload: Map<String, Value>,
}

/// Task input as received from the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputReceived {
    pub text: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attachments: HashMap<String, Attachment>,
}

/// Snapshot of the context assembled for one model request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    #[serde(default)]
    pub iteration: u32,
    #[serde(default)]
    pub turn_sequence: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub request_id: String,
    #[serde(default)]
    pub messages_included: u32,
    #[serde(default)]
    pub messages_excluded: u32,
}

/// Position of a wrapped event within a parallel subtask fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtaskDetails {
    pub index: u32,
    pub total: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub preview: String,
    #[serde(default)]
    pub max_parallel: u32,
}

/// An event produced inside a subtask, wrapped with fan-out metadata.
///
/// The wrapper is what gets broadcast and persisted; classification always
/// applies to the innermost event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtaskWrapper {
    pub details: SubtaskDetails,
    pub inner: Box<Event>,
}

/// Event payload variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventKind {
    #[serde(rename = "workflow.envelope")]
    Envelope(WorkflowEnvelope),

    #[serde(rename = "task.input")]
    InputReceived(InputReceived),

    #[serde(rename = "diagnostic.context")]
    ContextSnapshot(ContextSnapshot),

    // -- legacy typed events --
    #[serde(rename = "iteration.started")]
    IterationStarted { iteration: u32 },

    #[serde(rename = "iteration.completed")]
    IterationCompleted { iteration: u32, tokens_used: u64 },

    #[serde(rename = "task.completed")]
    TaskCompleted { iterations: u32, tokens_used: u64 },

    #[serde(rename = "tool.completed")]
    ToolCompleted { tool_name: String, success: bool },

    #[serde(rename = "subtask.wrapped")]
    Subtask(SubtaskWrapper),

    /// Catch-all for unknown event types (extensibility)
    #[serde(other, skip_serializing)]
    Custom,
}

/// A timestamped, typed record of an execution milestone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(flatten)]
    pub meta: EventMeta,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn new(meta: EventMeta, kind: EventKind) -> Self {
        Self { meta, kind }
    }

    /// Build a workflow envelope event.
    pub fn envelope(
        meta: EventMeta,
        event_type: impl Into<String>,
        payload: Map<String, Value>,
    ) -> Self {
        Self::new(
            meta,
            EventKind::Envelope(WorkflowEnvelope {
                version: 1,
                event_type: event_type.into(),
                payload,
                ..WorkflowEnvelope::default()
            }),
        )
    }

    /// Build a task-input event.
    pub fn input(meta: EventMeta, text: impl Into<String>, attachments: HashMap<String, Attachment>) -> Self {
        Self::new(
            meta,
            EventKind::InputReceived(InputReceived {
                text: text.into(),
                attachments,
            }),
        )
    }

    /// Wrap an event with subtask fan-out metadata.
    pub fn wrap_subtask(details: SubtaskDetails, inner: Event) -> Self {
        Self::new(
            inner.meta.clone(),
            EventKind::Subtask(SubtaskWrapper {
                details,
                inner: Box::new(inner),
            }),
        )
    }

    /// The event's string tag. Envelopes report their free-form
    /// `event_type`; other variants a fixed name.
    pub fn event_type(&self) -> &str {
        match &self.kind {
            EventKind::Envelope(env) => &env.event_type,
            EventKind::InputReceived(_) => event_types::INPUT_RECEIVED,
            EventKind::ContextSnapshot(_) => event_types::CONTEXT_SNAPSHOT,
            EventKind::IterationStarted { .. } => event_types::ITERATION_STARTED,
            EventKind::IterationCompleted { .. } => event_types::ITERATION_COMPLETED,
            EventKind::TaskCompleted { .. } => event_types::TASK_COMPLETED,
            EventKind::ToolCompleted { .. } => event_types::TOOL_COMPLETED,
            EventKind::Subtask(_) => event_types::SUBTASK_WRAPPED,
            EventKind::Custom => "custom",
        }
    }

    /// Unwrap subtask wrappers transitively. Idempotent: a non-wrapper
    /// returns itself.
    pub fn base(&self) -> &Event {
        let mut event = self;
        while let EventKind::Subtask(wrapper) = &event.kind {
            event = &wrapper.inner;
        }
        event
    }

    /// Fan-out metadata of the outermost wrapper, if any.
    pub fn subtask_details(&self) -> Option<&SubtaskDetails> {
        match &self.kind {
            EventKind::Subtask(wrapper) => Some(&wrapper.details),
            _ => None,
        }
    }

    /// The envelope payload of the base event, if it is an envelope.
    pub fn payload(&self) -> Option<&Map<String, Value>> {
        match &self.base().kind {
            EventKind::Envelope(env) => Some(&env.payload),
            _ => None,
        }
    }

    /// Progress information carried by this event, if any.
    pub fn progress_signal(&self) -> Option<ProgressSignal> {
        let base = self.base();
        match &base.kind {
            EventKind::Envelope(env) => {
                let p = &env.payload;
                match env.event_type.as_str() {
                    event_types::NODE_STARTED => Some(ProgressSignal::NodeStarted {
                        iteration: payload_u64(p, "iteration")? as u32,
                    }),
                    event_types::NODE_COMPLETED => Some(ProgressSignal::NodeCompleted {
                        iteration: payload_u64(p, "iteration").unwrap_or(0) as u32,
                        tokens_used: payload_u64(p, "tokens_used").unwrap_or(0),
                    }),
                    event_types::RESULT_FINAL => Some(ProgressSignal::FinalResult {
                        total_iterations: payload_u64(p, "iterations")
                            .or_else(|| payload_u64(p, "total_iterations"))
                            .unwrap_or(0) as u32,
                        total_tokens: payload_u64(p, "tokens_used")
                            .or_else(|| payload_u64(p, "total_tokens"))
                            .unwrap_or(0),
                    }),
                    _ => None,
                }
            }
            EventKind::IterationStarted { iteration } => Some(ProgressSignal::NodeStarted {
                iteration: *iteration,
            }),
            EventKind::IterationCompleted {
                iteration,
                tokens_used,
            } => Some(ProgressSignal::NodeCompleted {
                iteration: *iteration,
                tokens_used: *tokens_used,
            }),
            EventKind::TaskCompleted {
                iterations,
                tokens_used,
            } => Some(ProgressSignal::FinalResult {
                total_iterations: *iterations,
                total_tokens: *tokens_used,
            }),
            _ => None,
        }
    }

    /// One-line summary for structured logs.
    pub fn log_summary(&self) -> String {
        let t = self.event_type();
        let base = self.base();
        let sid = base.meta.session_id.short(12);
        match &base.kind {
            EventKind::Envelope(env) => {
                if env.node_id.is_empty() {
                    format!("{t} session={sid}")
                } else {
                    format!("{t} session={sid} node={}", env.node_id)
                }
            }
            EventKind::InputReceived(input) => {
                format!("{t} session={sid} attachments={}", input.attachments.len())
            }
            EventKind::ContextSnapshot(snap) => {
                format!("{t} session={sid} iteration={}", snap.iteration)
            }
            EventKind::IterationStarted { iteration } => {
                format!("{t} session={sid} iteration={iteration}")
            }
            EventKind::IterationCompleted {
                iteration,
                tokens_used,
            } => format!("{t} session={sid} iteration={iteration} tokens={tokens_used}"),
            EventKind::TaskCompleted {
                iterations,
                tokens_used,
            } => format!("{t} session={sid} iterations={iterations} tokens={tokens_used}"),
            EventKind::ToolCompleted { tool_name, success } => {
                format!("{t} session={sid} tool={tool_name} ok={success}")
            }
            EventKind::Subtask(_) | EventKind::Custom => format!("{t} session={sid}"),
        }
    }
}

/// Progress information extracted from an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressSignal {
    NodeStarted { iteration: u32 },
    NodeCompleted { iteration: u32, tokens_used: u64 },
    FinalResult { total_iterations: u32, total_tokens: u64 },
}

fn payload_u64(payload: &Map<String, Value>, key: &str) -> Option<u64> {
    payload.get(key).and_then(Value::as_u64)
}

fn payload_bool(payload: &Map<String, Value>, key: &str) -> Option<bool> {
    payload.get(key).and_then(Value::as_bool)
}

/// High-volume events (streaming deltas, chunked output, tool progress)
/// get their per-event logging suppressed.
pub fn is_high_volume(event_type: &str) -> bool {
    event_type.contains(".delta")
        || event_type.contains(".chunk")
        || event_type.contains(".progress")
        || event_type.ends_with(".streaming")
}

/// True for a `workflow.result.final` envelope that is still streaming:
/// payload flag `is_streaming == true` or `stream_finished == false`.
/// The flag names are the contract.
fn is_unfinished_stream(event: &Event) -> bool {
    let Some(payload) = event.payload() else {
        return false;
    };
    payload_bool(payload, "is_streaming").unwrap_or(false)
        || !payload_bool(payload, "stream_finished").unwrap_or(true)
}

/// Critical events preempt the drop-on-full subscriber policy.
///
/// Kept as a single pure function so the set can grow in one place.
pub fn is_critical(event: &Event) -> bool {
    let base = event.base();
    match base.event_type() {
        event_types::RESULT_CANCELLED => true,
        event_types::RESULT_FINAL => !is_unfinished_stream(base),
        event_types::TASK_COMPLETED => true,
        _ => false,
    }
}

/// Whether an event is retained by the history persistence filter.
///
/// Classification applies to the unwrapped base event; the caller persists
/// the outermost form so subtask metadata survives.
pub fn should_persist(event: &Event) -> bool {
    let base = event.base();
    let event_type = base.event_type();

    if event_type.starts_with(event_types::EXECUTOR_PREFIX) {
        return false;
    }
    if event_type == event_types::RESULT_FINAL {
        // Keep only the terminal chunk of a streamed final result.
        return !is_unfinished_stream(base);
    }
    if is_high_volume(event_type) {
        return false;
    }
    true
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
