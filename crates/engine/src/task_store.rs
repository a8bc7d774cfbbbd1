// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task lifecycle registry.
//!
//! Owns the task records: creation, status transitions, progress
//! counters, results, and listings. Reads hand out copies so callers can
//! never race writers through a shared reference.

use crate::DispatchError;
use parking_lot::RwLock;
use relay_core::{
    Clock, IdGen, SessionId, Task, TaskConfig, TaskId, TaskResult, TaskStatus, TerminationReason,
};
use std::collections::HashMap;
use tracing::debug;

/// Progress writes made by the broadcaster while observing events.
///
/// One-way dependency: the broadcaster only knows this trait, never the
/// store itself.
pub trait ProgressSink: Send + Sync + 'static {
    fn update_progress(&self, task_id: &TaskId, iteration: u32, tokens_used: Option<u64>);
    fn update_totals(&self, task_id: &TaskId, total_iterations: u32, total_tokens: u64);
}

/// In-memory task registry.
pub struct TaskStore<C: Clock, G: IdGen> {
    clock: C,
    id_gen: G,
    tasks: RwLock<HashMap<TaskId, Task>>,
}

impl<C: Clock, G: IdGen> TaskStore<C, G> {
    pub fn new(clock: C, id_gen: G) -> Self {
        Self {
            clock,
            id_gen,
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Create a task record. An empty `config.id` gets a fresh id.
    pub fn create(&self, mut config: TaskConfig) -> Task {
        if config.id.is_empty() {
            config.id = TaskId::new(self.id_gen.next());
        }
        let task = Task::new(config, &self.clock);
        debug!(task = %task.id.short(12), session = %task.session_id.short(12), "task created");
        self.tasks.write().insert(task.id.clone(), task.clone());
        task
    }

    pub fn get(&self, task_id: &TaskId) -> Result<Task, DispatchError> {
        self.tasks
            .read()
            .get(task_id)
            .cloned()
            .ok_or_else(|| DispatchError::TaskNotFound(task_id.to_string()))
    }

    /// Replace an existing record wholesale.
    pub fn update(&self, task: Task) -> Result<(), DispatchError> {
        let mut tasks = self.tasks.write();
        if !tasks.contains_key(&task.id) {
            return Err(DispatchError::TaskNotFound(task.id.to_string()));
        }
        tasks.insert(task.id.clone(), task);
        Ok(())
    }

    /// List tasks newest-first. A `limit` of zero means no limit.
    /// Returns the page and the total number of tasks.
    pub fn list(&self, limit: usize, offset: usize) -> (Vec<Task>, usize) {
        let tasks = self.tasks.read();
        let total = tasks.len();
        let mut all: Vec<Task> = tasks.values().cloned().collect();
        drop(tasks);

        sort_newest_first(&mut all);
        let page: Vec<Task> = if limit == 0 {
            all.into_iter().skip(offset).collect()
        } else {
            all.into_iter().skip(offset).take(limit).collect()
        };
        (page, total)
    }

    /// All tasks of a session, newest-first.
    pub fn list_by_session(&self, session_id: &SessionId) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .read()
            .values()
            .filter(|t| t.session_id == *session_id)
            .cloned()
            .collect();
        sort_newest_first(&mut tasks);
        tasks
    }

    pub fn delete(&self, task_id: &TaskId) -> Result<(), DispatchError> {
        self.tasks
            .write()
            .remove(task_id)
            .map(|_| ())
            .ok_or_else(|| DispatchError::TaskNotFound(task_id.to_string()))
    }

    pub fn set_status(&self, task_id: &TaskId, status: TaskStatus) -> Result<Task, DispatchError> {
        let epoch_ms = self.clock.epoch_ms();
        self.mutate(task_id, |task| task.set_status(status, epoch_ms))
    }

    pub fn set_error(
        &self,
        task_id: &TaskId,
        error: impl Into<String>,
    ) -> Result<Task, DispatchError> {
        let epoch_ms = self.clock.epoch_ms();
        let error = error.into();
        self.mutate(task_id, move |task| task.apply_error(error, epoch_ms))
    }

    pub fn set_result(
        &self,
        task_id: &TaskId,
        result: TaskResult,
    ) -> Result<Task, DispatchError> {
        let epoch_ms = self.clock.epoch_ms();
        self.mutate(task_id, move |task| task.apply_result(result, epoch_ms))
    }

    pub fn set_termination_reason(
        &self,
        task_id: &TaskId,
        reason: TerminationReason,
    ) -> Result<Task, DispatchError> {
        self.mutate(task_id, |task| task.termination_reason = reason)
    }

    pub fn update_task_progress(
        &self,
        task_id: &TaskId,
        iteration: u32,
        tokens_used: Option<u64>,
    ) -> Result<Task, DispatchError> {
        self.mutate(task_id, |task| task.update_progress(iteration, tokens_used))
    }

    fn mutate(
        &self,
        task_id: &TaskId,
        f: impl FnOnce(&mut Task),
    ) -> Result<Task, DispatchError> {
        let mut tasks = self.tasks.write();
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| DispatchError::TaskNotFound(task_id.to_string()))?;
        f(task);
        Ok(task.clone())
    }
}

fn sort_newest_first(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| {
        b.created_at_ms
            .cmp(&a.created_at_ms)
            .then_with(|| b.id.as_str().cmp(a.id.as_str()))
    });
}

impl<C: Clock, G: IdGen> ProgressSink for TaskStore<C, G> {
    fn update_progress(&self, task_id: &TaskId, iteration: u32, tokens_used: Option<u64>) {
        if self
            .update_task_progress(task_id, iteration, tokens_used)
            .is_err()
        {
            debug!(task = %task_id.short(12), "progress update for unknown task skipped");
        }
    }

    fn update_totals(&self, task_id: &TaskId, total_iterations: u32, total_tokens: u64) {
        let result = self.mutate(task_id, |task| {
            task.total_iterations = task.total_iterations.max(total_iterations);
            task.total_tokens = task.total_tokens.max(total_tokens);
        });
        if result.is_err() {
            debug!(task = %task_id.short(12), "totals update for unknown task skipped");
        }
    }
}

#[cfg(test)]
#[path = "task_store_tests.rs"]
mod tests;
