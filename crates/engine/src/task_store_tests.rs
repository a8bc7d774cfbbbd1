// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use relay_core::{FakeClock, SequentialIdGen};
use std::time::Duration;

fn store() -> (TaskStore<FakeClock, SequentialIdGen>, FakeClock) {
    let clock = FakeClock::new();
    (
        TaskStore::new(clock.clone(), SequentialIdGen::new("task")),
        clock,
    )
}

fn config(session: &str) -> TaskConfig {
    TaskConfig {
        session_id: SessionId::new(session),
        description: "do the thing".to_string(),
        ..TaskConfig::default()
    }
}

#[test]
fn create_assigns_fresh_id_and_stamps_creation() {
    let (store, clock) = store();
    clock.set_epoch_ms(5_000);
    let task = store.create(config("s1"));
    assert_eq!(task.id, "task-1");
    assert_eq!(task.created_at_ms, 5_000);
    assert_eq!(task.status, TaskStatus::Pending);

    let fetched = store.get(&task.id).unwrap();
    assert_eq!(fetched, task);
}

#[test]
fn create_keeps_caller_provided_id() {
    let (store, _clock) = store();
    let task = store.create(TaskConfig {
        id: TaskId::new("preallocated"),
        ..config("s1")
    });
    assert_eq!(task.id, "preallocated");
}

#[test]
fn get_unknown_task_is_not_found() {
    let (store, _clock) = store();
    let err = store.get(&TaskId::new("nope")).unwrap_err();
    assert!(matches!(err, DispatchError::TaskNotFound(_)));
}

#[test]
fn reads_return_copies() {
    let (store, _clock) = store();
    let task = store.create(config("s1"));

    let mut copy = store.get(&task.id).unwrap();
    copy.description = "mutated".to_string();

    assert_eq!(store.get(&task.id).unwrap().description, "do the thing");
}

#[test]
fn list_is_newest_first_with_pagination() {
    let (store, clock) = store();
    for i in 0..5 {
        clock.set_epoch_ms(1_000 + i * 100);
        store.create(config("s1"));
    }

    let (page, total) = store.list(2, 0);
    assert_eq!(total, 5);
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].id, "task-5");
    assert_eq!(page[1].id, "task-4");

    let (page, _) = store.list(2, 4);
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, "task-1");

    // Zero limit returns everything.
    let (all, _) = store.list(0, 0);
    assert_eq!(all.len(), 5);
}

#[test]
fn list_by_session_filters_and_sorts() {
    let (store, clock) = store();
    clock.set_epoch_ms(1_000);
    store.create(config("s1"));
    clock.set_epoch_ms(2_000);
    store.create(config("s2"));
    clock.set_epoch_ms(3_000);
    store.create(config("s1"));

    let tasks = store.list_by_session(&SessionId::new("s1"));
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].id, "task-3");
    assert_eq!(tasks[1].id, "task-1");
}

#[test]
fn delete_removes_record() {
    let (store, _clock) = store();
    let task = store.create(config("s1"));
    store.delete(&task.id).unwrap();
    assert!(store.get(&task.id).is_err());
    assert!(store.delete(&task.id).is_err());
}

#[test]
fn status_transitions_through_store_stamp_timestamps() {
    let (store, clock) = store();
    clock.set_epoch_ms(1_000);
    let task = store.create(config("s1"));

    clock.set_epoch_ms(2_000);
    let running = store.set_status(&task.id, TaskStatus::Running).unwrap();
    assert_eq!(running.started_at_ms, Some(2_000));

    clock.advance(Duration::from_secs(3));
    let done = store.set_status(&task.id, TaskStatus::Completed).unwrap();
    assert_eq!(done.completed_at_ms, Some(5_000));
    assert_eq!(done.termination_reason, TerminationReason::Completed);
}

#[test]
fn set_result_completes_task() {
    let (store, _clock) = store();
    let task = store.create(config("s1"));
    let updated = store
        .set_result(
            &task.id,
            TaskResult {
                answer: "done".to_string(),
                iterations: 4,
                tokens_used: 321,
                ..TaskResult::default()
            },
        )
        .unwrap();
    assert_eq!(updated.status, TaskStatus::Completed);
    assert_eq!(updated.total_iterations, 4);
    assert_eq!(updated.total_tokens, 321);
}

#[test]
fn set_error_fails_task() {
    let (store, _clock) = store();
    let task = store.create(config("s1"));
    let updated = store.set_error(&task.id, "boom").unwrap();
    assert_eq!(updated.status, TaskStatus::Failed);
    assert_eq!(updated.error.as_deref(), Some("boom"));
    assert_eq!(updated.termination_reason, TerminationReason::Error);
}

#[test]
fn set_termination_reason_overrides_inference() {
    let (store, _clock) = store();
    let task = store.create(config("s1"));
    store
        .set_termination_reason(&task.id, TerminationReason::Timeout)
        .unwrap();
    let updated = store.set_status(&task.id, TaskStatus::Cancelled).unwrap();
    assert_eq!(updated.termination_reason, TerminationReason::Timeout);
}

#[test]
fn progress_sink_updates_are_monotonic() {
    let (store, _clock) = store();
    let task = store.create(config("s1"));
    let sink: &dyn ProgressSink = &store;

    sink.update_progress(&task.id, 3, Some(150));
    sink.update_progress(&task.id, 2, Some(90));
    let current = store.get(&task.id).unwrap();
    assert_eq!(current.current_iteration, 3);
    assert_eq!(current.tokens_used, 150);

    sink.update_totals(&task.id, 5, 900);
    sink.update_totals(&task.id, 4, 100);
    let current = store.get(&task.id).unwrap();
    assert_eq!(current.total_iterations, 5);
    assert_eq!(current.total_tokens, 900);
}

#[test]
fn progress_sink_ignores_unknown_tasks() {
    let (store, _clock) = store();
    let sink: &dyn ProgressSink = &store;
    // Must not panic or create records.
    sink.update_progress(&TaskId::new("ghost"), 1, None);
    sink.update_totals(&TaskId::new("ghost"), 1, 1);
    assert_eq!(store.list(0, 0).1, 0);
}

#[test]
fn update_replaces_existing_record_only() {
    let (store, _clock) = store();
    let mut task = store.create(config("s1"));
    task.metadata
        .insert("origin".to_string(), "api".to_string());
    store.update(task.clone()).unwrap();
    assert_eq!(
        store.get(&task.id).unwrap().metadata.get("origin"),
        Some(&"api".to_string())
    );

    let phantom = Task::new_with_epoch_ms(
        TaskConfig {
            id: TaskId::new("phantom"),
            ..config("s1")
        },
        0,
    );
    assert!(store.update(phantom).is_err());
}
