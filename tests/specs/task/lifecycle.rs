//! Task lifecycle guarantees: timestamp ordering, terminal reasons, and
//! the input event on dispatch.

use crate::prelude::*;
use relay_core::{event_types, EventKind, TaskStatus, TerminationReason};
use relay_engine::TaskRequest;
use std::time::Duration;

#[tokio::test]
async fn terminal_task_has_ordered_timestamps_and_a_reason() {
    let stack = Stack::new();
    stack.clock.set_epoch_ms(1_000_000);

    let task = stack
        .executor
        .execute_task_async(TaskRequest {
            text: "do the thing".to_string(),
            session_id: sid("s1"),
            ..TaskRequest::default()
        })
        .await
        .unwrap();

    let done = stack.wait_for_status(&task.id, TaskStatus::Completed).await;

    let created = done.created_at_ms;
    let started = done.started_at_ms.expect("started_at set");
    let completed = done.completed_at_ms.expect("completed_at set");
    assert!(created <= started, "{created} <= {started}");
    assert!(started <= completed, "{started} <= {completed}");
    assert_ne!(done.termination_reason, TerminationReason::None);

    stack.history.close().await.unwrap();
}

#[tokio::test]
async fn dispatch_persists_the_input_event() {
    let stack = Stack::new();
    let task = stack
        .executor
        .execute_task_async(TaskRequest {
            text: "summarize the report".to_string(),
            session_id: sid("s1"),
            ..TaskRequest::default()
        })
        .await
        .unwrap();
    stack.wait_for_status(&task.id, TaskStatus::Completed).await;

    let history = stack.broadcaster.get_history(&sid("s1")).await.unwrap();
    let input = history
        .iter()
        .find_map(|e| match &e.kind {
            EventKind::InputReceived(input) => Some(input.clone()),
            _ => None,
        })
        .expect("input event in history");
    assert_eq!(input.text, "summarize the report");

    stack.history.close().await.unwrap();
}

#[tokio::test]
async fn progress_invariants_hold_once_totals_are_known() {
    let stack = Stack::new();
    let task = stack
        .executor
        .execute_task_async(TaskRequest {
            text: "work".to_string(),
            session_id: sid("s1"),
            ..TaskRequest::default()
        })
        .await
        .unwrap();
    let done = stack.wait_for_status(&task.id, TaskStatus::Completed).await;

    if done.total_iterations > 0 {
        assert!(done.current_iteration <= done.total_iterations);
    }
    if done.total_tokens > 0 {
        assert!(done.tokens_used <= done.total_tokens);
    }

    stack.history.close().await.unwrap();
}

#[tokio::test]
async fn deadline_elapsed_terminates_with_timeout_reason() {
    let stack = Stack::with_executor_config(relay_engine::ExecutorConfig {
        task_timeout: Some(Duration::from_millis(30)),
    });
    stack.agent.push_outcome(relay_adapters::FakeOutcome::Hang);

    let task = stack
        .executor
        .execute_task_async(TaskRequest {
            text: "hang forever".to_string(),
            session_id: sid("s1"),
            ..TaskRequest::default()
        })
        .await
        .unwrap();

    let cancelled = stack.wait_for_status(&task.id, TaskStatus::Cancelled).await;
    assert_eq!(cancelled.termination_reason, TerminationReason::Timeout);

    stack.history.close().await.unwrap();
}

#[tokio::test]
async fn listing_is_newest_first_across_dispatches() {
    let stack = Stack::new();
    let mut ids = Vec::new();
    for i in 0..3 {
        stack.clock.set_epoch_ms(1_000 + i * 1_000);
        let task = stack
            .executor
            .execute_task_async(TaskRequest {
                text: format!("task {i}"),
                session_id: sid("s1"),
                ..TaskRequest::default()
            })
            .await
            .unwrap();
        ids.push(task.id.clone());
    }
    for id in &ids {
        stack.wait_for_status(id, TaskStatus::Completed).await;
    }

    let (page, total) = stack.executor.list_tasks(0, 0);
    assert_eq!(total, 3);
    assert_eq!(page[0].id, ids[2]);
    assert_eq!(page[2].id, ids[0]);

    assert_eq!(stack.executor.list_session_tasks(&sid("s1")).len(), 3);

    stack.history.close().await.unwrap();
}

#[tokio::test]
async fn final_result_envelope_is_critical_for_full_buffers() {
    // End to end: a slow subscriber with a single-slot buffer still sees
    // the terminal result of its session's task.
    let stack = Stack::new();
    let queue = relay_engine::EventQueue::bounded(1);
    stack.broadcaster.register_subscriber(&sid("s1"), queue.clone());

    stack.agent.emit_events(vec![
        envelope("s1", event_types::NODE_STARTED, 1),
        envelope("s1", event_types::NODE_STARTED, 2),
        final_result("s1"),
    ]);

    let task = stack
        .executor
        .execute_task_async(TaskRequest {
            text: "stream a lot".to_string(),
            session_id: sid("s1"),
            ..TaskRequest::default()
        })
        .await
        .unwrap();
    stack.wait_for_status(&task.id, TaskStatus::Completed).await;

    let mut saw_final = false;
    while let Some(event) = queue.try_recv() {
        if event.base().event_type() == event_types::RESULT_FINAL {
            saw_final = true;
        }
    }
    assert!(saw_final, "terminal result must survive a full buffer");

    stack.history.close().await.unwrap();
}
