//! Cancellation: status transition, terminal reason, and the guaranteed
//! terminal envelope.

use crate::prelude::*;
use relay_adapters::FakeOutcome;
use relay_core::{event_types, TaskStatus, TerminationReason};
use relay_engine::{DispatchError, EventQueue, TaskRequest};

#[tokio::test]
async fn cancel_task_reaches_history_and_subscribers() {
    let stack = Stack::new();
    stack.agent.push_outcome(FakeOutcome::Hang);

    let queue = EventQueue::bounded(8);
    stack
        .broadcaster
        .register_subscriber(&sid("s1"), queue.clone());

    let task = stack
        .executor
        .execute_task_async(TaskRequest {
            text: "hang".to_string(),
            session_id: sid("s1"),
            ..TaskRequest::default()
        })
        .await
        .unwrap();
    stack.wait_for_status(&task.id, TaskStatus::Running).await;

    stack.executor.cancel_task(&task.id).await.unwrap();

    let cancelled = stack.wait_for_status(&task.id, TaskStatus::Cancelled).await;
    assert_eq!(cancelled.termination_reason, TerminationReason::Cancelled);

    // The cancelled envelope appears in the session's history...
    let history = stack.broadcaster.get_history(&sid("s1")).await.unwrap();
    assert!(history
        .iter()
        .any(|e| e.base().event_type() == event_types::RESULT_CANCELLED));

    // ...and reaches still-connected subscribers.
    let mut saw_cancelled = false;
    while let Some(event) = queue.try_recv() {
        if event.base().event_type() == event_types::RESULT_CANCELLED {
            saw_cancelled = true;
        }
    }
    assert!(saw_cancelled);

    // The cancelled task remains visible through get_task.
    assert_eq!(
        stack.executor.get_task(&task.id).unwrap().status,
        TaskStatus::Cancelled
    );

    stack.history.close().await.unwrap();
}

#[tokio::test]
async fn caller_abandonment_does_not_cancel_the_detached_task() {
    let stack = Stack::new();

    // Dropping the dispatch future's surroundings (the caller) must not
    // stop the worker; only cancel_task does.
    let task = stack
        .executor
        .execute_task_async(TaskRequest {
            text: "run detached".to_string(),
            session_id: sid("s1"),
            ..TaskRequest::default()
        })
        .await
        .unwrap();

    let done = stack.wait_for_status(&task.id, TaskStatus::Completed).await;
    assert_eq!(done.termination_reason, TerminationReason::Completed);

    stack.history.close().await.unwrap();
}

#[tokio::test]
async fn double_cancel_conflicts() {
    let stack = Stack::new();
    stack.agent.push_outcome(FakeOutcome::Hang);

    let task = stack
        .executor
        .execute_task_async(TaskRequest {
            text: "hang".to_string(),
            session_id: sid("s1"),
            ..TaskRequest::default()
        })
        .await
        .unwrap();
    stack.wait_for_status(&task.id, TaskStatus::Running).await;

    stack.executor.cancel_task(&task.id).await.unwrap();
    stack.wait_for_status(&task.id, TaskStatus::Cancelled).await;

    let err = stack.executor.cancel_task(&task.id).await.unwrap_err();
    assert!(matches!(err, DispatchError::Conflict(_)));

    stack.history.close().await.unwrap();
}
