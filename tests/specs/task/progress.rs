//! Observed events drive task progress counters through the broadcaster.

use crate::prelude::*;
use relay_core::{event_types, TaskStatus};
use relay_engine::TaskRequest;
use serde_json::Value;

#[tokio::test]
async fn node_events_update_bound_task_progress() {
    let stack = Stack::new();

    stack.agent.push_outcome(relay_adapters::FakeOutcome::Hang);
    stack.agent.emit_events(vec![
        envelope_with(
            "s1",
            event_types::NODE_STARTED,
            &[("iteration", Value::from(3))],
        ),
        envelope_with(
            "s1",
            event_types::NODE_COMPLETED,
            &[("iteration", Value::from(3)), ("tokens_used", Value::from(150))],
        ),
    ]);

    let task = stack
        .executor
        .execute_task_async(TaskRequest {
            text: "iterate".to_string(),
            session_id: sid("s1"),
            ..TaskRequest::default()
        })
        .await
        .unwrap();

    // The worker is hung after emitting, so the counters settle.
    for _ in 0..500 {
        let current = stack.tasks.get(&task.id).unwrap();
        if current.current_iteration == 3 && current.tokens_used == 150 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    let current = stack.tasks.get(&task.id).unwrap();
    assert_eq!(current.current_iteration, 3);
    assert_eq!(current.tokens_used, 150);

    stack.executor.cancel_task(&task.id).await.unwrap();
    stack.wait_for_status(&task.id, TaskStatus::Cancelled).await;
    stack.history.close().await.unwrap();
}

#[tokio::test]
async fn late_out_of_order_events_never_regress_counters() {
    let stack = Stack::new();
    stack.agent.push_outcome(relay_adapters::FakeOutcome::Hang);
    stack.agent.emit_events(vec![
        envelope_with(
            "s1",
            event_types::NODE_COMPLETED,
            &[("iteration", Value::from(5)), ("tokens_used", Value::from(500))],
        ),
        // Late events from an earlier iteration.
        envelope_with(
            "s1",
            event_types::NODE_COMPLETED,
            &[("iteration", Value::from(2)), ("tokens_used", Value::from(90))],
        ),
    ]);

    let task = stack
        .executor
        .execute_task_async(TaskRequest {
            text: "iterate".to_string(),
            session_id: sid("s1"),
            ..TaskRequest::default()
        })
        .await
        .unwrap();

    for _ in 0..500 {
        if stack.tasks.get(&task.id).unwrap().current_iteration == 5 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    let current = stack.tasks.get(&task.id).unwrap();
    assert_eq!(current.current_iteration, 5);
    assert_eq!(current.tokens_used, 500);

    stack.executor.cancel_task(&task.id).await.unwrap();
    stack.wait_for_status(&task.id, TaskStatus::Cancelled).await;
    stack.history.close().await.unwrap();
}
