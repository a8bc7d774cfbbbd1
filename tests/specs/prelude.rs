//! Shared harness for behavioral specs.

#![allow(dead_code)]

use relay_adapters::FakeAgentExecutor;
use relay_core::{
    event_types, Event, EventMeta, FakeClock, SequentialIdGen, SessionId, Task, TaskId, TaskStatus,
};
use relay_engine::{
    EventBroadcaster, ExecutorConfig, ExecutorDeps, ProgressSink, SessionService, TaskExecutor,
    TaskStore,
};
use relay_storage::{AsyncHistoryStore, HistoryConfig, MemoryBackend};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// A fully wired core: fake agent, task store, broadcaster with async
/// history over a memory backend, and the executor facade.
pub struct Stack {
    pub clock: FakeClock,
    pub agent: Arc<FakeAgentExecutor>,
    pub backend: Arc<MemoryBackend>,
    pub history: Arc<AsyncHistoryStore>,
    pub broadcaster: Arc<EventBroadcaster>,
    pub tasks: Arc<TaskStore<FakeClock, SequentialIdGen>>,
    pub executor: TaskExecutor<FakeAgentExecutor, FakeClock, SequentialIdGen>,
}

impl Stack {
    pub fn new() -> Self {
        Self::with_executor_config(ExecutorConfig::default())
    }

    pub fn with_executor_config(config: ExecutorConfig) -> Self {
        let clock = FakeClock::new();
        let agent = Arc::new(FakeAgentExecutor::new());
        let backend = Arc::new(MemoryBackend::new());
        let history = AsyncHistoryStore::spawn(
            backend.clone(),
            HistoryConfig {
                flush_interval: Duration::from_millis(20),
                ..HistoryConfig::default()
            },
        );
        let tasks = Arc::new(TaskStore::new(clock.clone(), SequentialIdGen::new("task")));
        let progress: Arc<dyn ProgressSink> = tasks.clone();
        let broadcaster = Arc::new(
            EventBroadcaster::default()
                .with_history(Arc::clone(&history))
                .with_progress(progress),
        );
        let sessions = Arc::new(SessionService::new(
            clock.clone(),
            SequentialIdGen::new("token"),
        ));
        let executor = TaskExecutor::new(
            ExecutorDeps {
                agent: Some(Arc::clone(&agent)),
                broadcaster: Arc::clone(&broadcaster),
                tasks: Arc::clone(&tasks),
                sessions,
            },
            clock.clone(),
            SequentialIdGen::new("t"),
            config,
        );
        Self {
            clock,
            agent,
            backend,
            history,
            broadcaster,
            tasks,
            executor,
        }
    }

    pub async fn wait_for_status(&self, task_id: &TaskId, status: TaskStatus) -> Task {
        for _ in 0..500 {
            let task = self.tasks.get(task_id).unwrap();
            if task.status == status {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("task never reached {status}");
    }
}

pub fn envelope(session: &str, event_type: &str, ts: u64) -> Event {
    Event::envelope(
        EventMeta::for_session(session).with_timestamp(ts),
        event_type,
        Map::new(),
    )
}

pub fn envelope_with(session: &str, event_type: &str, pairs: &[(&str, Value)]) -> Event {
    let payload: Map<String, Value> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    Event::envelope(EventMeta::for_session(session), event_type, payload)
}

pub fn final_result(session: &str) -> Event {
    envelope(session, event_types::RESULT_FINAL, 0)
}

pub fn sid(s: &str) -> SessionId {
    SessionId::new(s)
}
