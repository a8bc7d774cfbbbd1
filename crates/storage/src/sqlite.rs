// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite history backend.
//!
//! Events land in a single `events` table. Indexed columns carry the
//! common base attributes and envelope routing ids; the full event JSON
//! lives in the `payload` column and is the source of truth on replay.
//! rusqlite's synchronous API runs under `spawn_blocking` so the async
//! store's worker never blocks the runtime.

use crate::{EventVisitor, HistoryBackend, HistoryError};
use async_trait::async_trait;
use parking_lot::Mutex;
use relay_core::{Event, EventKind, HistoryFilter, SessionId};
use rusqlite::{params, params_from_iter, Connection};
use std::path::Path;
use std::sync::Arc;

// Schema version (increment when changing table definitions)
const SCHEMA_VERSION: i32 = 1;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    task_id TEXT NOT NULL DEFAULT '',
    parent_task_id TEXT NOT NULL DEFAULT '',
    agent_level TEXT NOT NULL DEFAULT 'core',
    event_type TEXT NOT NULL,
    timestamp_ms INTEGER NOT NULL,
    version INTEGER NOT NULL DEFAULT 0,
    workflow_id TEXT NOT NULL DEFAULT '',
    run_id TEXT NOT NULL DEFAULT '',
    node_id TEXT NOT NULL DEFAULT '',
    node_kind TEXT NOT NULL DEFAULT '',
    subtask_index INTEGER,
    subtask_total INTEGER,
    payload TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_session ON events(session_id, id);
CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type, id);
CREATE INDEX IF NOT EXISTS idx_events_session_type ON events(session_id, event_type, id);
CREATE INDEX IF NOT EXISTS idx_events_session_ts ON events(session_id, timestamp_ms DESC);
CREATE INDEX IF NOT EXISTS idx_events_ts ON events(timestamp_ms DESC);
"#;

/// History backend persisting to a SQLite database.
#[derive(Clone)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    pub fn open(db_path: &Path) -> Result<Self, HistoryError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, HistoryError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, HistoryError> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, HistoryError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, HistoryError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || f(&conn.lock()))
            .await
            .map_err(|e| HistoryError::Backend(format!("blocking task failed: {e}")))?
    }
}

fn init_schema(conn: &Connection) -> Result<(), HistoryError> {
    let current_version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if current_version != 0 && current_version != SCHEMA_VERSION {
        conn.execute_batch("DROP TABLE IF EXISTS events;")?;
    }
    conn.execute_batch(SCHEMA)?;
    conn.execute(&format!("PRAGMA user_version = {SCHEMA_VERSION}"), [])?;
    Ok(())
}

fn insert_event(conn: &Connection, event: &Event) -> Result<(), HistoryError> {
    let base = event.base();
    let meta = &base.meta;
    let agent_level = match serde_json::to_value(meta.agent_level)? {
        serde_json::Value::String(s) => s,
        _ => "core".to_string(),
    };
    let (version, workflow_id, run_id, node_id, node_kind) = match &base.kind {
        EventKind::Envelope(env) => (
            env.version,
            env.workflow_id.clone(),
            env.run_id.clone(),
            env.node_id.clone(),
            env.node_kind.clone(),
        ),
        _ => (0, String::new(), String::new(), String::new(), String::new()),
    };
    let subtask = event.subtask_details();
    let payload = serde_json::to_string(event)?;

    conn.execute(
        "INSERT INTO events (
            session_id, task_id, parent_task_id, agent_level, event_type,
            timestamp_ms, version, workflow_id, run_id, node_id, node_kind,
            subtask_index, subtask_total, payload
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            meta.session_id.as_str(),
            meta.task_id.as_str(),
            meta.parent_task_id.as_str(),
            agent_level,
            base.event_type(),
            meta.timestamp_ms as i64,
            version,
            workflow_id,
            run_id,
            node_id,
            node_kind,
            subtask.map(|s| s.index),
            subtask.map(|s| s.total),
            payload,
        ],
    )?;
    Ok(())
}

fn select_events(conn: &Connection, filter: &HistoryFilter) -> Result<Vec<Event>, HistoryError> {
    let mut sql = String::from("SELECT payload FROM events");
    let mut clauses: Vec<String> = Vec::new();
    let mut args: Vec<String> = Vec::new();

    if !filter.session_id.is_empty() {
        args.push(filter.session_id.as_str().to_string());
        clauses.push(format!("session_id = ?{}", args.len()));
    }
    if !filter.event_types.is_empty() {
        let mut placeholders = Vec::with_capacity(filter.event_types.len());
        for event_type in &filter.event_types {
            args.push(event_type.clone());
            placeholders.push(format!("?{}", args.len()));
        }
        clauses.push(format!("event_type IN ({})", placeholders.join(", ")));
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY id");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
        row.get::<_, String>(0)
    })?;

    let mut events = Vec::new();
    for row in rows {
        events.push(serde_json::from_str(&row?)?);
    }
    Ok(events)
}

#[async_trait]
impl HistoryBackend for SqliteBackend {
    async fn append(&self, event: &Event) -> Result<(), HistoryError> {
        let event = event.clone();
        self.with_conn(move |conn| insert_event(conn, &event)).await
    }

    async fn append_batch(&self, events: &[Event]) -> Result<(), HistoryError> {
        if events.is_empty() {
            return Ok(());
        }
        let events = events.to_vec();
        self.with_conn(move |conn| {
            conn.execute_batch("BEGIN")?;
            for event in &events {
                if let Err(e) = insert_event(conn, event) {
                    let _ = conn.execute_batch("ROLLBACK");
                    return Err(e);
                }
            }
            conn.execute_batch("COMMIT")?;
            Ok(())
        })
        .await
    }

    async fn stream(
        &self,
        filter: &HistoryFilter,
        visitor: EventVisitor<'_>,
    ) -> Result<(), HistoryError> {
        let filter = filter.clone();
        let events = self
            .with_conn(move |conn| select_events(conn, &filter))
            .await?;
        for event in events {
            visitor(event);
        }
        Ok(())
    }

    async fn delete_session(&self, session_id: &SessionId) -> Result<(), HistoryError> {
        let session_id = session_id.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM events WHERE session_id = ?1",
                params![session_id.as_str()],
            )?;
            Ok(())
        })
        .await
    }

    async fn has_session_events(&self, session_id: &SessionId) -> Result<bool, HistoryError> {
        let session_id = session_id.clone();
        self.with_conn(move |conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM events WHERE session_id = ?1)",
                params![session_id.as_str()],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
        .await
    }

    async fn prune_before(&self, cutoff_ms: u64, limit: u64) -> Result<u64, HistoryError> {
        self.with_conn(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM events WHERE id IN (
                    SELECT id FROM events WHERE timestamp_ms < ?1 ORDER BY id LIMIT ?2
                )",
                params![cutoff_ms as i64, limit as i64],
            )?;
            Ok(deleted as u64)
        })
        .await
    }
}

#[cfg(test)]
#[path = "sqlite_tests.rs"]
mod tests;
