// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! History replay filters.

use crate::event::Event;
use crate::id::SessionId;
use serde::{Deserialize, Serialize};

/// Selects which retained events a history read observes.
///
/// An empty `session_id` matches every session; an empty `event_types`
/// list matches every type. Type matching applies to the unwrapped base
/// event so wrapped subtask events are selectable by their inner type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryFilter {
    #[serde(default, skip_serializing_if = "SessionId::is_empty")]
    pub session_id: SessionId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_types: Vec<String>,
}

impl HistoryFilter {
    /// Filter scoped to one session, all event types.
    pub fn session(session_id: impl Into<SessionId>) -> Self {
        Self {
            session_id: session_id.into(),
            event_types: Vec::new(),
        }
    }

    /// Restrict to the given event types.
    pub fn with_event_types(mut self, event_types: Vec<String>) -> Self {
        self.event_types = event_types;
        self
    }

    pub fn matches(&self, event: &Event) -> bool {
        if !self.session_id.is_empty() && event.meta.session_id != self.session_id {
            return false;
        }
        if !self.event_types.is_empty() {
            let base_type = event.base().event_type();
            return self.event_types.iter().any(|t| t == base_type);
        }
        true
    }
}

#[cfg(test)]
#[path = "filter_tests.rs"]
mod tests;
