// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin session registry and share-token issuance.
//!
//! The agent collaborator owns session semantics; this registry mirrors
//! the sessions the core has confirmed and hands out share tokens for
//! read-only access paths.

use crate::DispatchError;
use parking_lot::RwLock;
use relay_adapters::Session;
use relay_core::{Clock, IdGen, SessionId};
use std::collections::HashMap;
use tracing::debug;

/// In-memory session registry.
pub struct SessionService<C: Clock, G: IdGen> {
    clock: C,
    id_gen: G,
    sessions: RwLock<HashMap<SessionId, Session>>,
    share_tokens: RwLock<HashMap<String, SessionId>>,
}

impl<C: Clock, G: IdGen> SessionService<C, G> {
    pub fn new(clock: C, id_gen: G) -> Self {
        Self {
            clock,
            id_gen,
            sessions: RwLock::new(HashMap::new()),
            share_tokens: RwLock::new(HashMap::new()),
        }
    }

    /// Record a session confirmed by the agent collaborator. A session
    /// seen for the first time gets its creation stamped; re-upserts keep
    /// the original stamp.
    pub fn upsert(&self, mut session: Session) -> Result<Session, DispatchError> {
        if session.id.is_empty() {
            return Err(DispatchError::Validation(
                "session id must not be empty".to_string(),
            ));
        }
        let mut sessions = self.sessions.write();
        if let Some(existing) = sessions.get(&session.id) {
            session.created_at_ms = existing.created_at_ms;
        } else if session.created_at_ms == 0 {
            session.created_at_ms = self.clock.epoch_ms();
        }
        sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    pub fn get(&self, session_id: &SessionId) -> Result<Session, DispatchError> {
        self.sessions
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| DispatchError::SessionNotFound(session_id.to_string()))
    }

    /// All known sessions, newest-first.
    pub fn list(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.sessions.read().values().cloned().collect();
        sessions.sort_by(|a, b| {
            b.created_at_ms
                .cmp(&a.created_at_ms)
                .then_with(|| b.id.as_str().cmp(a.id.as_str()))
        });
        sessions
    }

    /// Remove a session and every share token pointing at it.
    pub fn delete(&self, session_id: &SessionId) -> Result<(), DispatchError> {
        self.sessions
            .write()
            .remove(session_id)
            .ok_or_else(|| DispatchError::SessionNotFound(session_id.to_string()))?;
        self.share_tokens
            .write()
            .retain(|_, sid| *sid != *session_id);
        Ok(())
    }

    /// Issue an opaque token granting access to the session.
    pub fn issue_share_token(&self, session_id: &SessionId) -> Result<String, DispatchError> {
        if session_id.is_empty() {
            return Err(DispatchError::Validation(
                "session id must not be empty".to_string(),
            ));
        }
        if !self.sessions.read().contains_key(session_id) {
            return Err(DispatchError::SessionNotFound(session_id.to_string()));
        }
        let token = self.id_gen.next();
        self.share_tokens
            .write()
            .insert(token.clone(), session_id.clone());
        debug!(session = %session_id.short(12), "share token issued");
        Ok(token)
    }

    /// Resolve a share token back to its session.
    pub fn resolve_share_token(&self, token: &str) -> Result<Session, DispatchError> {
        let session_id = self
            .share_tokens
            .read()
            .get(token)
            .cloned()
            .ok_or_else(|| DispatchError::ShareTokenNotFound(token.to_string()))?;
        self.get(&session_id)
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
