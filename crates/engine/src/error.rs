// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the engine

use relay_adapters::AgentError;
use relay_storage::HistoryError;
use thiserror::Error;

/// Errors surfaced by the dispatch layer
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("task not found: {0}")]
    TaskNotFound(String),
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("share token not found: {0}")]
    ShareTokenNotFound(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("agent error: {0}")]
    Agent(#[from] AgentError),
    #[error(transparent)]
    History(#[from] HistoryError),
}
