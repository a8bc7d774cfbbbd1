// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for history persistence.

use thiserror::Error;

/// Errors that can occur in history store operations
#[derive(Debug, Error)]
pub enum HistoryError {
    /// The bounded append queue stayed full past the append timeout.
    #[error("history queue full")]
    QueueFull,
    /// The store was closed; no further events are accepted.
    #[error("history store closed")]
    Closed,
    /// The waiting operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,
    /// A flush did not finish within its deadline.
    #[error("flush deadline exceeded")]
    Timeout,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// Backend I/O failure; the caller may retry.
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<rusqlite::Error> for HistoryError {
    fn from(e: rusqlite::Error) -> Self {
        HistoryError::Backend(e.to_string())
    }
}
