// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Attachment blob offload contract.
//!
//! During sanitization, large non-text attachment payloads are handed to
//! an [`AttachmentStorer`] and replaced by the URI it returns. Concrete
//! object stores live outside this core.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Errors from attachment storage
#[derive(Debug, Error)]
pub enum StoreBytesError {
    #[error("attachment store failed: {0}")]
    Failed(String),
}

/// Stores decoded attachment bytes, returning a dereferenceable URI.
#[async_trait]
pub trait AttachmentStorer: Send + Sync + 'static {
    async fn store_bytes(
        &self,
        name: &str,
        media_type: &str,
        bytes: &[u8],
    ) -> Result<String, StoreBytesError>;
}

/// Process-local attachment store.
///
/// Hands out `mem://attachments/<n>/<name>` handles; useful for embedded
/// deployments and tests.
#[derive(Default)]
pub struct MemoryAttachmentStorer {
    counter: AtomicU64,
    objects: Mutex<HashMap<String, StoredObject>>,
}

#[derive(Debug, Clone)]
struct StoredObject {
    media_type: String,
    bytes: Vec<u8>,
}

impl MemoryAttachmentStorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }

    /// Fetch stored bytes by the handle returned from `store_bytes`.
    pub fn get(&self, uri: &str) -> Option<Vec<u8>> {
        self.objects.lock().get(uri).map(|o| o.bytes.clone())
    }

    pub fn media_type(&self, uri: &str) -> Option<String> {
        self.objects.lock().get(uri).map(|o| o.media_type.clone())
    }
}

#[async_trait]
impl AttachmentStorer for MemoryAttachmentStorer {
    async fn store_bytes(
        &self,
        name: &str,
        media_type: &str,
        bytes: &[u8],
    ) -> Result<String, StoreBytesError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let uri = format!("mem://attachments/{n}/{name}");
        self.objects.lock().insert(
            uri.clone(),
            StoredObject {
                media_type: media_type.to_string(),
                bytes: bytes.to_vec(),
            },
        );
        Ok(uri)
    }
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use fake::FailingAttachmentStorer;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;

    /// Storer that always fails, to exercise fallback stripping.
    #[derive(Default)]
    pub struct FailingAttachmentStorer;

    #[async_trait]
    impl AttachmentStorer for FailingAttachmentStorer {
        async fn store_bytes(
            &self,
            _name: &str,
            _media_type: &str,
            _bytes: &[u8],
        ) -> Result<String, StoreBytesError> {
            Err(StoreBytesError::Failed("injected failure".to_string()))
        }
    }
}

#[cfg(test)]
#[path = "attachment_store_tests.rs"]
mod tests;
