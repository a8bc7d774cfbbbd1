// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Attachment records carried by input events.

use crate::id::TaskId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Source tag applied to attachments uploaded by a user.
pub const SOURCE_USER_UPLOAD: &str = "user_upload";

/// A file or blob referenced by a task's input.
///
/// An attachment is actionable when it carries inline base64 `data` or a
/// dereferenceable (non-`data:`) `uri`; both may coexist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    #[serde(default)]
    pub media_type: String,
    /// Inline base64 payload. Stripped or externalized during sanitization.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uri: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "TaskId::is_empty")]
    pub parent_task_id: TaskId,
}

impl Attachment {
    /// True when the attachment can be fetched or read by a consumer.
    pub fn is_actionable(&self) -> bool {
        !self.data.is_empty() || self.has_external_uri()
    }

    /// True when `uri` points outside the event itself (not a `data:` URL).
    pub fn has_external_uri(&self) -> bool {
        !self.uri.is_empty() && !self.uri.starts_with("data:")
    }

    /// Textual media survives persistence inline (subject to a size cap).
    pub fn is_textual_media(&self) -> bool {
        self.media_type.starts_with("text/")
            || self.media_type.contains("markdown")
            || self.media_type.contains("json")
    }
}

/// Normalize a user-supplied attachment map before it enters the event
/// stream: trim names, drop entries that cannot be acted on, and default
/// the source tag.
///
/// Dropped entries: empty name after trimming, or a `data:`-only `uri`
/// with no inline data.
pub fn normalize_user_uploads(
    attachments: HashMap<String, Attachment>,
) -> HashMap<String, Attachment> {
    let mut out = HashMap::with_capacity(attachments.len());
    for (key, mut att) in attachments {
        att.name = att.name.trim().to_string();
        if att.name.is_empty() {
            continue;
        }
        if !att.is_actionable() {
            continue;
        }
        if att.source.is_empty() {
            att.source = SOURCE_USER_UPLOAD.to_string();
        }
        out.insert(key.trim().to_string(), att);
    }
    out
}

#[cfg(test)]
#[path = "attachment_tests.rs"]
mod tests;
