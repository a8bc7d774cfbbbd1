// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Attachment and payload sanitization before persistence.
//!
//! Large inline base64 blobs must not reach durable storage. Small
//! textual payloads stay inline; everything else is offloaded to an
//! [`AttachmentStorer`] when one is configured, or stripped down to
//! metadata otherwise.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use relay_adapters::AttachmentStorer;
use relay_core::{Attachment, Event, EventKind};
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use tracing::warn;

/// Largest decoded textual payload retained inline.
pub const MAX_INLINE_TEXT_BYTES: usize = 128 * 1024;

/// Return a sanitized clone of `event`. The original is never mutated:
/// events handed to the broadcaster are logically shared.
pub async fn sanitize_event(event: &Event, storer: Option<&dyn AttachmentStorer>) -> Event {
    let mut out = event.clone();
    sanitize_in_place(&mut out, storer).await;
    out
}

fn sanitize_in_place<'a>(
    event: &'a mut Event,
    storer: Option<&'a dyn AttachmentStorer>,
) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        match &mut event.kind {
            EventKind::Subtask(wrapper) => {
                sanitize_in_place(&mut wrapper.inner, storer).await;
            }
            EventKind::InputReceived(input) => {
                for attachment in input.attachments.values_mut() {
                    sanitize_attachment(attachment, storer).await;
                }
            }
            EventKind::Envelope(envelope) => {
                sanitize_map(&mut envelope.payload, storer).await;
            }
            _ => {}
        }
    })
}

async fn sanitize_map<'a>(map: &'a mut Map<String, Value>, storer: Option<&'a dyn AttachmentStorer>) {
    for value in map.values_mut() {
        sanitize_value(value, storer).await;
    }
}

fn sanitize_value<'a>(
    value: &'a mut Value,
    storer: Option<&'a dyn AttachmentStorer>,
) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        match value {
            Value::Object(map) => {
                if looks_like_attachment(map) {
                    if let Ok(mut attachment) =
                        serde_json::from_value::<Attachment>(Value::Object(map.clone()))
                    {
                        sanitize_attachment(&mut attachment, storer).await;
                        if let Ok(Value::Object(sanitized)) = serde_json::to_value(&attachment) {
                            *map = sanitized;
                        }
                        return;
                    }
                }
                for nested in map.values_mut() {
                    sanitize_value(nested, storer).await;
                }
            }
            Value::Array(items) => {
                for item in items {
                    sanitize_value(item, storer).await;
                }
            }
            _ => {}
        }
    })
}

fn looks_like_attachment(map: &Map<String, Value>) -> bool {
    map.get("name").is_some_and(Value::is_string)
        && map.get("media_type").is_some_and(Value::is_string)
        && (map.contains_key("data") || map.contains_key("uri"))
}

/// Apply the sanitization rules to one attachment in place.
///
/// - no inline data and an external URI: untouched;
/// - textual media at or under [`MAX_INLINE_TEXT_BYTES`] decoded: keep the
///   data, drop any `data:` URI duplicate;
/// - otherwise offload through the storer when present, replacing `uri`;
/// - otherwise strip the data, keeping metadata and any external URI.
pub async fn sanitize_attachment(
    attachment: &mut Attachment,
    storer: Option<&dyn AttachmentStorer>,
) {
    if attachment.data.is_empty() {
        // A data: URI with no inline payload carries nothing worth
        // persisting; strip it down to metadata.
        if !attachment.uri.is_empty() && !attachment.has_external_uri() {
            attachment.uri.clear();
        }
        return;
    }

    if attachment.is_textual_media() && estimated_decoded_len(&attachment.data) <= MAX_INLINE_TEXT_BYTES
    {
        if attachment.uri.starts_with("data:") {
            attachment.uri.clear();
        }
        return;
    }

    if let Some(storer) = storer {
        match BASE64.decode(attachment.data.as_bytes()) {
            Ok(bytes) => {
                match storer
                    .store_bytes(&attachment.name, &attachment.media_type, &bytes)
                    .await
                {
                    Ok(uri) => {
                        attachment.uri = uri;
                        if attachment.size_bytes == 0 {
                            attachment.size_bytes = bytes.len() as u64;
                        }
                        attachment.data.clear();
                        return;
                    }
                    Err(e) => {
                        warn!(name = %attachment.name, error = %e, "attachment offload failed, stripping inline data");
                    }
                }
            }
            Err(e) => {
                warn!(name = %attachment.name, error = %e, "attachment base64 decode failed, stripping inline data");
            }
        }
    }

    attachment.data.clear();
    if attachment.uri.starts_with("data:") {
        attachment.uri.clear();
    }
}

/// Decoded size of a base64 string, without decoding it.
fn estimated_decoded_len(data: &str) -> usize {
    let padding = data.bytes().rev().take_while(|b| *b == b'=').count();
    ((data.len() / 4) * 3).saturating_sub(padding.min(2))
}

#[cfg(test)]
#[path = "sanitize_tests.rs"]
mod tests;
