//! Backend Stream Adapter: engine-level operations on top of the three backend primitives.
//!
//! The adapter owns the decode step. Snapshots reach the engines as whole windows of validated
//! [`Message`]s; malformed records are logged and skipped.

use async_trait::async_trait;
use chat_core::{Message, MessageDraft};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::backend::{server_timestamp, Disposer, OrderedQuery, RawListener, RealtimeBackend};
use crate::error::StreamError;
use crate::record::{decode_record, encode_draft};

/// Receives the full decoded window on every change (a total replacement, not a diff), or the
/// subscription's read error.
pub type SnapshotListener = Arc<dyn Fn(Result<Vec<Message>, StreamError>) + Send + Sync>;

/// Child a subscription orders by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKey {
    SentAt,
}

impl OrderKey {
    pub fn child(&self) -> &'static str {
        match self {
            OrderKey::SentAt => "sentAt",
        }
    }
}

/// Fields merged into an existing record by [`StreamAdapter::patch`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    fields: Map<String, Value>,
}

impl RecordPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// `deleted = true`, `deletedAt = <server now>`, `deletedBy = deleted_by`.
    pub fn soft_delete(deleted_by: &str) -> Self {
        Self::new()
            .set("deleted", true)
            .set("deletedAt", server_timestamp())
            .set("deletedBy", deleted_by)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }
}

/// Typed view of the realtime backend used by the engines.
#[async_trait]
pub trait StreamAdapter: Send + Sync {
    /// Creates a new record from `draft`; the backend assigns the id and `sentAt`.
    async fn append(&self, stream_path: &str, draft: &MessageDraft) -> Result<String, StreamError>;

    /// Opens a live subscription over the most recent `limit` records ordered by `order_key`.
    /// The subscription is not torn down on error; the caller disposes it.
    async fn subscribe_ordered(
        &self,
        stream_path: &str,
        order_key: OrderKey,
        limit: usize,
        listener: SnapshotListener,
    ) -> Result<Disposer, StreamError>;

    /// Merges `patch` into the record `id` without touching other fields.
    async fn patch(&self, stream_path: &str, id: &str, patch: RecordPatch)
        -> Result<(), StreamError>;
}

/// [`StreamAdapter`] over any [`RealtimeBackend`].
#[derive(Clone)]
pub struct BackendStreamAdapter {
    backend: Arc<dyn RealtimeBackend>,
}

impl BackendStreamAdapter {
    pub fn new(backend: Arc<dyn RealtimeBackend>) -> Self {
        Self { backend }
    }

    /// Decodes a raw window, dropping records that fail validation.
    fn decode_window(snapshot: Vec<(String, Value)>) -> Vec<Message> {
        let total = snapshot.len();
        let messages: Vec<Message> = snapshot
            .iter()
            .filter_map(|(id, value)| match decode_record(id, value) {
                Ok(message) => Some(message),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed record");
                    None
                }
            })
            .collect();
        debug!(total, decoded = messages.len(), "Decoded snapshot");
        messages
    }
}

#[async_trait]
impl StreamAdapter for BackendStreamAdapter {
    async fn append(&self, stream_path: &str, draft: &MessageDraft) -> Result<String, StreamError> {
        self.backend
            .push(stream_path, encode_draft(draft))
            .await
            .map_err(|e| {
                error!(path = %stream_path, error = %e, "Append failed");
                e
            })
    }

    async fn subscribe_ordered(
        &self,
        stream_path: &str,
        order_key: OrderKey,
        limit: usize,
        listener: SnapshotListener,
    ) -> Result<Disposer, StreamError> {
        let raw: RawListener = Arc::new(move |delivery| match delivery {
            Ok(snapshot) => listener(Ok(Self::decode_window(snapshot))),
            Err(e) => listener(Err(e)),
        });

        self.backend
            .on_value(stream_path, OrderedQuery::new(order_key.child(), limit), raw)
            .await
    }

    async fn patch(
        &self,
        stream_path: &str,
        id: &str,
        patch: RecordPatch,
    ) -> Result<(), StreamError> {
        self.backend
            .update(stream_path, id, patch.into_fields())
            .await
            .map_err(|e| {
                error!(path = %stream_path, id = %id, error = %e, "Patch failed");
                e
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_soft_delete_patch_fields() {
        let patch = RecordPatch::soft_delete("Mod1");
        let fields = patch.fields();
        assert_eq!(fields["deleted"], json!(true));
        assert_eq!(fields["deletedBy"], json!("Mod1"));
        assert_eq!(fields["deletedAt"], server_timestamp());
        assert_eq!(fields.len(), 3);
    }

    #[test]
    fn test_decode_window_skips_malformed() {
        let snapshot = vec![
            (
                "a".to_string(),
                json!({ "authorId": "u1", "displayName": "Alice", "body": "hi", "sentAt": 1 }),
            ),
            ("b".to_string(), json!({ "deleted": true })),
            (
                "c".to_string(),
                json!({ "authorId": "u2", "displayName": "Bob", "body": "yo", "sentAt": 2 }),
            ),
        ];
        let messages = BackendStreamAdapter::decode_window(snapshot);
        let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }
}
