//! Moderation Engine: the unfiltered audit feed and soft delete.
//!
//! Observes the most recent `moderation_window` messages including soft-deleted ones. Search,
//! the "show deleted" toggle and counts are local transforms over that window.
//!
//! Authorization is decided by the hosting environment; this engine only checks the moderator
//! flag on the identity it is handed.

use chat_core::{ChatError, Identity, Message, Result, VisibilityPolicy};
use chat_stream::{RecordPatch, StreamAdapter};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, info, instrument, warn};

use crate::config::EngineConfig;
use crate::lifecycle::{ConnectionState, LiveFeed};
use crate::view::{ModerationFilter, ModerationStats};

/// Result of a soft delete that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The patch was issued.
    Deleted,
    /// Already deleted in the local window, or a delete of the same id is still in flight on this
    /// engine; nothing was written and the first audit trail stands.
    AlreadyDeleted,
}

/// Ids with a soft-delete patch in flight. The entry is removed when the guard drops.
struct PendingDelete<'a> {
    pending: &'a Mutex<HashSet<String>>,
    id: String,
}

impl<'a> PendingDelete<'a> {
    fn claim(pending: &'a Mutex<HashSet<String>>, id: &str) -> Option<Self> {
        let claimed = pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string());
        claimed.then(|| Self {
            pending,
            id: id.to_string(),
        })
    }
}

impl Drop for PendingDelete<'_> {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

pub struct ModerationEngine {
    feed: LiveFeed,
    default_label: String,
    pending: Mutex<HashSet<String>>,
}

impl ModerationEngine {
    pub fn new(adapter: Arc<dyn StreamAdapter>, config: &EngineConfig) -> Self {
        Self {
            feed: LiveFeed::new(
                adapter,
                config.stream_path.clone(),
                config.moderation_window,
                VisibilityPolicy::All,
            ),
            default_label: config.default_moderator_label.clone(),
            pending: Mutex::new(HashSet::new()),
        }
    }

    #[instrument(skip(self), fields(path = %self.feed.stream_path()))]
    pub async fn connect(&self) -> Result<()> {
        self.feed.connect().await
    }

    pub fn disconnect(&self) {
        self.feed.disconnect();
    }

    /// Marks message `id` deleted by `moderator`.
    ///
    /// Fails with [`ChatError::Unauthorized`] for a non-moderator identity and
    /// [`ChatError::NotFound`] for an id outside the local window; neither reaches the backend.
    #[instrument(skip(self, moderator), fields(moderator_id = %moderator.id))]
    pub async fn soft_delete(&self, id: &str, moderator: &Identity) -> Result<DeleteOutcome> {
        if !moderator.is_moderator {
            let err = ChatError::Unauthorized(format!(
                "{} is not a moderator",
                moderator.id
            ));
            warn!(message_id = %id, "Soft delete rejected: not a moderator");
            self.feed.record_error(&err);
            return Err(err);
        }

        let Some(target) = self.feed.find(id) else {
            let err = ChatError::NotFound(format!("message {} is not in the moderation window", id));
            warn!(message_id = %id, "Soft delete rejected: unknown message");
            self.feed.record_error(&err);
            return Err(err);
        };

        if target.is_deleted() {
            info!(
                message_id = %id,
                deleted_by = target.deleted_by().unwrap_or_default(),
                "step: already deleted, skipping"
            );
            return Ok(DeleteOutcome::AlreadyDeleted);
        }

        let Some(_claim) = PendingDelete::claim(&self.pending, id) else {
            info!(message_id = %id, "step: delete already in flight, skipping");
            return Ok(DeleteOutcome::AlreadyDeleted);
        };

        let deleted_by = self.deleted_by_label(moderator);
        match self
            .feed
            .adapter()
            .patch(self.feed.stream_path(), id, RecordPatch::soft_delete(&deleted_by))
            .await
        {
            Ok(()) => {
                info!(message_id = %id, deleted_by = %deleted_by, "step: message soft-deleted");
                Ok(DeleteOutcome::Deleted)
            }
            Err(e) => {
                error!(message_id = %id, error = %e, "Soft delete failed");
                let err = ChatError::from(e);
                self.feed.record_error(&err);
                Err(err)
            }
        }
    }

    fn deleted_by_label(&self, moderator: &Identity) -> String {
        let name = moderator.display_name.trim();
        if name.is_empty() {
            self.default_label.clone()
        } else {
            name.to_string()
        }
    }

    /// Whole window, deleted included, ascending by `sent_at` then `id`.
    pub fn messages(&self) -> Vec<Message> {
        self.feed.messages()
    }

    /// Window narrowed by `filter`, order preserved.
    pub fn view(&self, filter: &ModerationFilter) -> Vec<Message> {
        filter.apply(&self.feed.messages())
    }

    pub fn stats(&self) -> ModerationStats {
        ModerationStats::from_messages(&self.feed.messages())
    }

    pub fn state(&self) -> ConnectionState {
        self.feed.state()
    }

    pub fn is_connected(&self) -> bool {
        self.feed.is_connected()
    }

    pub fn is_loading(&self) -> bool {
        self.feed.is_loading()
    }

    pub fn last_error(&self) -> Option<ChatError> {
        self.feed.last_error()
    }

    pub fn clear_error(&self) {
        self.feed.clear_error();
    }
}
