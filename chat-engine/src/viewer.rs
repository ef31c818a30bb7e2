//! Viewer Chat Engine: the participant-facing feed.
//!
//! Keeps the most recent `viewer_window` messages with soft-deleted ones filtered out. Sending
//! writes through the adapter and leaves the local list alone; the new message shows up with the
//! next snapshot.

use chat_core::{ChatError, Identity, Message, MessageDraft, Result, VisibilityPolicy};
use chat_stream::StreamAdapter;
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::config::EngineConfig;
use crate::lifecycle::{ConnectionState, LiveFeed};

pub struct ViewerEngine {
    feed: LiveFeed,
}

impl ViewerEngine {
    pub fn new(adapter: Arc<dyn StreamAdapter>, config: &EngineConfig) -> Self {
        Self {
            feed: LiveFeed::new(
                adapter,
                config.stream_path.clone(),
                config.viewer_window,
                VisibilityPolicy::LiveOnly,
            ),
        }
    }

    #[instrument(skip(self), fields(path = %self.feed.stream_path()))]
    pub async fn connect(&self) -> Result<()> {
        self.feed.connect().await
    }

    pub fn disconnect(&self) {
        self.feed.disconnect();
    }

    /// Posts `body` as `author`. Returns the backend id of the new record.
    ///
    /// Invalid input fails with [`ChatError::Validation`] before any backend call. The result
    /// of an in-flight send is not tied to the connection: callers drop it if the engine was
    /// disconnected meanwhile.
    #[instrument(skip(self, body, author), fields(author_id = %author.id))]
    pub async fn send(&self, body: &str, author: &Identity) -> Result<String> {
        let draft = MessageDraft::new(body, author).map_err(|e| {
            self.feed.record_error(&e);
            e
        })?;

        match self
            .feed
            .adapter()
            .append(self.feed.stream_path(), &draft)
            .await
        {
            Ok(id) => {
                info!(message_id = %id, len = draft.body.len(), "step: message sent");
                Ok(id)
            }
            Err(e) => {
                error!(error = %e, "Send failed");
                let err = ChatError::from(e);
                self.feed.record_error(&err);
                Err(err)
            }
        }
    }

    /// Visible messages: not deleted, ascending by `sent_at`, ties by `id`.
    pub fn messages(&self) -> Vec<Message> {
        self.feed.messages()
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
