//! Core types: identity snapshot, chat message, and the draft written on send.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};

/// Identity snapshot handed in by the identity provider. Read-only for the chat core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub is_moderator: bool,
}

impl Identity {
    /// Regular participant.
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            avatar_url: None,
            is_moderator: false,
        }
    }

    /// Participant carrying the moderator flag.
    pub fn moderator(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            is_moderator: true,
            ..Self::new(id, display_name)
        }
    }

    pub fn with_avatar(mut self, avatar_url: impl Into<String>) -> Self {
        self.avatar_url = Some(avatar_url.into());
        self
    }
}

/// Audit trail of a soft delete. Set once, never cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deletion {
    /// Moderation instant, milliseconds since epoch (server-observed).
    pub deleted_at: i64,
    /// Moderator display name (or the configured fallback label).
    pub deleted_by: String,
}

/// A chat message as known to the engines after decoding a backend record.
///
/// `deletion` is `Some` exactly when the message has been soft-deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub author_id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub body: String,
    /// Server-observed creation instant, milliseconds since epoch. Sort key.
    pub sent_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion: Option<Deletion>,
}

impl Message {
    pub fn is_deleted(&self) -> bool {
        self.deletion.is_some()
    }

    pub fn deleted_at(&self) -> Option<i64> {
        self.deletion.as_ref().map(|d| d.deleted_at)
    }

    pub fn deleted_by(&self) -> Option<&str> {
        self.deletion.as_ref().map(|d| d.deleted_by.as_str())
    }

    /// `sent_at` as a UTC timestamp; `None` if out of chrono's range.
    pub fn sent_at_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.sent_at).single()
    }
}

/// What a send writes: the author snapshot and the trimmed body. No id, no timestamp;
/// both are assigned by the backend at write time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDraft {
    pub author_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub body: String,
}

impl MessageDraft {
    /// Validates and snapshots `author`. The body is trimmed and must be non-empty;
    /// the author must carry a non-empty id and display name.
    pub fn new(body: &str, author: &Identity) -> Result<Self> {
        let body = body.trim();
        if body.is_empty() {
            return Err(ChatError::Validation("message body is empty".to_string()));
        }
        if author.id.trim().is_empty() {
            return Err(ChatError::Validation("author id is missing".to_string()));
        }
        let display_name = author.display_name.trim();
        if display_name.is_empty() {
            return Err(ChatError::Validation(
                "author display name is missing".to_string(),
            ));
        }

        Ok(Self {
            author_id: author.id.clone(),
            display_name: display_name.to_string(),
            avatar_url: author
                .avatar_url
                .as_deref()
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string),
            body: body.to_string(),
        })
    }
}
