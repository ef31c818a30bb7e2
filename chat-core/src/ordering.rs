//! Ordering and visibility policy shared by both engines.
//!
//! Every snapshot delivery is a full replacement of the window, so the policy is applied to the
//! whole set each time: filter by visibility, then sort ascending by `sent_at`, ties by `id`.

use std::cmp::Ordering;

use crate::types::Message;

/// Ascending by `sent_at`; equal timestamps fall back to lexical `id` order.
pub fn compare_messages(a: &Message, b: &Message) -> Ordering {
    a.sent_at.cmp(&b.sent_at).then_with(|| a.id.cmp(&b.id))
}

pub fn sort_messages(messages: &mut [Message]) {
    messages.sort_by(compare_messages);
}

/// Which messages a feed keeps from each snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityPolicy {
    /// Participants: soft-deleted messages are never shown.
    LiveOnly,
    /// Moderators: everything in the window, deleted included, for audit.
    All,
}

impl VisibilityPolicy {
    pub fn is_visible(&self, message: &Message) -> bool {
        match self {
            VisibilityPolicy::LiveOnly => !message.is_deleted(),
            VisibilityPolicy::All => true,
        }
    }

    /// Filters and sorts one snapshot into the list an engine exposes.
    pub fn apply(&self, messages: Vec<Message>) -> Vec<Message> {
        let mut visible: Vec<Message> = messages
            .into_iter()
            .filter(|m| self.is_visible(m))
            .collect();
        sort_messages(&mut visible);
        visible
    }
}
