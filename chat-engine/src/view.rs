//! Local view transforms over the moderation window. Never touch the subscription.

use chat_core::Message;

/// Search text plus the "show deleted" toggle.
///
/// Search is a case-insensitive substring match on display name or body; an empty search
/// matches everything. Surrounding whitespace in the search text is ignored.
/// Deleted messages are hidden unless `show_deleted` is on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModerationFilter {
    pub search: String,
    pub show_deleted: bool,
}

impl ModerationFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = search.into();
        self
    }

    pub fn show_deleted(mut self, show_deleted: bool) -> Self {
        self.show_deleted = show_deleted;
        self
    }

    pub fn matches(&self, message: &Message) -> bool {
        if message.is_deleted() && !self.show_deleted {
            return false;
        }
        let needle = self.search.trim().to_lowercase();
        needle.is_empty()
            || message.display_name.to_lowercase().contains(&needle)
            || message.body.to_lowercase().contains(&needle)
    }

    /// Keeps matching messages in their existing order.
    pub fn apply(&self, messages: &[Message]) -> Vec<Message> {
        messages
            .iter()
            .filter(|message| self.matches(message))
            .cloned()
            .collect()
    }
}

/// Counts over the current window, for display only (not authoritative beyond the window).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModerationStats {
    pub total: usize,
    pub deleted: usize,
    pub visible: usize,
}

impl ModerationStats {
    pub fn from_messages(messages: &[Message]) -> Self {
        let deleted = messages.iter().filter(|m| m.is_deleted()).count();
        Self {
            total: messages.len(),
            deleted,
            visible: messages.len() - deleted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_core::Deletion;

    fn message(id: &str, name: &str, body: &str, deleted: bool) -> Message {
        Message {
            id: id.to_string(),
            author_id: format!("author-{}", id),
            display_name: name.to_string(),
            avatar_url: None,
            body: body.to_string(),
            sent_at: 0,
            deletion: deleted.then(|| Deletion {
                deleted_at: 1,
                deleted_by: "Mod1".to_string(),
            }),
        }
    }

    fn window() -> Vec<Message> {
        vec![
            message("1", "Alice", "Hello there", false),
            message("2", "Bob", "spam SPAM spam", true),
            message("3", "alicia", "goodbye", false),
            message("4", "Carol", "hi ALICE", false),
        ]
    }

    fn ids(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn test_default_hides_deleted() {
        assert_eq!(ids(&ModerationFilter::new().apply(&window())), vec!["1", "3", "4"]);
    }

    #[test]
    fn test_show_deleted() {
        let filter = ModerationFilter::new().show_deleted(true);
        assert_eq!(ids(&filter.apply(&window())), vec!["1", "2", "3", "4"]);
    }

    #[test]
    fn test_search_is_case_insensitive_over_name_and_body() {
        let filter = ModerationFilter::new().with_search("ALI");
        assert_eq!(ids(&filter.apply(&window())), vec!["1", "3", "4"]);

        let filter = ModerationFilter::new().with_search("spam").show_deleted(true);
        assert_eq!(ids(&filter.apply(&window())), vec!["2"]);

        let filter = ModerationFilter::new().with_search("spam");
        assert!(filter.apply(&window()).is_empty());
    }

    #[test]
    fn test_search_ignores_surrounding_whitespace() {
        let filter = ModerationFilter::new().with_search("  goodbye ");
        assert_eq!(ids(&filter.apply(&window())), vec!["3"]);

        let filter = ModerationFilter::new().with_search("   ");
        assert_eq!(ids(&filter.apply(&window())), vec!["1", "3", "4"]);
    }

    #[test]
    fn test_stats() {
        let stats = ModerationStats::from_messages(&window());
        assert_eq!(
            stats,
            ModerationStats {
                total: 4,
                deleted: 1,
                visible: 3
            }
        );
        assert_eq!(ModerationStats::from_messages(&[]), ModerationStats::default());
    }
}
