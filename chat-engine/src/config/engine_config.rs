//! EngineConfig: loaded from env, or built from defaults for library callers and tests.

use anyhow::Result;
use std::env;

/// Largest window either engine may subscribe to.
pub const MAX_WINDOW: usize = 1000;

const DEFAULT_STREAM_PATH: &str = "chat/messages";
const DEFAULT_VIEWER_WINDOW: usize = 100;
const DEFAULT_MODERATION_WINDOW: usize = 200;
const DEFAULT_MODERATOR_LABEL: &str = "admin";
const DEFAULT_LOG_FILE: &str = "logs/livechat.log";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// CHAT_STREAM_PATH
    pub stream_path: String,
    /// CHAT_VIEWER_WINDOW: most recent N messages the viewer feed observes
    pub viewer_window: usize,
    /// CHAT_MODERATION_WINDOW: most recent N messages the moderation feed observes
    pub moderation_window: usize,
    /// CHAT_DEFAULT_MODERATOR_LABEL: `deletedBy` when the moderator has no display name
    pub default_moderator_label: String,
    /// LOG_FILE
    pub log_file: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stream_path: DEFAULT_STREAM_PATH.to_string(),
            viewer_window: DEFAULT_VIEWER_WINDOW,
            moderation_window: DEFAULT_MODERATION_WINDOW,
            default_moderator_label: DEFAULT_MODERATOR_LABEL.to_string(),
            log_file: DEFAULT_LOG_FILE.to_string(),
        }
    }
}

impl EngineConfig {
    /// Load from environment variables. Unset or unparsable values fall back to defaults.
    /// Call validate() after load.
    pub fn load() -> Result<Self> {
        let stream_path =
            env::var("CHAT_STREAM_PATH").unwrap_or_else(|_| DEFAULT_STREAM_PATH.to_string());
        let viewer_window = env::var("CHAT_VIEWER_WINDOW")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_VIEWER_WINDOW);
        let moderation_window = env::var("CHAT_MODERATION_WINDOW")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MODERATION_WINDOW);
        let default_moderator_label = env::var("CHAT_DEFAULT_MODERATOR_LABEL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODERATOR_LABEL.to_string());
        let log_file = env::var("LOG_FILE").unwrap_or_else(|_| DEFAULT_LOG_FILE.to_string());

        Ok(Self {
            stream_path,
            viewer_window,
            moderation_window,
            default_moderator_label,
            log_file,
        })
    }

    /// Fail fast on values the engines cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.stream_path.trim().is_empty() {
            anyhow::bail!("CHAT_STREAM_PATH is empty");
        }
        for (name, window) in [
            ("CHAT_VIEWER_WINDOW", self.viewer_window),
            ("CHAT_MODERATION_WINDOW", self.moderation_window),
        ] {
            if window == 0 || window > MAX_WINDOW {
                anyhow::bail!("{} must be between 1 and {}, got {}", name, MAX_WINDOW, window);
            }
        }
        Ok(())
    }

    pub fn with_stream_path(mut self, stream_path: impl Into<String>) -> Self {
        self.stream_path = stream_path.into();
        self
    }

    pub fn with_windows(mut self, viewer_window: usize, moderation_window: usize) -> Self {
        self.viewer_window = viewer_window;
        self.moderation_window = moderation_window;
        self
    }
}
