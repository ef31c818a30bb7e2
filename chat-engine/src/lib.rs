//! # chat-engine
//!
//! The live chat synchronization engines, built on a [`chat_stream::StreamAdapter`]:
//!
//! - [`ViewerEngine`] – participant feed (soft-deleted messages hidden), send
//! - [`ModerationEngine`] – audit feed (everything in the window), soft delete, search, counts
//! - [`LiveFeed`] – the subscription lifecycle both engines share
//!
//! Engines are constructed explicitly with an injected adapter; any number may share a backend.

pub mod config;
mod lifecycle;
mod moderation;
mod view;
mod viewer;

pub use config::EngineConfig;
pub use lifecycle::{ConnectionState, LiveFeed};
pub use moderation::{DeleteOutcome, ModerationEngine};
pub use view::{ModerationFilter, ModerationStats};
pub use viewer::ViewerEngine;
