//! # chat-core
//!
//! Core types for the live chat feed: [`Message`], [`MessageDraft`], [`Identity`], the
//! ordering/visibility policy, the [`ChatError`] taxonomy and tracing initialization.
//! Transport-agnostic; used by chat-stream and chat-engine.

pub mod error;
pub mod logger;
pub mod ordering;
pub mod types;

pub use error::{ChatError, Result};
pub use logger::init_tracing;
pub use ordering::{compare_messages, sort_messages, VisibilityPolicy};
pub use types::{Deletion, Identity, Message, MessageDraft};
