//! # chat-cli
//!
//! `livechat` binary foundation: argument parsing, config loading and the local interactive
//! session over the in-memory backend.

pub mod cli;
pub mod session;

pub use cli::{load_config, Cli, Commands};
pub use session::{parse_command, Command, Session};
