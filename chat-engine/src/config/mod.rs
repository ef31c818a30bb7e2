//! Engine configuration: stream location, window sizes, moderation label, log file.

mod engine_config;


pub use engine_config::{EngineConfig, MAX_WINDOW};
