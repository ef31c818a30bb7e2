//! CLI parser and config loading.

use anyhow::Result;
use chat_engine::EngineConfig;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "livechat")]
#[command(about = "Live chat engine CLI: local session, config", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Interactive session over an in-memory stream (viewer feed, plus moderation with --moderator).
    Session {
        /// Display name to post as.
        #[arg(short, long, default_value = "guest")]
        user: String,
        /// User id; defaults to the display name.
        #[arg(long)]
        id: Option<String>,
        /// Join with the moderator flag (enables /delete and /mod).
        #[arg(short, long)]
        moderator: bool,
    },
    /// Print the resolved engine configuration.
    Config,
}

/// Load EngineConfig from environment and validate it.
pub fn load_config() -> Result<EngineConfig> {
    let config = EngineConfig::load()?;
    config.validate()?;
    Ok(config)
}
