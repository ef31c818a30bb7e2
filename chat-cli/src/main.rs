//! livechat CLI: run a local chat session, print config. Config from env (and .env).

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use chat_cli::{load_config, parse_command, Cli, Commands, Session};
use chat_core::{init_tracing, Identity};
use chat_engine::EngineConfig;
use chat_stream::{BackendStreamAdapter, InMemoryBackend};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = load_config()?;

    match cli.command {
        Commands::Session {
            user,
            id,
            moderator,
        } => {
            init_tracing(&config.log_file)?;
            let id = id.unwrap_or_else(|| user.clone());
            let identity = if moderator {
                Identity::moderator(id, user)
            } else {
                Identity::new(id, user)
            };
            run_session(config, identity).await
        }
        Commands::Config => {
            print_config(&config);
            Ok(())
        }
    }
}

fn print_config(config: &EngineConfig) {
    println!("stream_path:             {}", config.stream_path);
    println!("viewer_window:           {}", config.viewer_window);
    println!("moderation_window:       {}", config.moderation_window);
    println!("default_moderator_label: {}", config.default_moderator_label);
    println!("log_file:                {}", config.log_file);
}

/// Reads commands from stdin until `/quit` or EOF, then disconnects both engines.
async fn run_session(config: EngineConfig, identity: Identity) -> Result<()> {
    let backend = InMemoryBackend::new();
    let adapter = Arc::new(BackendStreamAdapter::new(Arc::new(backend)));
    let mut session = Session::new(adapter, &config, identity);
    session.start().await?;
    info!(path = %config.stream_path, "step: session started");

    let mut stdout = std::io::stdout();
    writeln!(stdout, "Type a message, or /help for commands.")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(usage) => {
                writeln!(stdout, "{}", usage)?;
                continue;
            }
        };
        if !session.execute(command, &mut stdout).await? {
            break;
        }
        stdout.flush()?;
    }

    session.shutdown();
    info!("step: session finished");
    Ok(())
}
