//! Local interactive session: one participant with both engines attached to the same stream.

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use chat_core::{ChatError, Identity, Message};
use chat_engine::{DeleteOutcome, EngineConfig, ModerationEngine, ModerationFilter, ViewerEngine};
use chat_stream::StreamAdapter;
use chrono::{DateTime, Local, TimeZone};

const HELP: &str = "\
Commands:
  <text>            send a message
  /list             show the chat feed
  /delete <id>      soft-delete a message (moderators)
  /mod [search]     show the moderation feed, optionally filtered
  /deleted on|off   include deleted messages in /mod
  /stats            window counts (moderators)
  /help             this text
  /quit             leave";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    List,
    Delete(String),
    Moderation(Option<String>),
    ShowDeleted(bool),
    Stats,
    Help,
    Quit,
}

/// Parses one input line. Blank lines yield `None`; a malformed command yields its usage.
pub fn parse_command(line: &str) -> std::result::Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Send(line.to_string())));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let command = match (name, arg) {
        ("list", _) => Command::List,
        ("delete", "") => return Err("usage: /delete <id>".to_string()),
        ("delete", id) => Command::Delete(id.to_string()),
        ("mod", "") => Command::Moderation(None),
        ("mod", search) => Command::Moderation(Some(search.to_string())),
        ("deleted", "on") => Command::ShowDeleted(true),
        ("deleted", "off") => Command::ShowDeleted(false),
        ("deleted", _) => return Err("usage: /deleted on|off".to_string()),
        ("stats", _) => Command::Stats,
        ("help", _) => Command::Help,
        ("quit", _) | ("exit", _) => Command::Quit,
        (other, _) => return Err(format!("unknown command /{} (try /help)", other)),
    };
    Ok(Some(command))
}

fn format_time(millis: i64) -> String {
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|t: DateTime<Local>| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string())
}

fn render(message: &Message) -> String {
    let line = format!(
        "[{}] {} {}: {}",
        format_time(message.sent_at),
        message.id,
        message.display_name,
        message.body
    );
    match &message.deletion {
        Some(deletion) => format!(
            "{} (deleted by {} at {})",
            line,
            deletion.deleted_by,
            format_time(deletion.deleted_at)
        ),
        None => line,
    }
}

pub struct Session {
    user: Identity,
    viewer: ViewerEngine,
    moderation: ModerationEngine,
    filter: ModerationFilter,
}

impl Session {
    pub fn new(adapter: Arc<dyn StreamAdapter>, config: &EngineConfig, user: Identity) -> Self {
        Self {
            user,
            moderation: ModerationEngine::new(adapter.clone(), config),
            viewer: ViewerEngine::new(adapter, config),
            filter: ModerationFilter::new(),
        }
    }

    pub async fn start(&self) -> Result<()> {
        self.viewer.connect().await?;
        self.moderation.connect().await?;
        Ok(())
    }

    /// Runs one command. Returns `false` when the session should end.
    ///
    /// Chat errors are printed and the session continues; only output failures are returned.
    pub async fn execute(&mut self, command: Command, out: &mut dyn Write) -> Result<bool> {
        match command {
            Command::Send(body) => match self.viewer.send(&body, &self.user).await {
                Ok(id) => writeln!(out, "sent {}", id)?,
                Err(e) => self.report(out, &e)?,
            },
            Command::List => {
                let messages = self.viewer.messages();
                if messages.is_empty() {
                    writeln!(out, "No messages yet.")?;
                }
                for message in &messages {
                    writeln!(out, "{}", render(message))?;
                }
            }
            Command::Delete(id) => match self.moderation.soft_delete(&id, &self.user).await {
                Ok(DeleteOutcome::Deleted) => writeln!(out, "deleted {}", id)?,
                Ok(DeleteOutcome::AlreadyDeleted) => writeln!(out, "{} was already deleted", id)?,
                Err(e) => self.report(out, &e)?,
            },
            Command::Moderation(_) if !self.user.is_moderator => {
                writeln!(out, "moderation feed requires --moderator")?
            }
            Command::Moderation(search) => {
                self.filter.search = search.unwrap_or_default();
                let messages = self.moderation.view(&self.filter);
                if messages.is_empty() {
                    writeln!(out, "No messages match.")?;
                }
                for message in &messages {
                    writeln!(out, "{}", render(message))?;
                }
            }
            Command::ShowDeleted(show) => {
                self.filter.show_deleted = show;
                writeln!(out, "show deleted: {}", if show { "on" } else { "off" })?;
            }
            Command::Stats if !self.user.is_moderator => writeln!(out, "stats require --moderator")?,
            Command::Stats => {
                let stats = self.moderation.stats();
                writeln!(
                    out,
                    "{} total messages, {} deleted, {} visible",
                    stats.total, stats.deleted, stats.visible
                )?;
            }
            Command::Help => writeln!(out, "{}", HELP)?,
            Command::Quit => return Ok(false),
        }
        Ok(true)
    }

    fn report(&self, out: &mut dyn Write, err: &ChatError) -> Result<()> {
        writeln!(out, "error: {}", err)?;
        self.viewer.clear_error();
        self.moderation.clear_error();
        Ok(())
    }

    /// Disconnects both engines.
    pub fn shutdown(&self) {
        self.viewer.disconnect();
        self.moderation.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_stream::{BackendStreamAdapter, InMemoryBackend};

    fn session(user: Identity) -> (InMemoryBackend, Session) {
        let backend = InMemoryBackend::new();
        let adapter = Arc::new(BackendStreamAdapter::new(Arc::new(backend.clone())));
        let session = Session::new(adapter, &EngineConfig::default(), user);
        (backend, session)
    }

    async fn run(session: &mut Session, line: &str) -> String {
        let mut out = Vec::new();
        let command = parse_command(line).unwrap().unwrap();
        session.execute(command, &mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("   "), Ok(None));
        assert_eq!(
            parse_command(" hello there "),
            Ok(Some(Command::Send("hello there".to_string())))
        );
        assert_eq!(
            parse_command("/delete abc"),
            Ok(Some(Command::Delete("abc".to_string())))
        );
        assert!(parse_command("/delete").is_err());
        assert_eq!(parse_command("/mod"), Ok(Some(Command::Moderation(None))));
        assert_eq!(
            parse_command("/mod  spam "),
            Ok(Some(Command::Moderation(Some("spam".to_string()))))
        );
        assert_eq!(parse_command("/deleted on"), Ok(Some(Command::ShowDeleted(true))));
        assert!(parse_command("/deleted maybe").is_err());
        assert_eq!(parse_command("/quit"), Ok(Some(Command::Quit)));
        assert!(parse_command("/dance").is_err());
    }

    #[tokio::test]
    async fn test_moderator_session_flow() {
        let (backend, mut session) = session(Identity::moderator("m1", "Mod1"));
        session.start().await.unwrap();
        assert_eq!(backend.active_listeners(), 2);

        let sent = run(&mut session, "hello").await;
        let id = sent.trim().strip_prefix("sent ").unwrap().to_string();
        assert!(run(&mut session, "/list").await.contains("Mod1: hello"));

        assert_eq!(run(&mut session, &format!("/delete {}", id)).await.trim(), format!("deleted {}", id));
        assert!(run(&mut session, &format!("/delete {}", id)).await.contains("already deleted"));
        assert_eq!(run(&mut session, "/list").await.trim(), "No messages yet.");

        assert_eq!(run(&mut session, "/mod").await.trim(), "No messages match.");
        run(&mut session, "/deleted on").await;
        assert!(run(&mut session, "/mod hello").await.contains("deleted by Mod1"));
        assert!(run(&mut session, "/stats").await.contains("1 total messages, 1 deleted"));

        let mut out = Vec::new();
        assert!(!session.execute(Command::Quit, &mut out).await.unwrap());
        session.shutdown();
        assert_eq!(backend.active_listeners(), 0);
    }

    #[tokio::test]
    async fn test_participant_cannot_moderate() {
        let (backend, mut session) = session(Identity::new("u1", "Alice"));
        session.start().await.unwrap();
        assert_eq!(backend.active_listeners(), 2);

        run(&mut session, "hi").await;
        assert!(run(&mut session, "/delete whatever").await.starts_with("error: Unauthorized"));
        assert!(run(&mut session, "/stats").await.contains("require --moderator"));
        assert!(run(&mut session, "   /mod").await.contains("requires --moderator"));
    }
}
