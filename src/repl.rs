//! Line-oriented terminal front end

use crate::backend::{ChatBackend, ConversationStore};
use crate::health::{HealthMonitor, HealthStatus};
use crate::runtime::{SessionController, SessionEvent, TurnHandle};
use crate::state_machine::TurnOutcome;
use crate::tools::ToolStatus;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, watch};

const HELP: &str = "\
Commands:
  /new              start a new conversation
  /list             list recent conversations
  /open <n|id>      open a conversation from the list
  /delete <n|id>    delete a conversation
  /cancel           stop the current reply (or press Ctrl-C)
  /models           list backend models
  /tools            list backend tools
  /status           show connection and session state
  /quit             exit
Anything else is sent as a message.";

/// One line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    New,
    List,
    Open(String),
    Delete(String),
    Cancel,
    Models,
    Tools,
    Status,
    Help,
    Quit,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Some(Command::Send(line.to_string()));
        };
        let (name, arg) = rest
            .split_once(char::is_whitespace)
            .map_or((rest, ""), |(n, a)| (n, a.trim()));

        Some(match (name, arg) {
            ("new", _) => Command::New,
            ("list" | "ls", _) => Command::List,
            ("open", a) if !a.is_empty() => Command::Open(a.to_string()),
            ("delete" | "rm", a) if !a.is_empty() => Command::Delete(a.to_string()),
            ("cancel", _) => Command::Cancel,
            ("models", _) => Command::Models,
            ("tools", _) => Command::Tools,
            ("status", _) => Command::Status,
            ("help" | "?", _) => Command::Help,
            ("quit" | "exit" | "q", _) => Command::Quit,
            _ => Command::Unknown(line.to_string()),
        })
    }
}

/// What became of a line sent as a message
#[derive(Debug, Clone, PartialEq, Eq)]
enum SendStatus {
    Started,
    /// Health monitor reports the backend unreachable
    Offline,
    /// Another reply is still streaming
    Busy,
    /// The slot was released (cancel or conversation change) before dispatch
    Dropped,
    Failed(String),
}

impl SendStatus {
    fn notice(&self) -> Option<String> {
        match self {
            SendStatus::Started => None,
            SendStatus::Offline => Some("Backend is not reachable; message not sent.".to_string()),
            SendStatus::Busy => Some("A reply is still streaming; /cancel to stop it.".to_string()),
            SendStatus::Dropped => {
                Some("Message not sent; the conversation changed before it started.".to_string())
            }
            SendStatus::Failed(e) => Some(format!("Could not start conversation: {e}")),
        }
    }
}

pub struct Repl<B, S> {
    session: SessionController<B, S>,
    health: HealthMonitor,
    /// Most recent turn, awaited on exit so it can wind down
    last_turn: Option<TurnHandle>,
}

impl<B, S> Repl<B, S>
where
    B: ChatBackend + 'static,
    S: ConversationStore + 'static,
{
    pub fn new(session: SessionController<B, S>, health: HealthMonitor) -> Self {
        Self {
            session,
            health,
            last_turn: None,
        }
    }

    /// Read commands from stdin until `/quit` or end of input
    pub async fn run(mut self) -> std::io::Result<()> {
        let renderer = tokio::spawn(render(self.session.subscribe()));
        let watcher = tokio::spawn(watch_health(self.health.subscribe()));
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        println!("Type /help for commands.");
        loop {
            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => {
                    if self.session.is_turn_active() {
                        self.session.cancel_active_turn();
                        continue;
                    }
                    None
                }
            };
            let Some(line) = line else { break };
            let Some(command) = Command::parse(&line) else {
                continue;
            };
            if command == Command::Quit {
                break;
            }
            self.execute(command).await;
        }

        self.session.cancel_active_turn();
        if let Some(turn) = self.last_turn.take() {
            turn.outcome().await;
        }
        self.health.stop();
        renderer.abort();
        watcher.abort();
        Ok(())
    }

    async fn execute(&mut self, command: Command) {
        match command {
            Command::Send(text) => {
                if let Some(notice) = self.send(&text).await.notice() {
                    println!("{notice}");
                }
            }
            Command::New => {
                self.session.clear_conversation();
                println!("Started a new conversation.");
            }
            Command::List => {
                if let Err(e) = self.session.refresh_conversations().await {
                    println!("Could not load conversations: {e}");
                    return;
                }
                self.print_conversations();
            }
            Command::Open(target) => {
                let id = self.resolve(&target);
                match self.session.select_conversation(&id).await {
                    Ok(()) => self.print_transcript(),
                    Err(e) => println!("Could not open {id}: {e}"),
                }
            }
            Command::Delete(target) => {
                let id = self.resolve(&target);
                match self.session.delete_conversation(&id).await {
                    Ok(()) => println!("Deleted {id}."),
                    Err(e) => println!("Could not delete {id}: {e}"),
                }
            }
            Command::Cancel => {
                if !self.session.cancel_active_turn() {
                    println!("Nothing to cancel.");
                }
            }
            Command::Models => match self.session.backend().list_models().await {
                Ok(models) => {
                    for m in models {
                        let note = if m.available { "" } else { " (unavailable)" };
                        println!("  {}{note}", m.name);
                    }
                }
                Err(e) => println!("Could not list models: {e}"),
            },
            Command::Tools => match self.session.backend().list_tools().await {
                Ok(tools) if tools.is_empty() => println!("No tools registered."),
                Ok(tools) => {
                    for t in tools {
                        println!("  {:<20} {}", t.name, t.description);
                    }
                }
                Err(e) => println!("Could not list tools: {e}"),
            },
            Command::Status => self.print_status(),
            Command::Help => println!("{HELP}"),
            Command::Unknown(line) => println!("Unknown command: {line} (try /help)"),
            Command::Quit => {}
        }
    }

    async fn send(&mut self, text: &str) -> SendStatus {
        if !self.health.is_connected() {
            return SendStatus::Offline;
        }
        match self.session.send_utterance(text).await {
            // The renderer prints the reply as it streams
            Ok(Some(handle)) => {
                self.last_turn = Some(handle);
                SendStatus::Started
            }
            Ok(None) if self.session.is_turn_active() => SendStatus::Busy,
            Ok(None) => SendStatus::Dropped,
            Err(e) => SendStatus::Failed(e.to_string()),
        }
    }

    /// A small number refers to the last listing; anything else is an id
    fn resolve(&self, target: &str) -> String {
        let snapshot = self.session.snapshot();
        target
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| snapshot.conversations.get(i))
            .map_or_else(|| target.to_string(), |c| c.id.clone())
    }

    fn print_conversations(&self) {
        let snapshot = self.session.snapshot();
        if snapshot.conversations.is_empty() {
            println!("No conversations yet.");
            return;
        }
        for (i, c) in snapshot.conversations.iter().enumerate() {
            let marker = if snapshot.active_conversation.as_deref() == Some(c.id.as_str()) {
                '*'
            } else {
                ' '
            };
            println!(
                "{marker}{:>3}. {}  ({})",
                i + 1,
                c.display_title(),
                c.updated_at.format("%Y-%m-%d %H:%M")
            );
        }
    }

    fn print_transcript(&self) {
        for m in self.session.snapshot().messages {
            println!("{}> {}", m.role, m.content);
        }
    }

    fn print_status(&self) {
        let health = self.health.status();
        let snapshot = self.session.snapshot();
        println!(
            "backend: {}{}",
            if health.connected { "connected" } else { "unreachable" },
            health.model.map(|m| format!(" ({m})")).unwrap_or_default()
        );
        println!(
            "conversation: {}",
            snapshot.active_conversation.as_deref().unwrap_or("(none)")
        );
        println!("turn: {}", snapshot.turn_state.name());
        let running = snapshot
            .tool_calls
            .iter()
            .filter(|c| c.status == ToolStatus::Running)
            .count();
        println!(
            "tool calls: {} ({running} running)",
            snapshot.tool_calls.len()
        );
        if let Some(outcome) = snapshot.last_outcome {
            println!("last turn: {outcome:?}");
        }
    }
}

/// Announce connectivity changes
async fn watch_health(mut status: watch::Receiver<HealthStatus>) {
    let mut connected = status.borrow_and_update().connected;
    while status.changed().await.is_ok() {
        let now = status.borrow_and_update().connected;
        if now != connected {
            connected = now;
            if connected {
                println!("[backend connected]");
            } else {
                println!("[backend unreachable]");
            }
        }
    }
}

/// Print session events as they arrive
async fn render(mut events: broadcast::Receiver<SessionEvent>) {
    let mut thinking = false;
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "Renderer fell behind");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let mut out = std::io::stdout().lock();
        let _ = match event {
            SessionEvent::ReasoningDelta { text } => {
                if !thinking {
                    thinking = true;
                    let _ = write!(out, "(thinking) ");
                }
                write!(out, "{text}")
            }
            SessionEvent::ContentDelta { text } => {
                if thinking {
                    thinking = false;
                    let _ = writeln!(out);
                }
                write!(out, "{text}")
            }
            SessionEvent::Annotation { text } => write!(out, "\n[{text}]"),
            SessionEvent::ToolCallStarted {
                name, arguments, ..
            } => writeln!(
                out,
                "\n[tool] {name} {}",
                serde_json::Value::Object(arguments)
            ),
            SessionEvent::ToolCallFinished { name, result, .. } => {
                writeln!(out, "[tool] {name} -> {result}")
            }
            SessionEvent::TurnFinished { outcome } => {
                thinking = false;
                match outcome {
                    TurnOutcome::Cancelled => writeln!(out, "\n[cancelled]"),
                    _ => writeln!(out),
                }
            }
            SessionEvent::ConversationChanged { id: Some(id) } => {
                writeln!(out, "[conversation {id}]")
            }
            SessionEvent::ConversationChanged { id: None }
            | SessionEvent::ConversationsRefreshed { .. } => Ok(()),
        };
        let _ = out.flush();
    }
}
