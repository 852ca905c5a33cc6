//! Line-oriented terminal interface
//!
//! Reads stdin one line at a time. Plain text is sent as a message; lines
//! starting with `/` are commands. Engine events are printed as they arrive.

use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use wcwi_runtime::{ChatMessage, DeleteOutcome, EngineEvent, MessageId, SyncEngine};

use crate::error::Result;

// ----------------------------------------------------------------------------
// Input Parsing
// ----------------------------------------------------------------------------

/// One line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCommand {
    Empty,
    Text(String),
    Image(PathBuf),
    Delete(MessageId),
    List,
    Status,
    Help,
    Quit,
    /// A command that is unknown or missing its argument
    Invalid(String),
}

pub fn parse_input(line: &str) -> InputCommand {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return InputCommand::Empty;
    }
    if !trimmed.starts_with('/') {
        return InputCommand::Text(trimmed.to_string());
    }

    let (command, argument) = match trimmed.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (trimmed, ""),
    };
    match (command, argument) {
        ("/quit" | "/exit", _) => InputCommand::Quit,
        ("/list", _) => InputCommand::List,
        ("/status", _) => InputCommand::Status,
        ("/help", _) => InputCommand::Help,
        ("/image", path) if !path.is_empty() => InputCommand::Image(PathBuf::from(path)),
        ("/delete", id) if !id.is_empty() => InputCommand::Delete(MessageId::new(id)),
        ("/image", _) => InputCommand::Invalid("usage: /image <path>".to_string()),
        ("/delete", _) => InputCommand::Invalid("usage: /delete <id>".to_string()),
        (other, _) => InputCommand::Invalid(format!("unknown command {}; try /help", other)),
    }
}

// ----------------------------------------------------------------------------
// Rendering
// ----------------------------------------------------------------------------

pub fn format_message(message: &ChatMessage) -> String {
    let body = match (&message.content, &message.attachment) {
        (Some(content), _) => content.clone(),
        (None, Some(attachment)) => format!("<image {}>", attachment.file_name),
        (None, None) => String::new(),
    };
    format!("[{}] {}: {}", message.id, message.sender, body)
}

fn print_help() {
    println!("Commands:");
    println!("  <text>          send a message");
    println!("  /image <path>   send an image file");
    println!("  /delete <id>    delete a message");
    println!("  /list           show the conversation");
    println!("  /status         show the connection status");
    println!("  /quit           leave");
}

async fn print_events(mut events: broadcast::Receiver<EngineEvent>) {
    loop {
        match events.recv().await {
            Ok(EngineEvent::MessageApplied(message)) => println!("{}", format_message(&message)),
            Ok(EngineEvent::MessageRemoved { id }) => debug!(message_id = %id, "Removed"),
            Ok(EngineEvent::PeerGreeted { name }) => println!("* {} joined", name),
            Ok(EngineEvent::Status(status)) => println!("* {}", status),
            Ok(EngineEvent::StorageFailed { reason }) => {
                warn!(reason = %reason, "Changes were not saved")
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Terminal fell behind; some events were not shown")
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

// ----------------------------------------------------------------------------
// Interactive Loop
// ----------------------------------------------------------------------------

/// Run until `/quit`, end of input or Ctrl-C
pub async fn run_interactive(engine: &SyncEngine) -> Result<()> {
    let printer = tokio::spawn(print_events(engine.subscribe()));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Type a message, or /help for commands");

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        match parse_input(&line) {
            InputCommand::Empty => {}
            InputCommand::Quit => break,
            InputCommand::Help => print_help(),
            InputCommand::Text(text) => {
                engine.send_text(&text).await;
            }
            InputCommand::Image(path) => match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    engine.send_image(&bytes).await;
                }
                Err(e) => println!("Cannot read {}: {}", path.display(), e),
            },
            InputCommand::Delete(id) => match engine.request_delete(&id).await {
                DeleteOutcome::Bilateral => println!("* Deleted {} for everyone", id),
                DeleteOutcome::LocalOnly => println!("* Deleted {} on this device", id),
                DeleteOutcome::NotFound => println!("* No message {}", id),
            },
            InputCommand::List => {
                for message in engine.messages() {
                    println!("{}", format_message(&message));
                }
            }
            InputCommand::Status => println!("* {}", engine.status()),
            InputCommand::Invalid(reason) => println!("* {}", reason),
        }
    }

    printer.abort();
    Ok(())
}
