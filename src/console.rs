//! Operator console on stdin
//!
//! A line-based stand-in for the selection UI: toggle recording with an
//! empty line, pick a presenter manually, mute the dial, or print the
//! current state.

use std::io::BufRead;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::input::DialControls;
use crate::schedule::timezone;
use crate::session::{IdentityPatterns, ManualSelection};
use crate::sync::{EngineCommand, EngineHandle, EngineSnapshot, EngineStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Toggle,
    Start,
    Stop,
    Select(ManualSelection),
    Clear,
    Status,
    /// Unmute (true) or mute (false) the dial
    Dial(bool),
    Quit,
}

/// Parse one console line
pub fn parse_line(line: &str) -> Result<ConsoleCommand, String> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(ConsoleCommand::Toggle);
    };

    match command {
        "start" => Ok(ConsoleCommand::Start),
        "stop" => Ok(ConsoleCommand::Stop),
        "clear" => Ok(ConsoleCommand::Clear),
        "status" => Ok(ConsoleCommand::Status),
        "quit" | "exit" => Ok(ConsoleCommand::Quit),
        "dial" => match words.next() {
            Some("on") => Ok(ConsoleCommand::Dial(true)),
            Some("off") => Ok(ConsoleCommand::Dial(false)),
            _ => Err("usage: dial on|off".to_string()),
        },
        "select" => {
            let user_id = words.next().ok_or("usage: select <id> <series> <name...>")?;
            let series_id = words.next().ok_or("usage: select <id> <series> <name...>")?;
            let name = words.collect::<Vec<_>>().join(" ");
            Ok(ConsoleCommand::Select(ManualSelection {
                user_id: user_id.to_string(),
                name,
                series_id: series_id.to_string(),
                ..ManualSelection::default()
            }))
        }
        other => Err(format!("unknown command {:?}", other)),
    }
}

/// One-line summary of an engine snapshot
pub fn describe(snapshot: &EngineSnapshot) -> String {
    let mut line = format!("{} ({})", snapshot.status, snapshot.status.code());
    if let Some(session) = &snapshot.session {
        if snapshot.recording {
            line.push_str(&format!(" - {}, take {}", session.live_caption(), session.take));
        } else {
            line.push_str(&format!(" - {} [{}]", session.organizer, session.series));
        }
        if snapshot.manual {
            line.push_str(" (manual)");
        }
    }
    if let Some(end) = snapshot.window_end {
        line.push_str(&format!(", window ends {}", timezone::to_civil(end).format("%H:%M")));
    }
    line
}

/// Read commands from stdin until it closes or the operator quits
pub async fn run_console(
    handle: EngineHandle,
    patterns: IdentityPatterns,
    dial: Option<DialControls>,
    mut status_rx: broadcast::Receiver<EngineStatus>,
) {
    let mut lines = spawn_stdin_reader();
    let mut latest: Option<EngineSnapshot> = None;

    loop {
        tokio::select! {
            status = status_rx.recv() => {
                match status {
                    Ok(EngineStatus::Updated(snapshot)) => latest = Some(snapshot),
                    Ok(EngineStatus::DialLost(reason)) => warn!("Dial unavailable: {}", reason),
                    Ok(EngineStatus::Error(message)) => warn!("{}", message),
                    Err(broadcast::error::RecvError::Lagged(n)) => debug!("Console skipped {} updates", n),
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            line = lines.recv() => {
                let Some(line) = line else {
                    debug!("Console input closed");
                    break;
                };

                let command = match parse_line(&line) {
                    Ok(command) => command,
                    Err(e) => {
                        println!("{}", e);
                        continue;
                    }
                };

                let cmd = match command {
                    ConsoleCommand::Toggle => EngineCommand::ToggleRecording,
                    ConsoleCommand::Start => EngineCommand::StartRecording,
                    ConsoleCommand::Stop => EngineCommand::StopRecording,
                    ConsoleCommand::Clear => EngineCommand::ClearManualSession,
                    ConsoleCommand::Quit => EngineCommand::Shutdown,
                    ConsoleCommand::Status => {
                        match &latest {
                            Some(snapshot) => println!("{}", describe(snapshot)),
                            None => println!("no status yet"),
                        }
                        continue;
                    }
                    ConsoleCommand::Dial(enabled) => {
                        match &dial {
                            Some(controls) => {
                                controls.ignore_all_events(!enabled);
                                info!("Dial input {}", if enabled { "enabled" } else { "muted" });
                            }
                            None => println!("no dial attached"),
                        }
                        continue;
                    }
                    ConsoleCommand::Select(selection) => {
                        match handle.select_manual(&selection, &patterns).await {
                            Ok(kind) => info!("Selected {:?} {}", kind, selection.name),
                            Err(e) => println!("{}", e),
                        }
                        continue;
                    }
                };

                if handle.send(cmd).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Blocking stdin reads on their own thread, so a pending read never holds up runtime shutdown
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Console read failed: {}", e);
                    break;
                }
            }
        }
    });
    rx
}
