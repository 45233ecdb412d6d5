// SPDX-FileCopyrightText: 2026 Hanashi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `hanashi chat` command implementation.
//!
//! Joins a room and runs an interactive terminal client: a rustyline
//! REPL for sending messages, with inbound stream events printed as
//! they arrive. The stream reconnects on its own; the feed reconciles
//! the window after every gap.

use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use hanashi_client::{ChatApi, FeedEffect, MessageFeed, StreamConnection};
use hanashi_config::model::HanashiConfig;
use hanashi_core::types::{Message, MessageKind};
use hanashi_core::{HanashiError, StreamEvent};

/// Runs the `hanashi chat` interactive client.
///
/// Joins the room (idempotent for existing members), loads the most
/// recent page of history, then reads lines until `/quit`, Ctrl+C, or
/// Ctrl+D.
pub async fn run_chat(
    config: HanashiConfig,
    room_id: &str,
    token_override: Option<String>,
) -> Result<(), HanashiError> {
    let token = resolve_token(token_override, config.client.token.as_deref())?;

    let api = ChatApi::new(token)?.with_base_url(config.client.server_url.clone());
    let room = api.join_room(room_id).await?;

    let feed = Arc::new(Mutex::new(MessageFeed::new(
        api.clone(),
        room_id,
        config.chat.page_size,
        config.chat.max_window,
    )));

    // Keep the event stream alive for the whole session. Events flow
    // through the channel into the feed; the tasks are aborted on exit.
    let (events_tx, mut events_rx) = mpsc::channel::<StreamEvent>(config.chat.broadcast_buffer);
    let connection = StreamConnection::new(
        api,
        room_id,
        Duration::from_millis(config.client.backoff_base_ms),
        Duration::from_millis(config.client.backoff_cap_ms),
    );
    let connection_task = tokio::spawn(connection.run(events_tx));

    let event_feed = feed.clone();
    let event_task = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            let mut feed = event_feed.lock().await;
            print_event(&event, feed.connection_id().is_some());
            if let Some(FeedEffect::Reconcile) = feed.apply_event(event) {
                if let Err(e) = feed.reconcile().await {
                    eprintln!("{}: {e}", "reconcile failed".red());
                }
            }
        }
    });

    // Show the most recent page before the first prompt.
    {
        let mut feed = feed.lock().await;
        feed.initial_load().await?;
        for message in feed.messages() {
            println!("{}", render_message(message));
        }
    }

    let mut rl = DefaultEditor::new()
        .map_err(|e| HanashiError::Internal(format!("failed to initialize readline: {e}")))?;

    println!("{} {}", "hanashi".bold().green(), room.name.bold());
    println!(
        "Type {} for older messages, {} to exit.\n",
        "/history".yellow(),
        "/quit".yellow()
    );

    let prompt = format!("{}> ", room_id.green());
    loop {
        match rl.readline(&prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed == "/quit" || trimmed == "/exit" {
                    break;
                }
                if trimmed.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(&line);

                if trimmed == "/history" {
                    show_history(&feed).await;
                    continue;
                }
                if trimmed.starts_with('/') {
                    eprintln!("{}: unknown command {trimmed}", "error".red());
                    continue;
                }

                let mut feed = feed.lock().await;
                match feed.send(trimmed, MessageKind::Text, Vec::new()).await {
                    Ok(message) => println!("{}", render_message(&message)),
                    Err(e) => eprintln!("{}: {e}", "error".red()),
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C
                break;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D
                break;
            }
            Err(e) => {
                eprintln!("{}: {e}", "error".red());
                break;
            }
        }
    }

    connection_task.abort();
    event_task.abort();
    debug!(room_id, "chat session closed");

    println!("{}", "goodbye".dimmed());
    Ok(())
}

/// The CLI flag wins over the config file; neither present is an error.
fn resolve_token(
    override_token: Option<String>,
    config_token: Option<&str>,
) -> Result<String, HanashiError> {
    override_token
        .or_else(|| config_token.map(str::to_string))
        .ok_or_else(|| {
            HanashiError::Config(
                "client token required; set client.token in hanashi.toml or pass --user-token"
                    .to_string(),
            )
        })
}

/// Pages one more batch of older messages and prints it.
async fn show_history(feed: &Mutex<MessageFeed>) {
    let mut feed = feed.lock().await;
    if !feed.can_load_more() {
        println!("{}", "-- beginning of history --".dimmed());
        return;
    }

    // Everything that ends up above the old window head is new context.
    let head_id = feed.messages().first().map(|m| m.id.clone());
    match feed.load_more(None).await {
        Ok(_) => {
            let window = feed.messages();
            let end = head_id
                .and_then(|id| window.iter().position(|m| m.id == id))
                .unwrap_or(window.len());
            if end == 0 {
                println!("{}", "-- beginning of history --".dimmed());
                return;
            }
            println!("{}", "-- older --".dimmed());
            for message in &window[..end] {
                println!("{}", render_message(message));
            }
        }
        Err(e) => eprintln!("{}: {e}", "error".red()),
    }
}

/// Prints one inbound stream event.
///
/// The sender's own messages never arrive here; the gateway excludes
/// this connection from their broadcast and the REPL prints the
/// confirmed copy instead.
fn print_event(event: &StreamEvent, reconnect: bool) {
    match event {
        StreamEvent::Connected { .. } => {
            if reconnect {
                println!("{}", "-- reconnected --".dimmed());
            }
        }
        StreamEvent::NewMessage { message } => {
            println!("{}", render_message(message));
        }
        StreamEvent::MessageEdited { message } => {
            println!("{} {}", render_message(message), "(edited)".dimmed());
        }
        StreamEvent::MessageDeleted { message_id, .. } => {
            println!("{}", format!("-- message {message_id} deleted --").dimmed());
        }
        StreamEvent::Typing { user_id, .. } => {
            println!("{}", format!("{user_id} is typing...").dimmed());
        }
    }
}

/// One chat line: time, sender, content. System notices render as a
/// dimmed banner without a sender.
fn render_message(message: &Message) -> String {
    if message.kind == MessageKind::System {
        return format!("{}", format!("-- {} --", message.content).dimmed());
    }
    format!(
        "{} {} {}",
        clock(&message.created_at).dimmed(),
        format!("<{}>", message.sender_id).cyan(),
        message.content
    )
}

/// The HH:MM:SS slice of an RFC3339 timestamp.
fn clock(timestamp: &str) -> &str {
    timestamp.get(11..19).unwrap_or(timestamp)
}
