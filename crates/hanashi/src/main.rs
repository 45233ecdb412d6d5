// SPDX-FileCopyrightText: 2026 Hanashi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hanashi - real-time chat over SQLite and SSE.
//!
//! This is the binary entry point for both the server and the terminal
//! client.

use clap::{Parser, Subcommand};

mod chat;
mod config;
mod serve;

/// Hanashi - real-time chat over SQLite and SSE.
#[derive(Parser, Debug)]
#[command(name = "hanashi", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the chat server.
    Serve,
    /// Join a room from the terminal.
    Chat {
        /// Room to join.
        #[arg(long)]
        room: String,
        /// Bearer token; overrides `client.token` from the config file.
        #[arg(long)]
        user_token: Option<String>,
    },
    /// Print the effective configuration.
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load and validate configuration at startup.
    let config = match hanashi_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            hanashi_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let outcome = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Chat { room, user_token }) => {
            chat::run_chat(config, &room, user_token).await
        }
        Some(Commands::Config) => config::run_config(&config),
        None => {
            println!("hanashi: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = outcome {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn chat_requires_a_room() {
        assert!(Cli::try_parse_from(["hanashi", "chat"]).is_err());

        let cli = Cli::try_parse_from(["hanashi", "chat", "--room", "r-1"]).unwrap();
        match cli.command {
            Some(Commands::Chat { room, user_token }) => {
                assert_eq!(room, "r-1");
                assert!(user_token.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn chat_accepts_a_token_override() {
        let cli =
            Cli::try_parse_from(["hanashi", "chat", "--room", "r-1", "--user-token", "tok"])
                .unwrap();
        match cli.command {
            Some(Commands::Chat { user_token, .. }) => {
                assert_eq!(user_token.as_deref(), Some("tok"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn binary_loads_config_defaults() {
        // Verify config loads with defaults (no config file needed).
        let config =
            hanashi_config::load_and_validate().expect("default config should be valid");
        assert_eq!(config.server.port, 8750);
    }
}
