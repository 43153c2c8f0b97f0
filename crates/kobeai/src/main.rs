// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! KobeAI - command-line chat client.
//!
//! This is the binary entry point. Every subcommand builds one
//! `ClientContext` from the layered configuration and drives it.

mod commands;
mod shell;

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use clap::{Parser, Subcommand};
use kobeai_auth::{RedactingWriter, SecretValues};
use kobeai_config::ClientConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// KobeAI - chat with the KobeAI assistant from the terminal.
#[derive(Parser, Debug)]
#[command(name = "kobeai", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Sign in and store the session credential.
    Login {
        /// Account name; prompted for when omitted.
        #[arg(short, long)]
        username: Option<String>,
    },
    /// Sign out and erase local session state.
    Logout,
    /// Show session, connectivity, and offline queue state.
    Status,
    /// List conversations.
    Conversations,
    /// Send one message to the selected conversation and print the reply.
    Send {
        /// Message text.
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
        /// Conversation to send to instead of the selected one.
        #[arg(short, long)]
        conversation: Option<i64>,
    },
    /// Deliver messages queued while offline.
    Flush,
    /// Launch an interactive chat session.
    Shell,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => kobeai_config::load_and_validate_path(path),
        None => kobeai_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            kobeai_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let secrets: SecretValues = Arc::new(RwLock::new(Vec::new()));
    init_tracing(&config.client.log_level, secrets.clone());
    debug!(base_url = %config.server.base_url, "config loaded");

    let cancel = install_ctrl_c_handler();
    let code = match run(cli.command, config, secrets, cancel).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("{}", commands::describe_error(&e));
            1
        }
    };
    std::process::exit(code);
}

async fn run(
    command: Option<Commands>,
    config: ClientConfig,
    secrets: SecretValues,
    cancel: CancellationToken,
) -> Result<(), kobeai_core::KobeError> {
    let ctx = kobeai_chat::ClientContext::open(config, Some(secrets)).await?;
    let result = match command {
        Some(Commands::Login { username }) => commands::login(&ctx, username).await,
        Some(Commands::Logout) => commands::logout(&ctx).await,
        Some(Commands::Status) => commands::status(&ctx).await,
        Some(Commands::Conversations) => commands::conversations(&ctx).await,
        Some(Commands::Send { text, conversation }) => {
            commands::send(&ctx, &text.join(" "), conversation, &cancel).await
        }
        Some(Commands::Flush) => commands::flush(&ctx).await,
        Some(Commands::Shell) => shell::run_shell(&ctx, &cancel).await,
        None => {
            println!("kobeai: use --help for available commands");
            Ok(())
        }
    };
    ctx.stop();
    result
}

/// Cancelled on Ctrl+C so in-flight streams and background tasks stop.
fn install_ctrl_c_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, shutting down");
            trigger.cancel();
        }
    });
    token
}

fn init_tracing(log_level: &str, secrets: SecretValues) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("kobeai={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(move || RedactingWriter::new(std::io::stderr(), secrets.clone()))
        .init();
}
