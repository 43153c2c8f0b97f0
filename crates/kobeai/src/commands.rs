// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot subcommands.

use std::io::Write;

use colored::Colorize;
use kobeai_chat::{ClientContext, SendOutcome};
use kobeai_core::types::{Conversation, ConversationId};
use kobeai_core::{ClientStore, KobeError};
use tokio_util::sync::CancellationToken;

/// Prints a streamed reply as it grows.
///
/// Updates are cumulative. When the server replaces the text instead of
/// extending it, the whole reply is printed again on a fresh line.
#[derive(Debug, Default)]
pub(crate) struct ReplyPrinter {
    printed: String,
}

impl ReplyPrinter {
    pub(crate) fn update(&mut self, content: &str) {
        let mut out = std::io::stdout().lock();
        match content.strip_prefix(self.printed.as_str()) {
            Some(suffix) => {
                let _ = write!(out, "{suffix}");
            }
            None => {
                let _ = write!(out, "\n{content}");
            }
        }
        let _ = out.flush();
        self.printed = content.to_string();
    }

    /// Print whatever the final message adds and end the line.
    pub(crate) fn finish(&mut self, content: &str) {
        if content != self.printed {
            self.update(content);
        }
        println!();
    }
}

pub(crate) fn describe_error(e: &KobeError) -> String {
    format!("{}: {}", "error".red(), e.user_message())
}

pub(crate) fn conversation_label(c: &Conversation) -> String {
    c.title.clone().unwrap_or_else(|| kobeai_chat::reconciler::DEFAULT_TITLE.to_string())
}

pub async fn login(ctx: &ClientContext, username: Option<String>) -> Result<(), KobeError> {
    let username = match username {
        Some(name) => name,
        None => prompt("username: ")?,
    };
    let password = rpassword::prompt_password("password: ")
        .map_err(|e| KobeError::Internal(format!("failed to read password: {e}")))?;

    let profile = ctx.auth().login(username.trim(), &password).await?;
    println!("signed in as {}", profile.username.bold());
    if let Err(e) = ctx.reconciler().load_conversations().await {
        tracing::warn!(error = %e, "could not load conversations after login");
    }
    Ok(())
}

pub async fn logout(ctx: &ClientContext) -> Result<(), KobeError> {
    let result = ctx.auth().logout().await;
    ctx.reconciler().clear().await;
    println!("signed out");
    result
}

pub async fn status(ctx: &ClientContext) -> Result<(), KobeError> {
    println!("{}", "kobeai status".bold());
    println!("  server:       {}", ctx.config().server.base_url);

    match (ctx.guard().credential(), ctx.guard().profile().await) {
        (Some(credential), profile) => {
            let who = profile.map(|p| p.username).unwrap_or_else(|| "unknown".into());
            let expiry = credential
                .expires_at()
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M");
            let note = if ctx.guard().is_refresh_due() {
                " (refresh due)".yellow().to_string()
            } else {
                String::new()
            };
            println!("  session:      {} until {expiry}{note}", who.green());
        }
        (None, _) => println!("  session:      {}", "signed out".dimmed()),
    }

    let online = ctx.monitor().check_connection().await;
    let link = if online { "online".green() } else { "offline".red() };
    match ctx.monitor().latency() {
        Some(latency) => println!("  connectivity: {link} ({} ms)", latency.as_millis()),
        None => println!("  connectivity: {link}"),
    }

    let pending = ctx.store().pending_messages().await;
    println!("  queued:       {}", pending.len());

    match ctx.reconciler().current_conversation() {
        Some(c) => println!("  conversation: #{} {}", c.id, conversation_label(&c)),
        None => println!("  conversation: {}", "none".dimmed()),
    }
    Ok(())
}

pub async fn conversations(ctx: &ClientContext) -> Result<(), KobeError> {
    let list = ctx.reconciler().load_conversations().await?;
    print_conversations(&list, ctx.reconciler().current_id());
    Ok(())
}

pub(crate) fn print_conversations(list: &[Conversation], current: Option<ConversationId>) {
    if list.is_empty() {
        println!("{}", "no conversations".dimmed());
        return;
    }
    for c in list {
        let marker = if Some(c.id) == current { "*" } else { " " };
        let when = c.updated_at.unwrap_or(c.created_at).format("%Y-%m-%d %H:%M");
        println!("{marker} #{:<6} {}  {}", c.id, conversation_label(c), when.to_string().dimmed());
    }
}

pub async fn send(
    ctx: &ClientContext,
    text: &str,
    conversation: Option<i64>,
    cancel: &CancellationToken,
) -> Result<(), KobeError> {
    if let Some(id) = conversation {
        ctx.reconciler().switch_conversation(ConversationId(id)).await?;
    }
    send_and_print(ctx, text, cancel).await
}

/// Send one message, streaming the reply to stdout. Returns early without an
/// error when `cancel` fires.
pub(crate) async fn send_and_print(
    ctx: &ClientContext,
    text: &str,
    cancel: &CancellationToken,
) -> Result<(), KobeError> {
    let mut printer = ReplyPrinter::default();
    let outcome = {
        let mut on_update = |content: &str| printer.update(content);
        tokio::select! {
            outcome = ctx.reconciler().send_message(text, &mut on_update) => Some(outcome),
            _ = cancel.cancelled() => None,
        }
    };

    match outcome {
        Some(Ok(SendOutcome::Delivered(message))) => {
            printer.finish(&message.content);
            Ok(())
        }
        Some(Ok(SendOutcome::Queued(queued))) => {
            println!(
                "{} message queued for conversation #{} (position {})",
                "offline:".yellow(),
                queued.conversation_id,
                queued.id
            );
            Ok(())
        }
        Some(Err(e)) => {
            if !printer.printed.is_empty() {
                println!();
            }
            Err(e)
        }
        None => {
            println!("\n{}", "cancelled".dimmed());
            Ok(())
        }
    }
}

pub async fn flush(ctx: &ClientContext) -> Result<(), KobeError> {
    if !ctx.monitor().check_connection().await {
        return Err(KobeError::Offline);
    }
    let report = ctx.reconciler().drain_pending().await?;
    println!("sent {}, still queued {}", report.sent, report.remaining);
    Ok(())
}

fn prompt(label: &str) -> Result<String, KobeError> {
    let mut out = std::io::stdout().lock();
    write!(out, "{label}")
        .and_then(|_| out.flush())
        .map_err(|e| KobeError::Internal(format!("failed to write prompt: {e}")))?;
    drop(out);

    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .map_err(|e| KobeError::Internal(format!("failed to read input: {e}")))?;
    Ok(line.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn printer_tracks_cumulative_content() {
        let mut printer = ReplyPrinter::default();
        printer.update("你好");
        printer.update("你好，世界");
        assert_eq!(printer.printed, "你好，世界");
        printer.update("replaced");
        assert_eq!(printer.printed, "replaced");
    }

    #[test]
    fn untitled_conversations_use_default_label() {
        let c = Conversation {
            id: ConversationId(3),
            title: None,
            messages: Vec::new(),
            created_at: chrono::Utc::now(),
            updated_at: None,
            has_more: false,
            next_cursor: None,
        };
        assert_eq!(conversation_label(&c), "新对话");
    }
}
