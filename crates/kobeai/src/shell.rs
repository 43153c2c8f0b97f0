// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `kobeai shell` command implementation.
//!
//! Interactive REPL with a colored prompt, readline history, and replies
//! streamed to stdout as they arrive. Queued offline messages are delivered
//! in the background once the connection comes back.

use colored::Colorize;
use kobeai_chat::ClientContext;
use kobeai_core::types::{ConversationId, LinkState, Role};
use kobeai_core::KobeError;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::commands;

/// A line typed at the prompt.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Quit,
    Help,
    New(Option<&'a str>),
    List,
    Switch(i64),
    More,
    Rename(&'a str),
    Delete(i64),
    Flush,
    Status,
    Message(&'a str),
    Invalid(&'static str),
}

fn parse_input(line: &str) -> Input<'_> {
    let Some(command) = line.strip_prefix('/') else {
        return Input::Message(line);
    };
    let (name, rest) = command
        .split_once(char::is_whitespace)
        .map(|(n, r)| (n, r.trim()))
        .unwrap_or((command, ""));
    match name {
        "quit" | "exit" => Input::Quit,
        "help" => Input::Help,
        "new" => Input::New((!rest.is_empty()).then_some(rest)),
        "list" => Input::List,
        "switch" => rest.parse().map(Input::Switch).unwrap_or(Input::Invalid("usage: /switch <id>")),
        "more" => Input::More,
        "rename" if !rest.is_empty() => Input::Rename(rest),
        "rename" => Input::Invalid("usage: /rename <title>"),
        "delete" => rest.parse().map(Input::Delete).unwrap_or(Input::Invalid("usage: /delete <id>")),
        "flush" => Input::Flush,
        "status" => Input::Status,
        _ => Input::Invalid("unknown command, try /help"),
    }
}

const HELP: &str = "\
/new [title]     start a conversation
/list            list conversations
/switch <id>     select a conversation
/more            load older messages
/rename <title>  rename the selected conversation
/delete <id>     delete a conversation
/flush           send queued offline messages
/status          connection and queue state
/quit            leave the shell";

/// Runs the `kobeai shell` interactive REPL.
pub async fn run_shell(ctx: &ClientContext, cancel: &CancellationToken) -> Result<(), KobeError> {
    if !ctx.guard().is_valid() {
        return Err(KobeError::AuthExpired {
            message: "run `kobeai login` first".into(),
        });
    }

    ctx.start();
    if let Err(e) = ctx.reconciler().load_conversations().await {
        eprintln!("{}", commands::describe_error(&e));
    }
    let mut links = ctx.monitor().subscribe();

    let mut rl = DefaultEditor::new()
        .map_err(|e| KobeError::Internal(format!("failed to initialize readline: {e}")))?;

    let name = ctx.config().client.name.clone();
    println!("{}", format!("{name} shell").bold().green());
    println!("Type /help for commands, /quit or Ctrl+D to exit.\n");
    print_current(ctx);

    loop {
        if links.has_changed().unwrap_or(false) {
            match links.borrow_and_update().link {
                LinkState::Offline => println!("{}", "connection lost, messages will be queued".yellow()),
                LinkState::Online => println!("{}", "connection restored".green()),
                LinkState::Unknown => {}
            }
        }

        let prompt = format!("{}> ", name.green());
        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}: {e}", "error".red());
                break;
            }
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(trimmed);

        let result = match parse_input(trimmed) {
            Input::Quit => break,
            Input::Help => {
                println!("{HELP}");
                Ok(())
            }
            Input::New(title) => ctx.reconciler().create_conversation(title).await.map(|c| {
                println!("started conversation #{} {}", c.id, commands::conversation_label(&c));
            }),
            Input::List => ctx.reconciler().load_conversations().await.map(|list| {
                commands::print_conversations(&list, ctx.reconciler().current_id());
            }),
            Input::Switch(id) => ctx
                .reconciler()
                .switch_conversation(ConversationId(id))
                .await
                .map(|_| print_current(ctx)),
            Input::More => ctx.reconciler().load_more_messages().await.map(|count| {
                if count == 0 {
                    println!("{}", "no older messages".dimmed());
                } else {
                    println!("loaded {count} older messages");
                    print_current(ctx);
                }
            }),
            Input::Rename(title) => match ctx.reconciler().current_id() {
                Some(id) => ctx.reconciler().rename_conversation(id, title).await,
                None => Err(KobeError::Validation("no conversation selected".into())),
            },
            Input::Delete(id) => ctx.reconciler().delete_conversation(ConversationId(id)).await,
            Input::Flush => commands::flush(ctx).await,
            Input::Status => commands::status(ctx).await,
            Input::Invalid(usage) => {
                println!("{}", usage.dimmed());
                Ok(())
            }
            Input::Message(text) => commands::send_and_print(ctx, text, cancel).await,
        };

        if let Err(e) = result {
            eprintln!("{}", commands::describe_error(&e));
        }
        if cancel.is_cancelled() {
            debug!("shell interrupted");
            break;
        }
    }

    println!("{}", "goodbye".dimmed());
    Ok(())
}

fn print_current(ctx: &ClientContext) {
    let Some(conversation) = ctx.reconciler().current_conversation() else {
        return;
    };
    println!(
        "{}",
        format!("#{} {}", conversation.id, commands::conversation_label(&conversation)).bold()
    );
    if conversation.has_more {
        println!("{}", "(older messages available, /more)".dimmed());
    }
    for message in &conversation.messages {
        match message.role {
            Role::User => println!("{} {}", "you:".cyan(), message.content),
            Role::Assistant => println!("{} {}", "ai:".green(), message.content),
            Role::System => println!("{}", message.content.dimmed()),
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_message() {
        assert_eq!(parse_input("hello /there"), Input::Message("hello /there"));
    }

    #[test]
    fn slash_commands() {
        assert_eq!(parse_input("/quit"), Input::Quit);
        assert_eq!(parse_input("/exit"), Input::Quit);
        assert_eq!(parse_input("/new"), Input::New(None));
        assert_eq!(parse_input("/new  trip plans "), Input::New(Some("trip plans")));
        assert_eq!(parse_input("/switch 42"), Input::Switch(42));
        assert_eq!(parse_input("/rename 周末"), Input::Rename("周末"));
        assert_eq!(parse_input("/delete 7"), Input::Delete(7));
    }

    #[test]
    fn bad_arguments_show_usage() {
        assert_eq!(parse_input("/switch abc"), Input::Invalid("usage: /switch <id>"));
        assert_eq!(parse_input("/rename"), Input::Invalid("usage: /rename <title>"));
        assert!(matches!(parse_input("/bogus"), Input::Invalid(_)));
    }
}
