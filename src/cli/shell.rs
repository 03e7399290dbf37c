//! `voucherdesk shell` — interactive session over one controller.
//!
//! Lines starting with a shell command are parsed as such; any other line is
//! sent to the assistant. Uploads and chat turns run in the background and
//! their results are printed as they arrive.

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;

use super::output::{self, OutputMode};
use crate::controller::{AppController, AppEvent};
use crate::domain::{ChatRole, UploadFile};

/// Internal CLI struct for shell parsing.
#[derive(Parser)]
#[command(name = "voucherdesk", no_binary_name = true)]
struct ShellCli {
    #[command(subcommand)]
    command: ShellCommand,
}

#[derive(Subcommand, Debug)]
enum ShellCommand {
    /// Print the displayed ledger
    Ledger,
    /// Fetch the ledger again
    Refresh,
    /// Upload an invoice file
    Upload { path: PathBuf },
    /// Cancel the active upload
    Cancel,
    /// Retry reconciliation of a timed-out upload
    Retry,
    /// Ask the assistant
    Ask {
        #[arg(required = true, trailing_var_arg = true)]
        prompt: Vec<String>,
    },
    /// Resolve pending assistant requests
    Hush,
    /// Print the chat transcript
    History,
    /// Show session status
    Status,
}

/// Directory for shell history and logs
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("voucherdesk"))
}

pub async fn run(controller: &AppController, mode: OutputMode) -> Result<()> {
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;

    println!("\x1b[36mvoucherdesk shell\x1b[0m");
    println!("Type a question for the assistant, or 'help' for commands, 'exit' to quit.");
    println!();

    let greeting = controller.snapshot().await;
    for message in greeting.transcript.messages() {
        println!("{}", output::render_message(message));
    }
    let printer = tokio::spawn(print_events(
        controller.clone(),
        greeting.transcript.len(),
    ));

    let history_path = data_dir().map(|d| d.join("history.txt"));
    let mut rl = DefaultEditor::new()?;
    if let Some(ref path) = history_path {
        let _ = rl.load_history(path);
    }

    loop {
        match rl.readline("\x1b[36mvd>\x1b[0m ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                match line {
                    "exit" | "quit" | "q" => break,
                    "help" | "?" => {
                        print_shell_help();
                        continue;
                    }
                    _ => {}
                }

                let command = if is_shell_command(line) {
                    match ShellCli::try_parse_from(line.split_whitespace()) {
                        Ok(parsed) => parsed.command,
                        Err(e) => {
                            eprintln!("{e}");
                            continue;
                        }
                    }
                } else {
                    ShellCommand::Ask {
                        prompt: vec![line.to_string()],
                    }
                };

                if let Err(e) = dispatch(controller, command, mode).await {
                    output::print_error(&format!("{e}"));
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("readline error: {e}");
                break;
            }
        }
    }

    printer.abort();
    if let Some(ref path) = history_path {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = rl.save_history(path);
    }

    Ok(())
}

fn is_shell_command(line: &str) -> bool {
    let Some(first) = line.split_whitespace().next() else {
        return false;
    };
    ShellCli::command()
        .get_subcommands()
        .any(|c| c.get_name() == first)
}

async fn dispatch(controller: &AppController, command: ShellCommand, mode: OutputMode) -> Result<()> {
    match command {
        ShellCommand::Ledger => {
            let state = controller.snapshot().await;
            output::print_ledger(&state.ledger, mode)?;
        }
        ShellCommand::Refresh => {
            let count = controller.refresh_ledger().await?;
            output::print_success(&format!("Ledger refreshed: {count} vouchers"));
        }
        ShellCommand::Upload { path } => {
            let file = UploadFile::from_path(&path).await?;
            match controller.submit_upload(file).await? {
                Some(_) => output::print_success(&format!("Uploading {}", path.display())),
                None => output::print_warn("An upload is already in progress"),
            }
        }
        ShellCommand::Cancel => {
            if !controller.cancel_upload().await {
                output::print_warn("No active upload");
            }
        }
        ShellCommand::Retry => {
            if controller.retry_reconciliation().await?.is_none() {
                output::print_warn("Nothing to retry");
            }
        }
        ShellCommand::Ask { prompt } => {
            let controller = controller.clone();
            let prompt = prompt.join(" ");
            // The reply is printed by the event printer
            tokio::spawn(async move {
                if let Err(e) = controller.submit_chat_message(&prompt).await {
                    output::print_error(&format!("{e}"));
                }
            });
        }
        ShellCommand::Hush => {
            let cancelled = controller.cancel_chat().await;
            if cancelled == 0 {
                output::print_warn("No pending questions");
            }
        }
        ShellCommand::History => {
            let state = controller.snapshot().await;
            for message in state.transcript.messages() {
                println!("{}", output::render_message(message));
            }
        }
        ShellCommand::Status => {
            let state = controller.snapshot().await;
            output::print_status(&state, mode)?;
        }
    }
    Ok(())
}

/// Print notices and new assistant messages as they are committed
async fn print_events(controller: AppController, mut printed: usize) {
    let mut events = controller.subscribe();
    loop {
        match events.recv().await {
            Ok(AppEvent::Notice(notice)) => output::print_notice(&notice),
            Ok(AppEvent::ChatUpdated { transcript_len, .. }) if transcript_len > printed => {
                let state = controller.snapshot().await;
                let messages = state.transcript.messages();
                for message in messages.iter().skip(printed) {
                    if message.role == ChatRole::Assistant {
                        println!("{}", output::render_message(message));
                    }
                }
                printed = messages.len();
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Shell event printer lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_shell_help() {
    println!("Available commands:");
    println!("  ledger           (print the displayed ledger)");
    println!("  refresh          (fetch the ledger again)");
    println!("  upload <path>    (upload an invoice)");
    println!("  cancel           (cancel the active upload)");
    println!("  retry            (retry a timed-out upload)");
    println!("  ask <question>   (ask the assistant; plain text works too)");
    println!("  hush             (give up on pending questions)");
    println!("  history          (print the chat transcript)");
    println!("  status           (session status)");
    println!("  help             (this message)");
    println!("  exit             (quit shell)");
}
