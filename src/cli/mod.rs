//! voucherdesk CLI - terminal front end for the invoice dashboard
//!
//! Commands:
//! - `voucherdesk ledger` - Print the voucher ledger
//! - `voucherdesk upload <path>` - Upload an invoice and wait for it to settle
//! - `voucherdesk chat <prompt>` - Ask the assistant one question
//! - `voucherdesk shell` - Interactive session

pub mod output;
pub mod shell;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;

use crate::controller::{AppController, AppEvent};
use crate::domain::{ChatRole, RequestId, UploadFile, UploadStatus};
use output::OutputMode;

/// Invoice dashboard client
#[derive(Parser, Debug)]
#[command(name = "voucherdesk")]
#[command(author, version, about = "Invoice ledger, upload and assistant client")]
pub struct Cli {
    /// Directory holding default.toml and environment overrides
    #[arg(long, env = "VOUCHERDESK_CONFIG_DIR", default_value = "config")]
    pub config_dir: PathBuf,

    /// Base URL of the API gateway; skips config files when set
    #[arg(long, env = "VOUCHERDESK_API_BASE")]
    pub api_base: Option<String>,

    /// Enable debug logging for voucherdesk
    #[arg(short, long)]
    pub verbose: bool,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the voucher ledger
    Ledger,

    /// Upload an invoice file and wait for it to appear in the ledger
    Upload {
        /// Path to the invoice file
        path: PathBuf,
    },

    /// Ask the assistant a question
    Chat {
        /// Prompt text
        #[arg(required = true, trailing_var_arg = true)]
        prompt: Vec<String>,
    },

    /// Interactive shell
    Shell,
}

/// Execute a one-shot command against a started controller
pub async fn run(command: Commands, controller: &AppController, mode: OutputMode) -> Result<()> {
    match command {
        Commands::Ledger => ledger(controller, mode).await,
        Commands::Upload { path } => upload(controller, &path, mode).await,
        Commands::Chat { prompt } => chat(controller, &prompt.join(" "), mode).await,
        Commands::Shell => shell::run(controller, mode).await,
    }
}

/// Print the ledger loaded by `start()`; a failed startup refresh is the
/// command's error rather than a reason to fetch again.
async fn ledger(controller: &AppController, mode: OutputMode) -> Result<()> {
    let state = controller.snapshot().await;
    if let Some(error) = state.last_ledger_error {
        anyhow::bail!("ledger unavailable: {error}");
    }
    if state.last_refreshed_at.is_none() {
        controller.refresh_ledger().await?;
        let state = controller.snapshot().await;
        return output::print_ledger(&state.ledger, mode);
    }
    output::print_ledger(&state.ledger, mode)
}

async fn upload(controller: &AppController, path: &std::path::Path, mode: OutputMode) -> Result<()> {
    let file = UploadFile::from_path(path).await?;
    let mut events = controller.subscribe();

    let Some(handle) = controller.submit_upload(file).await? else {
        anyhow::bail!("upload not accepted: another upload is in progress");
    };

    if mode == OutputMode::Table {
        // Surface notices while the job settles
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(AppEvent::Notice(notice)) => output::print_notice(&notice),
                    Ok(_) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    let status = handle.await?;
    let state = controller.snapshot().await;
    match mode {
        OutputMode::Json => {
            println!("{}", serde_json::to_string_pretty(&state.upload)?);
        }
        OutputMode::Table => {
            if matches!(status, UploadStatus::Settled { .. }) {
                output::print_ledger(&state.ledger, mode)?;
            }
        }
    }

    match status {
        UploadStatus::Settled { .. } | UploadStatus::TimedOut { .. } => Ok(()),
        UploadStatus::Failed { reason } => anyhow::bail!("upload failed: {reason}"),
        other => anyhow::bail!("upload ended as {other}"),
    }
}

async fn chat(controller: &AppController, prompt: &str, mode: OutputMode) -> Result<()> {
    let Some(id) = controller.submit_chat_message(prompt).await? else {
        anyhow::bail!("empty prompt");
    };
    let state = controller.snapshot().await;
    let Some(reply) = reply_for(&state.transcript, id) else {
        anyhow::bail!("no reply recorded for request {id}");
    };

    match mode {
        OutputMode::Json => println!("{}", serde_json::to_string_pretty(reply)?),
        OutputMode::Table => println!("{}", output::render_message(reply)),
    }
    Ok(())
}

fn reply_for(
    transcript: &crate::domain::ChatTranscript,
    id: RequestId,
) -> Option<&crate::domain::ChatMessage> {
    transcript
        .messages()
        .iter()
        .find(|m| m.role == ChatRole::Assistant && m.request_id == Some(id))
}
