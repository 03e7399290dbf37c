//! Output formatting for `voucherdesk` commands.
//!
//! Supports two modes: human-readable tables (default) and JSON (--json).

use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::controller::{AppState, Notice, NoticeLevel};
use crate::domain::{ChatMessage, ChatRole, Ledger, VoucherSummary};

/// Output mode for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Table,
    Json,
}

impl OutputMode {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Table
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct LedgerRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Vendor")]
    pub vendor: String,
    #[tabled(rename = "Amount")]
    pub amount: String,
    #[tabled(rename = "Status")]
    pub status: String,
}

impl From<&VoucherSummary> for LedgerRow {
    fn from(v: &VoucherSummary) -> Self {
        Self {
            id: v.voucher_id.clone(),
            vendor: v.vendor_name.clone(),
            amount: format!("₹{}", v.total_amount),
            status: if v.e_way_bill.is_required() {
                "Needed".to_string()
            } else {
                "OK".to_string()
            },
        }
    }
}

pub fn ledger_rows(ledger: &Ledger) -> Vec<LedgerRow> {
    ledger.vouchers().iter().map(LedgerRow::from).collect()
}

/// Render the ledger table plus totals line
pub fn render_ledger(ledger: &Ledger) -> String {
    if ledger.is_empty() {
        return "(no vouchers)".to_string();
    }
    let mut table = Table::new(ledger_rows(ledger));
    table.with(Style::rounded());
    let totals = ledger.totals();
    format!(
        "{table}\n{} vouchers, ₹{} total, {} need an e-way bill",
        totals.voucher_count, totals.total_amount, totals.e_way_bill_required
    )
}

pub fn print_ledger(ledger: &Ledger, mode: OutputMode) -> anyhow::Result<()> {
    match mode {
        OutputMode::Table => println!("{}", render_ledger(ledger)),
        OutputMode::Json => println!("{}", serde_json::to_string_pretty(ledger.vouchers())?),
    }
    Ok(())
}

pub fn render_message(message: &ChatMessage) -> String {
    match message.role {
        ChatRole::User => format!("\x1b[34myou>\x1b[0m {}", message.text),
        ChatRole::Assistant => format!("\x1b[36mai>\x1b[0m  {}", message.text),
    }
}

pub fn print_status(state: &AppState, mode: OutputMode) -> anyhow::Result<()> {
    if mode == OutputMode::Json {
        println!("{}", serde_json::to_string_pretty(state)?);
        return Ok(());
    }

    println!("ledger:     {} vouchers", state.ledger.len());
    if state.ledger_loading() {
        println!("            (refreshing)");
    }
    if let Some(at) = state.last_refreshed_at {
        println!("refreshed:  {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(err) = &state.last_ledger_error {
        print_warn(&format!("last refresh failed: {err}"));
    }
    match &state.upload {
        Some(job) => println!("upload:     {} ({})", job.file_name, job.status),
        None => println!("upload:     none"),
    }
    println!(
        "chat:       {} messages, {}",
        state.transcript.len(),
        state.chat_state
    );
    Ok(())
}

pub fn print_notice(notice: &Notice) {
    match notice.level {
        NoticeLevel::Info => print_success(&notice.message),
        NoticeLevel::Warning => print_warn(&notice.message),
        NoticeLevel::Error => print_error(&notice.message),
    }
}

/// Print a success message.
pub fn print_success(msg: &str) {
    println!("\x1b[32m{msg}\x1b[0m");
}

/// Print a warning message.
pub fn print_warn(msg: &str) {
    println!("\x1b[33m{msg}\x1b[0m");
}

/// Print an error message.
pub fn print_error(msg: &str) {
    eprintln!("\x1b[31m{msg}\x1b[0m");
}
