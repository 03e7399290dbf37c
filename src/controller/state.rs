//! Application State — the single authoritative view handed to presentation

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::event::Notice;
use crate::domain::{ChatTranscript, Ledger, UploadJob};
use crate::services::ChatState;

#[derive(Debug, Clone, Serialize)]
pub struct AppState {
    /// SUMMARY-only ledger, rebuilt wholesale on every applied refresh
    pub ledger: Ledger,
    /// User-triggered refreshes not yet completed
    pub refreshes_in_flight: usize,
    /// When a ledger was last applied
    pub last_refreshed_at: Option<DateTime<Utc>>,
    /// Message of the last failed refresh; cleared on success
    pub last_ledger_error: Option<String>,
    /// Latest upload job, active or terminal
    pub upload: Option<UploadJob>,
    pub transcript: ChatTranscript,
    pub chat_state: ChatState,
    pub last_notice: Option<Notice>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(greeting: &str) -> Self {
        Self {
            ledger: Ledger::default(),
            refreshes_in_flight: 0,
            last_refreshed_at: None,
            last_ledger_error: None,
            upload: None,
            transcript: ChatTranscript::seeded(greeting),
            chat_state: ChatState::Idle,
            last_notice: None,
            started_at: Utc::now(),
        }
    }

    pub fn ledger_loading(&self) -> bool {
        self.refreshes_in_flight > 0
    }

    pub fn upload_active(&self) -> bool {
        self.upload.as_ref().map(UploadJob::is_active).unwrap_or(false)
    }

    pub fn is_typing(&self) -> bool {
        self.chat_state == ChatState::AwaitingResponse
    }

    pub(crate) fn apply_ledger(&mut self, ledger: Ledger) {
        self.ledger = ledger;
        self.last_refreshed_at = Some(Utc::now());
        self.last_ledger_error = None;
    }
}
