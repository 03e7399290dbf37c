//! Change notifications broadcast to presentation subscribers

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{RequestId, UploadJob, UploadStatus};
use crate::error::ErrorKind;
use crate::services::ChatState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for NoticeLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NoticeLevel::Info => write!(f, "info"),
            NoticeLevel::Warning => write!(f, "warning"),
            NoticeLevel::Error => write!(f, "error"),
        }
    }
}

/// User-visible signal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            at: Utc::now(),
        }
    }

    /// Signal for an upload status change, if that change is user-visible
    pub fn for_upload(job: &UploadJob) -> Option<Self> {
        let notice = match &job.status {
            UploadStatus::Settling { attempt: 0 } => Notice::new(
                NoticeLevel::Info,
                "Upload Successful! Processing invoice...",
            ),
            UploadStatus::Settled { voucher_ids } => Notice::new(
                NoticeLevel::Info,
                format!("{} processed: {}", job.file_name, voucher_ids.join(", ")),
            ),
            UploadStatus::TimedOut { attempts } => Notice::new(
                NoticeLevel::Warning,
                format!(
                    "{} is still processing after {} ledger checks; the ledger may be stale",
                    job.file_name, attempts
                ),
            ),
            UploadStatus::Failed { reason } => {
                Notice::new(NoticeLevel::Error, format!("Upload failed: {reason}"))
            }
            UploadStatus::Cancelled => Notice::new(
                NoticeLevel::Info,
                format!("Upload of {} cancelled", job.file_name),
            ),
            _ => return None,
        };
        Some(notice)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AppEvent {
    LedgerUpdated {
        voucher_count: usize,
    },
    LedgerRefreshFailed {
        kind: String,
        message: String,
    },
    UploadStatusChanged(UploadJob),
    ChatUpdated {
        transcript_len: usize,
        chat_state: ChatState,
        /// Request the change belongs to, if any
        request_id: Option<RequestId>,
    },
    Notice(Notice),
}

impl AppEvent {
    pub fn refresh_failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        AppEvent::LedgerRefreshFailed {
            kind: kind.to_string(),
            message: message.into(),
        }
    }
}
