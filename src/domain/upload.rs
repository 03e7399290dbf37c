use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use uuid::Uuid;

use crate::error::{Result, VoucherError};

/// File selected for submission
#[derive(Clone)]
pub struct UploadFile {
    pub name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl std::fmt::Debug for UploadFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadFile")
            .field("name", &self.name)
            .field("content_type", &self.content_type)
            .field("size", &self.data.len())
            .finish()
    }
}

impl UploadFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            data,
        }
    }

    /// Read a local file; the content type is declared from its extension
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                VoucherError::Validation(format!("{} has no usable file name", path.display()))
            })?
            .to_string();
        let data = tokio::fs::read(path).await?;
        Ok(Self::new(name, content_type_for(path), data))
    }
}

/// Declared content type for an invoice file, by extension
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Lifecycle of one submission.
///
/// `Pending -> Uploading -> Settling{attempt} -> Settled | TimedOut`,
/// `Uploading -> Failed`, and any non-terminal state `-> Cancelled`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Settling { attempt: u32 },
    Settled { voucher_ids: Vec<String> },
    TimedOut { attempts: u32 },
    Failed { reason: String },
    Cancelled,
}

impl UploadStatus {
    /// Active jobs block new submissions
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            UploadStatus::Pending | UploadStatus::Uploading | UploadStatus::Settling { .. }
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, UploadStatus::TimedOut { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Settling { .. } => "settling",
            UploadStatus::Settled { .. } => "settled",
            UploadStatus::TimedOut { .. } => "timed_out",
            UploadStatus::Failed { .. } => "failed",
            UploadStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadStatus::Settling { attempt } => write!(f, "settling (poll {attempt})"),
            UploadStatus::TimedOut { attempts } => write!(f, "timed out after {attempts} polls"),
            UploadStatus::Failed { reason } => write!(f, "failed: {reason}"),
            other => write!(f, "{}", other.label()),
        }
    }
}

/// Transient record of a submission; never persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadJob {
    pub id: Uuid,
    pub file_name: String,
    /// Object key the file was written under
    pub key: String,
    pub content_type: String,
    pub size_bytes: usize,
    pub status: UploadStatus,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UploadJob {
    pub fn new(file: &UploadFile, key: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            file_name: file.name.clone(),
            key,
            content_type: file.content_type.clone(),
            size_bytes: file.data.len(),
            status: UploadStatus::Pending,
            submitted_at: now,
            updated_at: now,
        }
    }

    pub fn transition(&mut self, status: UploadStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}
