//! voucherdesk - client core for an invoice dashboard
//!
//! Keeps a SUMMARY-only voucher ledger in sync with a remote ledger service,
//! uploads invoices to object storage and waits for them to appear in the
//! ledger, and runs a turn-based conversation with a remote assistant.
//! [`AppController`] owns the state and is the only entry point presentation
//! code needs.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod controller;
pub mod domain;
pub mod error;
pub mod services;

pub use config::AppConfig;
pub use controller::{Adapters, AppController, AppEvent, AppState, Notice, NoticeLevel};
pub use domain::{
    ChatMessage, ChatRole, ChatTranscript, EWayBill, Ledger, RequestId, UploadFile, UploadJob,
    UploadStatus, VoucherSummary,
};
pub use error::{ErrorKind, Result, VoucherError};
