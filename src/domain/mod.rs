//! Domain types for the invoice dashboard
//!
//! Ledger records, chat transcript and upload jobs.

pub mod chat;
pub mod upload;
pub mod voucher;

pub use chat::{ChatMessage, ChatRole, ChatTranscript, RequestId};
pub use upload::{content_type_for, UploadFile, UploadJob, UploadStatus};
pub use voucher::{
    partition_records, EWayBill, Ledger, LedgerTotals, RecordPartition, RecordType,
    VoucherSummary,
};
