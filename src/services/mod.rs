//! Core client services
//!
//! - `LedgerSync`: fetch and filter ledger records
//! - `UploadCoordinator`: storage write plus ledger reconciliation
//! - `ChatSession`: correlated request/response conversation

pub mod chat;
pub mod ledger_sync;
pub mod upload;

pub use chat::{ChatSession, ChatState, ChatTurn, CANCELLED_REPLY};
pub use ledger_sync::LedgerSync;
pub use upload::{UploadCoordinator, UploadObserver};
