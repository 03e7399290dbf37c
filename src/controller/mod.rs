//! Dashboard Controller
//!
//! Composes ledger sync, upload reconciliation and the assistant chat behind
//! one explicit application state, exposed as immutable snapshots plus a
//! broadcast of change events.

pub mod controller;
pub mod event;
pub mod state;

pub use controller::{Adapters, AppController};
pub use event::{AppEvent, Notice, NoticeLevel};
pub use state::AppState;
