//! External collaborators behind async traits
//!
//! HTTP implementations for the ledger read endpoint, the assistant endpoint
//! and object storage, plus the identity bootstrap they all depend on.

pub mod assistant_api;
pub mod credentials;
pub mod ledger_api;
pub mod object_storage;

use reqwest::Client;
use std::time::Duration;

pub use assistant_api::{AssistantClient, HttpAssistantClient};
pub use credentials::{
    provider_from_config, CredentialProvider, Credentials, GuestCredentials,
    StaticTokenCredentials,
};
pub use ledger_api::{HttpLedgerSource, LedgerSource};
pub use object_storage::{object_key, HttpObjectStore, ObjectStore};

use crate::error::{Result, VoucherError};

/// Shared HTTP client for all adapters
pub fn build_http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| VoucherError::Internal(format!("Failed to create HTTP client: {}", e)))
}
