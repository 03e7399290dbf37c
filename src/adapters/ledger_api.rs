//! Ledger read endpoint client

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use super::credentials::Credentials;
use crate::error::{Result, VoucherError};

/// Source of the raw ledger record set
#[async_trait]
pub trait LedgerSource: Send + Sync {
    /// Fetch every record, in source order, undecoded
    async fn fetch_records(&self, credentials: &Credentials) -> Result<Vec<Value>>;
}

pub struct HttpLedgerSource {
    http: Client,
    url: String,
}

impl HttpLedgerSource {
    pub fn new(http: Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl LedgerSource for HttpLedgerSource {
    async fn fetch_records(&self, credentials: &Credentials) -> Result<Vec<Value>> {
        debug!(url = %self.url, "Fetching ledger records");

        let response = credentials
            .apply(self.http.get(&self.url))
            .send()
            .await
            .map_err(|e| VoucherError::Network(format!("ledger endpoint unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Ledger API error: {} - {}", status, body);
            return Err(VoucherError::Network(format!(
                "ledger endpoint returned {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| VoucherError::Network(format!("ledger body read failed: {e}")))?;

        let records: Vec<Value> = serde_json::from_str(&body)
            .map_err(|e| VoucherError::Parse(format!("ledger body is not a record array: {e}")))?;

        debug!("Ledger response received: {} records", records.len());
        Ok(records)
    }
}
