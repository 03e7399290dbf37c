//! Assistant chat endpoint client

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::credentials::Credentials;
use crate::error::{Result, VoucherError};

#[derive(Debug, Clone, Serialize)]
pub struct AssistantRequest<'a> {
    pub prompt: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantReply {
    pub answer: String,
}

/// Remote assistant answering questions about the ledger
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssistantClient: Send + Sync {
    async fn ask(&self, credentials: &Credentials, prompt: &str) -> Result<String>;
}

pub struct HttpAssistantClient {
    http: Client,
    url: String,
}

impl HttpAssistantClient {
    pub fn new(http: Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl AssistantClient for HttpAssistantClient {
    async fn ask(&self, credentials: &Credentials, prompt: &str) -> Result<String> {
        debug!("Sending request to assistant API");

        let response = credentials
            .apply(self.http.post(&self.url))
            .header("Content-Type", "application/json")
            .json(&AssistantRequest { prompt })
            .send()
            .await
            .map_err(|e| VoucherError::Assistant(format!("endpoint unreachable: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Assistant API error: {} - {}", status, body);
            return Err(VoucherError::Assistant(format!(
                "endpoint returned {status}"
            )));
        }

        let reply: AssistantReply = response
            .json()
            .await
            .map_err(|e| VoucherError::Assistant(format!("malformed reply: {e}")))?;

        debug!("Assistant response received: {} chars", reply.answer.len());
        Ok(reply.answer)
    }
}
