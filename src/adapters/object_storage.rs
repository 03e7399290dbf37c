//! Object storage write
//!
//! Writing an object is what triggers backend processing; the write result
//! carries no content.

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use super::credentials::Credentials;
use crate::config::StorageConfig;
use crate::error::{Result, VoucherError};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Put `data` under `key` with the declared content type
    async fn put_object(
        &self,
        credentials: &Credentials,
        key: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<()>;
}

/// Object key for an uploaded file: prefix and file name, verbatim
pub fn object_key(prefix: &str, file_name: &str) -> String {
    format!("{prefix}{file_name}")
}

/// Path-style PUT against an S3-compatible endpoint
pub struct HttpObjectStore {
    http: Client,
    endpoint: String,
    bucket: String,
}

impl HttpObjectStore {
    pub fn new(http: Client, config: &StorageConfig) -> Self {
        Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            bucket: config.bucket.clone(),
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint,
            self.bucket,
            urlencoding::encode(key)
        )
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put_object(
        &self,
        credentials: &Credentials,
        key: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<()> {
        let url = self.object_url(key);
        debug!(%url, content_type, size = data.len(), "Writing object");

        let response = credentials
            .apply(self.http.put(&url))
            .header("Content-Type", content_type)
            .body(data)
            .send()
            .await
            .map_err(|e| VoucherError::Upload(format!("storage unreachable: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Storage write rejected: {} - {}", status, body);
            return Err(VoucherError::Upload(format!("storage returned {status}")));
        }

        Ok(())
    }
}
