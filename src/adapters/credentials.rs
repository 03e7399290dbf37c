//! Identity bootstrap
//!
//! Every network call carries the `Credentials` produced here. Guest access
//! sends no Authorization header.

use async_trait::async_trait;
use reqwest::RequestBuilder;
use std::sync::Arc;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::config::{CredentialsConfig, CredentialsMode};
use crate::error::{Result, VoucherError};

#[derive(Clone)]
pub struct Credentials {
    identity: String,
    bearer: Option<Zeroizing<String>>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("bearer", &self.bearer.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Credentials {
    pub fn guest() -> Self {
        Self {
            identity: "guest".to_string(),
            bearer: None,
        }
    }

    pub fn bearer(identity: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            bearer: Some(Zeroizing::new(token.into())),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn is_guest(&self) -> bool {
        self.bearer.is_none()
    }

    /// Attach authorization to an outgoing request
    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.bearer {
            Some(token) => request.bearer_auth(token.as_str()),
            None => request,
        }
    }
}

/// External identity step that must succeed before any network call
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn bootstrap(&self) -> Result<Credentials>;
}

/// Anonymous access
pub struct GuestCredentials;

#[async_trait]
impl CredentialProvider for GuestCredentials {
    async fn bootstrap(&self) -> Result<Credentials> {
        debug!("Using guest credentials");
        Ok(Credentials::guest())
    }
}

/// Pre-issued bearer token
pub struct StaticTokenCredentials {
    token: Zeroizing<String>,
}

impl StaticTokenCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Zeroizing::new(token.into()),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticTokenCredentials {
    async fn bootstrap(&self) -> Result<Credentials> {
        if self.token.trim().is_empty() {
            return Err(VoucherError::Auth("bearer token is empty".to_string()));
        }
        info!("Using static bearer token credentials");
        Ok(Credentials::bearer("token", self.token.as_str()))
    }
}

/// Build the provider selected by configuration
pub fn provider_from_config(config: &CredentialsConfig) -> Result<Arc<dyn CredentialProvider>> {
    match config.mode {
        CredentialsMode::Guest => Ok(Arc::new(GuestCredentials)),
        CredentialsMode::Token => {
            let token = config.token.clone().ok_or_else(|| {
                VoucherError::Auth("credentials.mode = token but no token configured".to_string())
            })?;
            Ok(Arc::new(StaticTokenCredentials::new(token)))
        }
    }
}
