use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Ledger read endpoint (returns a JSON array of records)
    pub ledger_url: String,
    /// Assistant endpoint (POST {prompt} -> {answer})
    pub chat_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Object storage base endpoint (e.g., "https://s3.ap-south-1.amazonaws.com")
    pub endpoint: String,
    /// Bucket receiving invoice uploads
    pub bucket: String,
    /// Prepended verbatim to the file name to form the object key
    #[serde(default)]
    pub key_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Wait after a successful storage write before the first ledger poll
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,
    /// Base delay for exponential backoff between polls
    #[serde(default = "default_base_backoff")]
    pub base_backoff_ms: u64,
    /// Cap on the backoff delay
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
    /// Polls before a settling job times out
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_initial_delay() -> u64 {
    5_000
}

fn default_base_backoff() -> u64 {
    2_000
}

fn default_max_backoff() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    6
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay(),
            base_backoff_ms: default_base_backoff(),
            max_backoff_ms: default_max_backoff(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl UploadConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Delay before poll number `attempt` (1-based); the first poll waits
    /// `initial_delay_ms`, later ones back off exponentially.
    pub fn poll_delay(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return self.initial_delay();
        }
        let delay = self
            .base_backoff_ms
            .saturating_mul(2u64.saturating_pow(attempt - 2));
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_greeting")]
    pub greeting: String,
    /// Reply appended when the assistant endpoint fails
    #[serde(default = "default_fallback_reply")]
    pub fallback_reply: String,
}

fn default_greeting() -> String {
    "Hello! I am your RetailAI Assistant. Ask me about your invoices or GST liability."
        .to_string()
}

fn default_fallback_reply() -> String {
    "Sorry, my brain is offline. Check API Gateway!".to_string()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            greeting: default_greeting(),
            fallback_reply: default_fallback_reply(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CredentialsMode {
    /// Anonymous access, no Authorization header
    #[default]
    Guest,
    /// Static bearer token
    Token,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub mode: CredentialsMode,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("api.timeout_secs", 30)?
            .set_default("storage.key_prefix", "")?
            .set_default("credentials.mode", "guest")?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("VOUCHERDESK_ENV")
                        .unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (VOUCHERDESK_API__LEDGER_URL, etc.)
            .add_source(
                Environment::with_prefix("VOUCHERDESK")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Create a default configuration for CLI usage
    pub fn default_config(api_base: &str) -> Self {
        let base = api_base.trim_end_matches('/');
        Self {
            api: ApiConfig {
                ledger_url: format!("{base}/vouchers"),
                chat_url: format!("{base}/chat"),
                timeout_secs: default_timeout_secs(),
            },
            storage: StorageConfig {
                endpoint: "http://localhost:9000".to_string(),
                bucket: "invoices".to_string(),
                key_prefix: String::new(),
            },
            upload: UploadConfig::default(),
            chat: ChatConfig::default(),
            credentials: CredentialsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for (name, value) in [
            ("api.ledger_url", &self.api.ledger_url),
            ("api.chat_url", &self.api.chat_url),
            ("storage.endpoint", &self.storage.endpoint),
        ] {
            if let Err(e) = url::Url::parse(value) {
                errors.push(format!("{name} is not a valid URL ({value}): {e}"));
            }
        }

        if self.storage.bucket.trim().is_empty() {
            errors.push("storage.bucket must not be empty".to_string());
        }

        if self.api.timeout_secs == 0 {
            errors.push("api.timeout_secs must be positive".to_string());
        }

        if self.upload.max_attempts == 0 {
            errors.push("upload.max_attempts must be at least 1".to_string());
        }

        if self.upload.base_backoff_ms > self.upload.max_backoff_ms {
            errors.push("upload.base_backoff_ms must not exceed upload.max_backoff_ms".to_string());
        }

        if self.credentials.mode == CredentialsMode::Token
            && self
                .credentials
                .token
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .is_empty()
        {
            errors.push("credentials.token is required when credentials.mode = token".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
