use thiserror::Error;

/// Main error type for the dashboard client
#[derive(Error, Debug)]
pub enum VoucherError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Network error: {0}")]
    Network(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed response: {0}")]
    Parse(String),

    // Remote collaborator errors
    #[error("Upload rejected: {0}")]
    Upload(String),

    #[error("Assistant unavailable: {0}")]
    Assistant(String),

    // Identity bootstrap
    #[error("Authentication error: {0}")]
    Auth(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for VoucherError
pub type Result<T> = std::result::Result<T, VoucherError>;

/// Failure classes surfaced to the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Parse,
    Upload,
    Assistant,
    Other,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Network => write!(f, "network"),
            ErrorKind::Parse => write!(f, "parse"),
            ErrorKind::Upload => write!(f, "upload"),
            ErrorKind::Assistant => write!(f, "assistant"),
            ErrorKind::Other => write!(f, "other"),
        }
    }
}

impl VoucherError {
    /// Classify this error into the client-facing taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            VoucherError::Network(_) => ErrorKind::Network,
            VoucherError::Http(e) if e.is_decode() => ErrorKind::Parse,
            VoucherError::Http(_) => ErrorKind::Network,
            VoucherError::Parse(_) | VoucherError::Json(_) => ErrorKind::Parse,
            VoucherError::Upload(_) => ErrorKind::Upload,
            VoucherError::Assistant(_) => ErrorKind::Assistant,
            _ => ErrorKind::Other,
        }
    }
}
