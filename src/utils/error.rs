use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Upstream unavailable: {url}: {message}")]
    UpstreamUnavailable { url: String, message: String },

    #[error("Upstream parse error: {url}: {message}")]
    UpstreamParse { url: String, message: String },

    #[error("Scan already running: {run_id}")]
    ScanAlreadyRunning { run_id: String },

    #[error("Delivery failed on {channel}: {reason}")]
    ChannelDelivery { channel: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Knowledge base error: {0}")]
    KnowledgeBase(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {resource}")]
    NotFound { resource: String },
}

impl AppError {
    pub fn unavailable(url: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::UpstreamUnavailable {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn parse(url: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::UpstreamParse {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn delivery(channel: impl ToString, reason: impl Into<String>) -> Self {
        AppError::ChannelDelivery {
            channel: channel.to_string(),
            reason: reason.into(),
        }
    }

    /// Errors from shared persistence. A scan cannot make progress past one.
    pub fn is_fatal_to_scan(&self) -> bool {
        matches!(self, AppError::Database(_) | AppError::Storage(_))
    }
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
