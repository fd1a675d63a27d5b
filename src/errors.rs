/// Domain-specific error types for the quote engine.
/// The pricing core returns these synchronously at the point of violation
/// and never produces a partial result. Transport maps each kind to a
/// distinct, stable status.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("insufficient data: {available} observations, need at least {required}")]
    InsufficientData { available: usize, required: usize },

    #[error("rate unavailable: {0}")]
    RateUnavailable(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("channel closed: {0}")]
    ChannelClosed(String),
}

impl EngineError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn rate_unavailable(msg: impl Into<String>) -> Self {
        Self::RateUnavailable(msg.into())
    }

    /// Stable machine-readable kind, used in error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::InsufficientData { .. } => "insufficient_data",
            Self::RateUnavailable(_) => "rate_unavailable",
            Self::Network(_) => "network",
            Self::Parse(_) => "parse",
            Self::Database(_) => "database",
            Self::Config(_) => "config",
            Self::ChannelClosed(_) => "channel_closed",
        }
    }

    /// HTTP status for this error kind.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput(_) => 422,
            Self::InsufficientData { .. } => 409,
            Self::RateUnavailable(_) => 503,
            Self::Network(_) | Self::Parse(_) => 502,
            Self::Database(_) | Self::Config(_) | Self::ChannelClosed(_) => 500,
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        EngineError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Parse(e.to_string())
    }
}

impl From<quick_xml::Error> for EngineError {
    fn from(e: quick_xml::Error) -> Self {
        EngineError::Parse(e.to_string())
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::Database(e.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Network(e.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
