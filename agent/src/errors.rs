//! Error types for the login-watch agent

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Debug, Error)]
pub enum AgentError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The log source could not be started or read
    #[error("Log source error: {0}")]
    Source(String),

    /// A single delivery attempt failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// The delivery queue was closed while the follower was still producing
    #[error("Event queue closed")]
    QueueClosed,
}
