//! Error types for the lectern client core.

/// Top-level error type for the study-assistant client.
#[derive(Debug, thiserror::Error)]
pub enum AssistError {
    /// Backend discovery or backend-reported failure.
    #[error("backend error: {0}")]
    Backend(String),

    /// HTTP transport failure (connection error, non-success status, reset).
    #[error("transport error: {0}")]
    Transport(String),

    /// Wire protocol failure (undecodable record).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Stream closed before the backend signalled completion.
    #[error("incomplete answer: {0}")]
    Incomplete(String),

    /// Audio decode or playback error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Ask-session lifecycle error.
    #[error("session error: {0}")]
    Session(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AssistError>;
