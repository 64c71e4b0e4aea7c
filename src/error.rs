// =============================================================================
// OVERLAY COORDINATOR — error.rs
// Таксономия ошибок координатора
// =============================================================================

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed frame, JSON or message shape. Drop the frame, keep the connection.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Envelope failed the integrity check. Reported to peers exactly like `Protocol`.
    #[error("authentication failed")]
    Authentication,

    #[error("classifier unavailable: {0}")]
    ClassificationUnavailable(String),

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("store contention: {0}")]
    StoreContention(&'static str),

    #[error("configuration error: {0}")]
    Config(String),

    /// The coordinator answered with a honeypot notice.
    #[error("flagged by coordinator: {0}")]
    Flagged(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    /// Only a broken transport ends a session; every other error is local to one frame.
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// Short label safe to log for rejected frames.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Protocol(_) => "protocol",
            Error::Authentication => "authentication",
            Error::ClassificationUnavailable(_) => "classification_unavailable",
            Error::Transport(_) => "transport",
            Error::StoreContention(_) => "store_contention",
            Error::Config(_) => "config",
            Error::Flagged(_) => "flagged",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Protocol(e.to_string())
    }
}
