//! Error types

use thiserror::Error;

/// Failure retrieving a remote asset.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("failed to read response body: {0}")]
    Body(String),
    #[error("failed to create HTTP client: {0}")]
    Client(String),
}

/// Per-URL localization failure. None of these abort a file or a run.
#[derive(Debug, Error)]
pub enum LocalizeError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("file type could not be determined, binary data may be malformed")]
    UnknownType,
    #[error("transform failed: {0}")]
    Transform(String),
    #[error("write failed: {0}")]
    Write(#[from] std::io::Error),
    #[error("no occurrence of the reference could be rewritten")]
    NotRewritten,
    #[error("pipeline is shutting down")]
    Shutdown,
}

impl LocalizeError {
    /// Short label used in the audit failure log and the run summary.
    pub fn kind(&self) -> &'static str {
        match self {
            LocalizeError::Fetch(_) => "fetch",
            LocalizeError::UnknownType => "unknown_type",
            LocalizeError::Transform(_) => "transform",
            LocalizeError::Write(_) => "write",
            LocalizeError::NotRewritten => "rewrite",
            LocalizeError::Shutdown => "shutdown",
        }
    }
}
