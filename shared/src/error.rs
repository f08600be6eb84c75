//! Errors returned synchronously by link operations
//!
//! Every variant maps to a stable code string so a dispatch layer can hand
//! `{code, message}` pairs to callers without matching on the enum itself.

use thiserror::Error;

/// Result alias for link operations
pub type Result<T> = std::result::Result<T, LinkError>;

/// Errors that link operations return to their caller
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("connect failed: {0}")]
    ConnectFailed(String),

    #[error("not connected")]
    NotConnected,

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("scan failed: {0}")]
    ScanFailed(String),

    #[error("link manager shut down")]
    ShutDown,
}

impl LinkError {
    /// Stable error code for the caller-facing layer
    pub fn code(&self) -> &'static str {
        match self {
            LinkError::InvalidArgument(_) => "ARG",
            LinkError::ConnectFailed(_) => "CONNECT_FAILED",
            // Writes only ever report IO or ARG
            LinkError::NotConnected | LinkError::Io(_) => "IO",
            LinkError::ScanFailed(_) => "SCAN_FAILED",
            LinkError::ShutDown => "SHUT_DOWN",
        }
    }
}
