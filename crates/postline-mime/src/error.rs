//! Error types for message construction and assembly.

use std::io;
use std::path::PathBuf;

/// Result type alias for MIME operations.
pub type Result<T> = std::result::Result<T, Error>;

/// MIME error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Address string could not be parsed.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Header name or value rejected.
    #[error("Invalid MIME header: {0}")]
    InvalidHeader(String),

    /// Invalid content type.
    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    /// Base64 decode error.
    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// The message lacks something required to send it.
    #[error("{0}")]
    Incomplete(String),

    /// An attached or embedded file could not be read.
    #[error("{}: {source}", path.display())]
    File {
        /// Path as supplied by the caller.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub(crate) fn file(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::File {
            path: path.into(),
            source,
        }
    }
}
