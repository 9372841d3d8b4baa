//! Error types for mail sessions.

use thiserror::Error;

/// Errors that can occur while opening a session or sending a message.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration or message incomplete before any I/O.
    #[error("{0}")]
    Config(String),

    /// SMTP operation failed.
    #[error(transparent)]
    Smtp(#[from] postline_smtp::Error),

    /// Message assembly failed.
    #[error(transparent)]
    Mime(#[from] postline_mime::Error),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Host resolution or TCP connect failed.
    Connection,
    /// TLS handshake or certificate check failed.
    Tls,
    /// The connection broke or timed out after it was established.
    Io,
    /// The server replied with an unexpected code or a malformed reply.
    Protocol,
    /// Something required was missing before the session started.
    Config,
    /// An attached or embedded file could not be read.
    File,
}

impl Error {
    /// Classifies the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        use postline_smtp::Error as Smtp;

        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Smtp(err) => match err {
                Smtp::Connect { .. } => ErrorKind::Connection,
                Smtp::Tls(_)
                | Smtp::TlsHandshake(_)
                | Smtp::InvalidDnsName(_)
                | Smtp::NoPeerCertificate => ErrorKind::Tls,
                Smtp::Io(_) | Smtp::Timeout(_) | Smtp::InvalidState(_) => ErrorKind::Io,
                Smtp::Rejected { .. } | Smtp::Protocol(_) => ErrorKind::Protocol,
                Smtp::InvalidAddress(_) => ErrorKind::Config,
            },
            Self::Mime(err) => match err {
                postline_mime::Error::File { .. } => ErrorKind::File,
                _ => ErrorKind::Config,
            },
        }
    }

    /// Returns the server reply code, if the server rejected a command.
    #[must_use]
    pub const fn reply_code(&self) -> Option<u16> {
        match self {
            Self::Smtp(err) => err.reply_code(),
            _ => None,
        }
    }
}
