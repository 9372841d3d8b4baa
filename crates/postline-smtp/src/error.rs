//! Error types for SMTP operations.

use std::io;
use std::time::Duration;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error on an established connection, including EOF.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A single read or write did not finish in time.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Resolving or connecting to the server failed.
    #[error("Cannot connect to {host}:{port}: {source}")]
    Connect {
        /// Host as configured.
        host: String,
        /// Port as configured.
        port: u16,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },

    /// TLS error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// TLS handshake failed below the rustls layer.
    #[error("TLS handshake failed: {0}")]
    TlsHandshake(#[source] io::Error),

    /// Host is not usable as a TLS server name.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// The server completed the handshake without a certificate.
    #[error("TLS peer presented no certificate")]
    NoPeerCertificate,

    /// Server answered with an unexpected reply code.
    #[error("{command} failed: {reply}")]
    Rejected {
        /// Command verb that was rejected (e.g., `RCPT`).
        command: String,
        /// Reply code (e.g., 550).
        code: u16,
        /// Literal reply text, code included.
        reply: String,
    },

    /// Malformed reply from the server.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid envelope address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Invalid state for operation.
    #[error("Invalid state for operation: {0}")]
    InvalidState(String),
}

impl Error {
    /// Creates a rejection error from a command verb, code and reply text.
    #[must_use]
    pub fn rejected(command: impl Into<String>, code: u16, reply: impl Into<String>) -> Self {
        Self::Rejected {
            command: command.into(),
            code,
            reply: reply.into(),
        }
    }

    /// Returns the server reply code, if the server rejected a command.
    #[must_use]
    pub const fn reply_code(&self) -> Option<u16> {
        match self {
            Self::Rejected { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Rejected { code, .. } if *code >= 500 && *code < 600)
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Rejected { code, .. } if *code >= 400 && *code < 500)
    }

    /// Returns true for failures of the TLS layer.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(
            self,
            Self::Tls(_) | Self::TlsHandshake(_) | Self::InvalidDnsName(_) | Self::NoPeerCertificate
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_classification() {
        let err = Error::rejected("RCPT", 550, "550 5.1.1 No such user");
        assert!(err.is_permanent());
        assert!(!err.is_transient());
        assert_eq!(err.reply_code(), Some(550));
        assert_eq!(err.to_string(), "RCPT failed: 550 5.1.1 No such user");

        let err = Error::rejected("MAIL", 451, "451 try later");
        assert!(err.is_transient());
    }

    #[test]
    fn test_timeout_display() {
        let err = Error::Timeout(Duration::from_secs(1));
        assert_eq!(err.to_string(), "Operation timed out after 1s");
        assert_eq!(err.reply_code(), None);
    }
}
