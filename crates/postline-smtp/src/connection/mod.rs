//! SMTP connection management with type-state pattern.

mod client;
mod stream;
#[cfg(test)]
mod testing;
mod tls;
mod transport;

pub use client::{
    Authenticated, Client, Connected, Data, Greeted, MAX_REPLY_LINE, MailTransaction,
    RecipientAdded, SmtpConnection, TransactionError, TransactionResult,
};
pub use stream::SmtpStream;
pub use tls::{TlsVerification, create_tls_connector};
pub use transport::{READ_BUFFER_LEN, Transport};

use crate::types::{AuthMechanism, Extension, Reply};
use std::collections::HashSet;

/// Server capabilities from the greeting and EHLO response.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Full greeting text, code removed.
    pub greeting: String,
    /// Server hostname from greeting.
    pub hostname: String,
    /// Supported extensions.
    pub extensions: HashSet<Extension>,
}

impl ServerInfo {
    /// Checks if the server supports an extension.
    #[must_use]
    pub fn supports(&self, ext: &Extension) -> bool {
        self.extensions.contains(ext)
    }

    /// Checks if STARTTLS is supported.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.supports(&Extension::StartTls)
    }

    /// Returns the maximum message size, if advertised.
    #[must_use]
    pub fn max_message_size(&self) -> Option<usize> {
        self.extensions.iter().find_map(|ext| match ext {
            Extension::Size(size) => *size,
            _ => None,
        })
    }

    /// Returns supported authentication mechanisms.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Vec<AuthMechanism> {
        self.extensions
            .iter()
            .find_map(|ext| match ext {
                Extension::Auth(mechanisms) => Some(mechanisms.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// Replaces the extensions with those of an EHLO reply.
    ///
    /// The first reply line is the server's greeting, not an extension.
    pub(crate) fn set_extensions(&mut self, reply: &Reply) {
        self.extensions = reply
            .message
            .iter()
            .skip(1)
            .map(|line| Extension::parse(line))
            .collect();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use crate::types::ReplyCode;

    #[test]
    fn test_set_extensions_skips_greeting_line() {
        let reply = Reply::new(
            ReplyCode::OK,
            vec!["mx.example.com".into(), "8BITMIME".into(), "PIPELINING".into()],
        );
        let mut info = ServerInfo::default();
        info.set_extensions(&reply);
        assert_eq!(info.extensions.len(), 2);
        assert!(info.supports(&Extension::EightBitMime));
        assert!(info.supports(&Extension::Pipelining));
        assert!(!info.supports_starttls());
        assert!(info.auth_mechanisms().is_empty());
        assert_eq!(info.max_message_size(), None);
    }
}
