//! Header addresses (`Display Name <email>`).

use crate::encoding::{encode_rfc2047, is_us_ascii};
use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Characters that force a display name into a quoted string.
const SPECIALS: &[char] = &['(', ')', '<', '>', '[', ']', ':', ';', '@', '\\', ',', '.', '"'];

/// A mailbox as written in a From, Reply-To, To, Cc or Bcc header.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Address {
    display_name: Option<String>,
    email: String,
}

impl Address {
    /// Creates an address with no display name.
    ///
    /// # Errors
    ///
    /// Returns an error if `email` is empty or contains control characters.
    pub fn new(email: impl Into<String>) -> Result<Self> {
        let email = email.into();
        validate_email(&email)?;
        Ok(Self {
            display_name: None,
            email,
        })
    }

    /// Creates an address with a display name.
    ///
    /// # Errors
    ///
    /// Returns an error if `email` is invalid or `name` contains CR or LF.
    pub fn with_name(name: impl Into<String>, email: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.contains(['\r', '\n']) {
            return Err(Error::InvalidAddress(format!("line break in name {name:?}")));
        }
        let mut address = Self::new(email)?;
        address.display_name = Some(name).filter(|n| !n.is_empty());
        Ok(address)
    }

    /// Parses a free-form `Display Name <email>` string.
    ///
    /// If the input has a `<` after its first character, the text before it
    /// is the display name and the text up to the next `>` is the email.
    /// Otherwise the whole input is the email. Each half is trimmed and has
    /// one layer of surrounding quotes or angle brackets removed.
    ///
    /// # Errors
    ///
    /// Returns an error if a `<` has no matching `>` or the email is empty.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.find('<') {
            Some(open) if open > 0 => {
                let (name, rest) = (&raw[..open], &raw[open + 1..]);
                let close = rest
                    .find('>')
                    .ok_or_else(|| Error::InvalidAddress(format!("missing '>' in {raw:?}")))?;
                let name = strip_one(chomp(name), '"', '"');
                let email = clean_email(&rest[..close]);
                Self::with_name(name, email)
            }
            _ => Self::new(clean_email(raw)),
        }
    }

    /// Returns the display name, if any.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Returns the bare email.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Renders the address for a message header.
    ///
    /// A non-ASCII display name becomes one or more folded encoded-words in
    /// `charset`; an ASCII name with specials is quoted.
    #[must_use]
    pub fn to_header(&self, charset: &str) -> String {
        match &self.display_name {
            None => self.email.clone(),
            Some(name) if !is_us_ascii(name.as_bytes()) => {
                format!("{} <{}>", encode_rfc2047(name, charset), self.email)
            }
            Some(name) if name.contains(SPECIALS) => {
                let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
                format!("\"{escaped}\" <{}>", self.email)
            }
            Some(name) => format!("{name} <{}>", self.email),
        }
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.display_name {
            Some(name) => write!(f, "{name} <{}>", self.email),
            None => f.write_str(&self.email),
        }
    }
}

fn validate_email(email: &str) -> Result<()> {
    if email.is_empty() {
        return Err(Error::InvalidAddress("empty email".into()));
    }
    if email.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(Error::InvalidAddress(format!("invalid email {email:?}")));
    }
    Ok(())
}

fn chomp(s: &str) -> &str {
    s.trim_matches(|c: char| c.is_ascii_whitespace())
}

/// Removes one leading `open` and one trailing `close`, independently.
fn strip_one(s: &str, open: char, close: char) -> &str {
    let s = s.strip_prefix(open).unwrap_or(s);
    s.strip_suffix(close).unwrap_or(s)
}

fn clean_email(s: &str) -> &str {
    let s = strip_one(chomp(s), '"', '"');
    chomp(strip_one(s, '<', '>'))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_name_and_email() {
        let addr = Address::parse("John Doe <john@test.com>").unwrap();
        assert_eq!(addr.display_name(), Some("John Doe"));
        assert_eq!(addr.email(), "john@test.com");
    }

    #[test]
    fn test_parse_bare_email() {
        let addr = Address::parse("john@test.com").unwrap();
        assert_eq!(addr.display_name(), None);
        assert_eq!(addr.email(), "john@test.com");
    }

    #[test]
    fn test_parse_missing_close_fails() {
        assert!(Address::parse("John Doe <john@test.com").is_err());
    }

    #[test]
    fn test_parse_quoted_name() {
        let addr = Address::parse("\"Doe, John\" <john@test.com>\r\n").unwrap();
        assert_eq!(addr.display_name(), Some("Doe, John"));
        assert_eq!(addr.email(), "john@test.com");
    }

    #[test]
    fn test_parse_leading_bracket_is_email_only() {
        let addr = Address::parse("<john@test.com>").unwrap();
        assert_eq!(addr.display_name(), None);
        assert_eq!(addr.email(), "john@test.com");
    }

    #[test]
    fn test_parse_empty_email_fails() {
        assert!(Address::parse("John <>").is_err());
        assert!(Address::parse("").is_err());
        assert!(Address::parse("   \r\n").is_err());
    }

    #[test]
    fn test_empty_quoted_name_is_none() {
        let addr = Address::parse("\"\" <a@b.c>").unwrap();
        assert_eq!(addr.display_name(), None);
    }

    #[test]
    fn test_to_header_forms() {
        let plain = Address::new("a@b.c").unwrap();
        assert_eq!(plain.to_header("UTF-8"), "a@b.c");

        let named = Address::with_name("Ann Lee", "a@b.c").unwrap();
        assert_eq!(named.to_header("UTF-8"), "Ann Lee <a@b.c>");

        let special = Address::with_name("Lee, Ann", "a@b.c").unwrap();
        assert_eq!(special.to_header("UTF-8"), "\"Lee, Ann\" <a@b.c>");

        let unicode = Address::with_name("Jürgen", "j@b.c").unwrap();
        assert_eq!(unicode.to_header("UTF-8"), "=?UTF-8?B?SsO8cmdlbg==?= <j@b.c>");
    }

    #[test]
    fn test_long_unicode_name_is_split_into_words() {
        let name = "Константин Константинопольский-Первый";
        assert!(name.len() > 45);
        let addr = Address::with_name(name, "k@b.c").unwrap();
        let header = addr.to_header("UTF-8");
        assert!(header.ends_with(" <k@b.c>"));

        let words: Vec<&str> = header
            .trim_end_matches(" <k@b.c>")
            .split("\r\n ")
            .collect();
        assert!(words.len() > 1);
        let mut decoded = Vec::new();
        for word in words {
            assert!(word.len() <= 75);
            let b64 = word
                .strip_prefix("=?UTF-8?B?")
                .and_then(|w| w.strip_suffix("?="))
                .unwrap();
            decoded.extend(crate::encoding::decode_base64(b64).unwrap());
        }
        assert_eq!(String::from_utf8(decoded).unwrap(), name);
    }

    #[test]
    fn test_name_with_line_break_rejected() {
        assert!(Address::with_name("Evil\r\nBcc: x@y", "a@b.c").is_err());
    }
}
