//! Custom message headers.

use crate::encoding::encode_rfc2047;
use crate::error::{Error, Result};

/// A single `Name: value` header.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Header {
    name: String,
    value: String,
}

impl Header {
    /// Creates a header after validating both halves.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty, contains `:`, whitespace or
    /// control characters, or if the value contains CR or LF.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let value = value.into();
        if name.is_empty() || !name.bytes().all(|b| b.is_ascii_graphic() && b != b':') {
            return Err(Error::InvalidHeader(format!("bad header name {name:?}")));
        }
        if value.contains(['\r', '\n']) {
            return Err(Error::InvalidHeader(format!("line break in {name} value")));
        }
        Ok(Self { name, value })
    }

    /// Header name as given.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unencoded header value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Renders `Name: value\r\n`, encoding a non-ASCII value.
    #[must_use]
    pub fn render(&self, charset: &str) -> String {
        format!("{}: {}\r\n", self.name, encode_rfc2047(&self.value, charset))
    }
}

/// Ordered collection of custom headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    headers: Vec<Header>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a header.
    ///
    /// # Errors
    ///
    /// See [`Header::new`].
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<()> {
        self.headers.push(Header::new(name, value)?);
        Ok(())
    }

    /// Replaces every header named `name` with a single one, keeping the
    /// position of the first occurrence.
    ///
    /// # Errors
    ///
    /// See [`Header::new`].
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let header = Header::new(name, value)?;
        match self.position(header.name()) {
            Some(index) => {
                self.remove_after(index, header.name());
                self.headers[index] = header;
            }
            None => self.headers.push(header),
        }
        Ok(())
    }

    /// Gets the first value for a header, case-insensitively.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|i| self.headers[i].value())
    }

    /// Removes all values for a header.
    pub fn remove(&mut self, name: &str) {
        self.headers.retain(|h| !h.name.eq_ignore_ascii_case(name));
    }

    /// Removes every header.
    pub fn clear(&mut self) {
        self.headers.clear();
    }

    /// Number of headers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// True when there are no headers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Returns an iterator over headers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.headers.iter()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| h.name.eq_ignore_ascii_case(name))
    }

    fn remove_after(&mut self, index: usize, name: &str) {
        let mut i = 0;
        self.headers.retain(|h| {
            let keep = i <= index || !h.name.eq_ignore_ascii_case(name);
            i += 1;
            keep
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_keep_insertion_order() {
        let mut headers = Headers::new();
        headers.add("X-B", "2").unwrap();
        headers.add("X-A", "1").unwrap();
        let names: Vec<&str> = headers.iter().map(Header::name).collect();
        assert_eq!(names, ["X-B", "X-A"]);
    }

    #[test]
    fn test_set_replaces_in_place() {
        let mut headers = Headers::new();
        headers.add("X-Mailer", "old").unwrap();
        headers.add("X-Other", "o").unwrap();
        headers.add("x-mailer", "older").unwrap();
        headers.set("X-Mailer", "new").unwrap();

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("x-mailer"), Some("new"));
        assert_eq!(headers.iter().next().unwrap().name(), "X-Mailer");
    }

    #[test]
    fn test_rejects_injection() {
        let mut headers = Headers::new();
        assert!(headers.add("X-Evil", "a\r\nBcc: victim@example.com").is_err());
        assert!(headers.add("Bad Name", "v").is_err());
        assert!(headers.add("Bad:Name", "v").is_err());
        assert!(headers.add("", "v").is_err());
        assert!(headers.is_empty());
    }

    #[test]
    fn test_render_encodes_non_ascii() {
        let header = Header::new("X-Note", "café").unwrap();
        assert_eq!(header.render("UTF-8"), "X-Note: =?UTF-8?B?Y2Fmw6k=?=\r\n");
        let header = Header::new("X-Note", "plain").unwrap();
        assert_eq!(header.render("UTF-8"), "X-Note: plain\r\n");
    }

    #[test]
    fn test_remove_and_clear() {
        let mut headers = Headers::new();
        headers.add("X-A", "1").unwrap();
        headers.add("X-B", "2").unwrap();
        headers.remove("x-a");
        assert_eq!(headers.get("X-A"), None);
        headers.clear();
        assert!(headers.is_empty());
    }
}
