//! MIME content type handling.

use crate::error::{Error, Result};
use std::fmt;
use std::path::Path;

/// Fallback for files whose extension is unknown.
pub const DEFAULT_FILE_TYPE: &str = "application/octet-stream";

/// MIME content type with ordered parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Main type (e.g., "text", "image", "multipart").
    pub main_type: String,
    /// Subtype (e.g., "plain", "html", "jpeg").
    pub sub_type: String,
    /// Parameters in rendering order (e.g., charset, boundary, name).
    pub parameters: Vec<(String, String)>,
}

impl ContentType {
    /// Creates a new content type.
    #[must_use]
    pub fn new(main_type: impl Into<String>, sub_type: impl Into<String>) -> Self {
        Self {
            main_type: main_type.into(),
            sub_type: sub_type.into(),
            parameters: Vec::new(),
        }
    }

    /// Creates a `text/<subtype>; charset=<charset>` content type.
    #[must_use]
    pub fn text(sub_type: impl Into<String>, charset: impl Into<String>) -> Self {
        Self::new("text", sub_type).with_parameter("charset", charset)
    }

    /// Creates a multipart/mixed content type with boundary.
    #[must_use]
    pub fn multipart_mixed(boundary: impl Into<String>) -> Self {
        Self::new("multipart", "mixed").with_parameter("boundary", boundary)
    }

    /// Creates a multipart/alternative content type with boundary.
    #[must_use]
    pub fn multipart_alternative(boundary: impl Into<String>) -> Self {
        Self::new("multipart", "alternative").with_parameter("boundary", boundary)
    }

    /// Creates a multipart/related content type with boundary.
    #[must_use]
    pub fn multipart_related(boundary: impl Into<String>) -> Self {
        Self::new("multipart", "related").with_parameter("boundary", boundary)
    }

    /// Guesses the content type of a file from its extension.
    #[must_use]
    pub fn for_path(path: &Path) -> Self {
        let guessed = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or(DEFAULT_FILE_TYPE);
        Self::parse(guessed).unwrap_or_else(|_| Self::new("application", "octet-stream"))
    }

    /// Sets a parameter, replacing any earlier value for the same key.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self
            .parameters
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&key))
        {
            Some((_, v)) => *v = value,
            None => self.parameters.push((key, value)),
        }
        self
    }

    /// Returns a parameter value by case-insensitive key.
    #[must_use]
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the charset parameter if present.
    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.parameter("charset")
    }

    /// Returns the boundary parameter if present.
    #[must_use]
    pub fn boundary(&self) -> Option<&str> {
        self.parameter("boundary")
    }

    /// Checks if this is a multipart content type.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("multipart")
    }

    /// Returns `type/subtype` without parameters.
    #[must_use]
    pub fn essence(&self) -> String {
        format!("{}/{}", self.main_type, self.sub_type)
    }

    /// Parses a content type string.
    ///
    /// Format: `type/subtype; param1=value1; param2=value2`
    ///
    /// # Errors
    ///
    /// Returns an error if the type or subtype is missing or holds
    /// characters not allowed in a token.
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = s.split(';');

        let type_str = parts.next().unwrap_or_default().trim();
        let (main_type, sub_type) = type_str
            .split_once('/')
            .ok_or_else(|| Error::InvalidContentType(format!("missing subtype in {s:?}")))?;
        let main_type = main_type.trim().to_lowercase();
        let sub_type = sub_type.trim().to_lowercase();
        if !is_token(&main_type) || !is_token(&sub_type) {
            return Err(Error::InvalidContentType(format!("malformed type {s:?}")));
        }

        let mut content_type = Self::new(main_type, sub_type);
        for param in parts {
            let param = param.trim();
            if let Some((key, value)) = param.split_once('=') {
                let key = key.trim().to_lowercase();
                if !is_token(&key) || value.contains(['\r', '\n']) {
                    return Err(Error::InvalidContentType(format!("malformed parameter {param:?}")));
                }
                content_type = content_type.with_parameter(key, value.trim().trim_matches('"'));
            }
        }

        Ok(content_type)
    }
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?=".contains(&b))
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let main = &self.main_type;
        let sub = &self.sub_type;
        write!(f, "{main}/{sub}")?;

        for (key, value) in &self.parameters {
            // Quote value if it contains special characters
            if value.is_empty()
                || value.contains(|c: char| c.is_whitespace() || "()<>@,;:\\\"/[]?=".contains(c))
            {
                write!(f, "; {key}=\"{value}\"")?;
            } else {
                write!(f, "; {key}={value}")?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_text_content_type() {
        let ct = ContentType::text("html", "ISO-8859-1");
        assert_eq!(ct.to_string(), "text/html; charset=ISO-8859-1");
    }

    #[test]
    fn test_boundary_is_quoted() {
        let ct = ContentType::multipart_related("=-abc");
        assert_eq!(ct.boundary(), Some("=-abc"));
        assert!(ct.is_multipart());
        assert_eq!(ct.to_string(), "multipart/related; boundary=\"=-abc\"");
    }

    #[test]
    fn test_parameters_keep_order() {
        let ct = ContentType::new("image", "png")
            .with_parameter("name", "a.png")
            .with_parameter("x-extra", "1")
            .with_parameter("NAME", "b.png");
        assert_eq!(ct.to_string(), "image/png; name=b.png; x-extra=1");
    }

    #[test]
    fn test_content_type_parse_quoted() {
        let ct = ContentType::parse("multipart/mixed; boundary=\"----=_Part_123\"").unwrap();
        assert_eq!(ct.essence(), "multipart/mixed");
        assert_eq!(ct.boundary(), Some("----=_Part_123"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ContentType::parse("image").is_err());
        assert!(ContentType::parse("image/").is_err());
        assert!(ContentType::parse("ima ge/png").is_err());
        assert!(ContentType::parse("image/png\r\nBcc: x").is_err());
    }

    #[test]
    fn test_for_path_guesses_and_falls_back() {
        assert_eq!(ContentType::for_path(Path::new("logo.png")).essence(), "image/png");
        assert_eq!(ContentType::for_path(Path::new("report.pdf")).essence(), "application/pdf");
        assert_eq!(ContentType::for_path(Path::new("blob.zzqx")).essence(), DEFAULT_FILE_TYPE);
        assert_eq!(ContentType::for_path(Path::new("noext")).essence(), DEFAULT_FILE_TYPE);
    }
}
