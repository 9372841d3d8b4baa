//! Outgoing message model.

use crate::address::Address;
use crate::content_type::ContentType;
use crate::encoding::{is_us_ascii, is_us_ascii_charset};
use crate::error::{Error, Result};
use crate::header::Headers;
use std::fmt;
use std::path::{Path, PathBuf};

/// Charset a new message starts with.
pub const DEFAULT_CHARSET: &str = "UTF-8";

/// Transfer encodings the renderer emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit ASCII, sent as is.
    SevenBit,
    /// Base64 encoding.
    Base64,
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::Base64 => write!(f, "base64"),
        }
    }
}

/// One rendition of the message text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextPart {
    body: Vec<u8>,
    sub_type: String,
    charset: String,
}

impl TextPart {
    /// Raw body bytes in [`Self::charset`].
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Text subtype, e.g. `plain` or `html`.
    #[must_use]
    pub fn sub_type(&self) -> &str {
        &self.sub_type
    }

    /// Charset label of the body.
    #[must_use]
    pub fn charset(&self) -> &str {
        &self.charset
    }

    /// `text/<subtype>; charset=<charset>`.
    #[must_use]
    pub fn content_type(&self) -> ContentType {
        ContentType::text(self.sub_type.clone(), self.charset.clone())
    }

    /// Base64 unless both the charset and the bytes are US-ASCII.
    #[must_use]
    pub fn transfer_encoding(&self) -> TransferEncoding {
        if is_us_ascii_charset(&self.charset) && is_us_ascii(&self.body) {
            TransferEncoding::SevenBit
        } else {
            TransferEncoding::Base64
        }
    }
}

/// A file sent with `Content-Disposition: attachment`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedFile {
    path: PathBuf,
    content_type: Option<ContentType>,
}

impl AttachedFile {
    /// Path on disk.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Explicit content type, falling back to a guess from the extension.
    #[must_use]
    pub fn content_type(&self) -> ContentType {
        self.content_type
            .clone()
            .unwrap_or_else(|| ContentType::for_path(&self.path))
    }
}

/// A file sent inline, referenced from HTML as `cid:<content_id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedFile {
    path: PathBuf,
    content_type: Option<ContentType>,
    content_id: String,
}

impl EmbeddedFile {
    /// Path on disk.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Explicit content type, falling back to a guess from the extension.
    #[must_use]
    pub fn content_type(&self) -> ContentType {
        self.content_type
            .clone()
            .unwrap_or_else(|| ContentType::for_path(&self.path))
    }

    /// Content-ID without angle brackets.
    #[must_use]
    pub fn content_id(&self) -> &str {
        &self.content_id
    }
}

/// Top-level shape a message renders to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Structure {
    /// A single text part, no multipart wrapper.
    SingleText,
    /// Several text parts as `multipart/alternative`.
    Alternative,
    /// Text plus embedded files as `multipart/related`.
    Related,
    /// Attached files present; `multipart/mixed` at the top.
    Mixed,
}

/// An email under construction.
///
/// ```ignore
/// let mut msg = Message::new();
/// msg.set_from("Ann <ann@example.com>")?;
/// msg.add_to("bob@example.com")?;
/// msg.set_subject("Report");
/// msg.add_text_part("See attached.", "plain", None)?;
/// msg.attach_file("report.pdf", None)?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    from: Option<Address>,
    reply_to: Option<Address>,
    to: Vec<Address>,
    cc: Vec<Address>,
    bcc: Vec<Address>,
    subject: Option<String>,
    charset: String,
    headers: Headers,
    text_parts: Vec<TextPart>,
    attachments: Vec<AttachedFile>,
    embedded: Vec<EmbeddedFile>,
    last_content_id: u32,
}

impl Default for Message {
    fn default() -> Self {
        Self::new()
    }
}

impl Message {
    /// Creates an empty message using [`DEFAULT_CHARSET`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            from: None,
            reply_to: None,
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: None,
            charset: DEFAULT_CHARSET.to_string(),
            headers: Headers::new(),
            text_parts: Vec::new(),
            attachments: Vec::new(),
            embedded: Vec::new(),
            last_content_id: 0,
        }
    }

    /// Sets the sender from a `Name <email>` string.
    ///
    /// # Errors
    ///
    /// Returns an error if the address does not parse.
    pub fn set_from(&mut self, from: &str) -> Result<()> {
        self.from = Some(Address::parse(from)?);
        Ok(())
    }

    /// Sets the Reply-To address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address does not parse.
    pub fn set_reply_to(&mut self, reply_to: &str) -> Result<()> {
        self.reply_to = Some(Address::parse(reply_to)?);
        Ok(())
    }

    /// Appends a To recipient.
    ///
    /// # Errors
    ///
    /// Returns an error if the address does not parse.
    pub fn add_to(&mut self, to: &str) -> Result<()> {
        self.to.push(Address::parse(to)?);
        Ok(())
    }

    /// Appends a Cc recipient.
    ///
    /// # Errors
    ///
    /// Returns an error if the address does not parse.
    pub fn add_cc(&mut self, cc: &str) -> Result<()> {
        self.cc.push(Address::parse(cc)?);
        Ok(())
    }

    /// Appends a Bcc recipient.
    ///
    /// # Errors
    ///
    /// Returns an error if the address does not parse.
    pub fn add_bcc(&mut self, bcc: &str) -> Result<()> {
        self.bcc.push(Address::parse(bcc)?);
        Ok(())
    }

    /// Removes all To recipients.
    pub fn clear_to(&mut self) {
        self.to.clear();
    }

    /// Removes all Cc recipients.
    pub fn clear_cc(&mut self) {
        self.cc.clear();
    }

    /// Removes all Bcc recipients.
    pub fn clear_bcc(&mut self) {
        self.bcc.clear();
    }

    /// Sets the subject.
    ///
    /// # Errors
    ///
    /// Returns an error if the subject contains CR or LF.
    pub fn set_subject(&mut self, subject: impl Into<String>) -> Result<()> {
        let subject = subject.into();
        if subject.contains(['\r', '\n']) {
            return Err(Error::InvalidHeader("line break in Subject".into()));
        }
        self.subject = Some(subject);
        Ok(())
    }

    /// Sets the default charset for text parts added afterwards.
    ///
    /// Header encoded-words stay UTF-8, since header values are strings.
    ///
    /// # Errors
    ///
    /// Returns an error if `charset` is empty or not a token.
    pub fn set_charset(&mut self, charset: impl Into<String>) -> Result<()> {
        let charset = charset.into();
        validate_charset(&charset)?;
        self.charset = charset;
        Ok(())
    }

    /// Appends a custom header.
    ///
    /// # Errors
    ///
    /// Returns an error if the name or value is malformed.
    pub fn add_header(&mut self, name: &str, value: &str) -> Result<()> {
        self.headers.add(name, value)
    }

    /// Sets the `X-Mailer` header, replacing an earlier one.
    ///
    /// # Errors
    ///
    /// Returns an error if the value contains CR or LF.
    pub fn set_x_mailer(&mut self, mailer: &str) -> Result<()> {
        self.headers.set("X-Mailer", mailer)
    }

    /// Removes every custom header.
    pub fn clear_headers(&mut self) {
        self.headers.clear();
    }

    /// Appends a text part.
    ///
    /// `sub_type` may be given bare (`html`) or qualified (`text/html`).
    /// The charset defaults to the message charset.
    ///
    /// # Errors
    ///
    /// Returns an error if the subtype or charset is malformed.
    pub fn add_text_part(
        &mut self,
        body: impl Into<Vec<u8>>,
        sub_type: &str,
        charset: Option<&str>,
    ) -> Result<()> {
        let sub_type = sub_type.strip_prefix("text/").unwrap_or(sub_type);
        let content_type = ContentType::parse(&format!("text/{sub_type}"))?;
        let charset = charset.unwrap_or(&self.charset).to_string();
        validate_charset(&charset)?;
        self.text_parts.push(TextPart {
            body: body.into(),
            sub_type: content_type.sub_type,
            charset,
        });
        Ok(())
    }

    /// Appends a UTF-8 text part.
    ///
    /// # Errors
    ///
    /// Returns an error if the subtype is malformed.
    pub fn add_utf8_text_part(&mut self, body: &str, sub_type: &str) -> Result<()> {
        self.add_text_part(body, sub_type, Some(DEFAULT_CHARSET))
    }

    /// Appends a text part in the message charset.
    ///
    /// # Errors
    ///
    /// Returns an error if the subtype is malformed.
    pub fn add_default_text_part(&mut self, body: impl Into<Vec<u8>>, sub_type: &str) -> Result<()> {
        self.add_text_part(body, sub_type, None)
    }

    /// Attaches a file. The file is read when the message is rendered.
    ///
    /// # Errors
    ///
    /// Returns an error if `content_type` is given and malformed.
    pub fn attach_file(&mut self, path: impl Into<PathBuf>, content_type: Option<&str>) -> Result<()> {
        self.attachments.push(AttachedFile {
            path: path.into(),
            content_type: content_type.map(ContentType::parse).transpose()?,
        });
        Ok(())
    }

    /// Embeds a file for inline use and returns its Content-ID.
    ///
    /// Ids are `file@1`, `file@2`, ... in call order.
    ///
    /// # Errors
    ///
    /// Returns an error if `content_type` is given and malformed.
    pub fn embed_file(&mut self, path: impl Into<PathBuf>, content_type: Option<&str>) -> Result<String> {
        let content_type = content_type.map(ContentType::parse).transpose()?;
        self.last_content_id += 1;
        let content_id = format!("file@{}", self.last_content_id);
        self.embedded.push(EmbeddedFile {
            path: path.into(),
            content_type,
            content_id: content_id.clone(),
        });
        Ok(content_id)
    }

    /// Removes all attached files.
    pub fn clear_attachments(&mut self) {
        self.attachments.clear();
    }

    /// Removes all embedded files. The Content-ID counter keeps counting.
    pub fn clear_embedded(&mut self) {
        self.embedded.clear();
    }

    /// Sender.
    #[must_use]
    pub const fn from(&self) -> Option<&Address> {
        self.from.as_ref()
    }

    /// Reply-To address.
    #[must_use]
    pub const fn reply_to(&self) -> Option<&Address> {
        self.reply_to.as_ref()
    }

    /// To recipients.
    #[must_use]
    pub fn to(&self) -> &[Address] {
        &self.to
    }

    /// Cc recipients.
    #[must_use]
    pub fn cc(&self) -> &[Address] {
        &self.cc
    }

    /// Bcc recipients.
    #[must_use]
    pub fn bcc(&self) -> &[Address] {
        &self.bcc
    }

    /// Envelope recipients: To, then Cc, then Bcc.
    pub fn recipients(&self) -> impl Iterator<Item = &Address> {
        self.to.iter().chain(&self.cc).chain(&self.bcc)
    }

    /// Subject.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// Default charset.
    #[must_use]
    pub fn charset(&self) -> &str {
        &self.charset
    }

    /// Custom headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Text parts in order.
    #[must_use]
    pub fn text_parts(&self) -> &[TextPart] {
        &self.text_parts
    }

    /// Attached files in order.
    #[must_use]
    pub fn attachments(&self) -> &[AttachedFile] {
        &self.attachments
    }

    /// Embedded files in order.
    #[must_use]
    pub fn embedded(&self) -> &[EmbeddedFile] {
        &self.embedded
    }

    /// The shape the body will render to.
    #[must_use]
    pub fn structure(&self) -> Structure {
        if !self.attachments.is_empty() {
            Structure::Mixed
        } else if !self.embedded.is_empty() {
            Structure::Related
        } else if self.text_parts.len() > 1 {
            Structure::Alternative
        } else {
            Structure::SingleText
        }
    }

    /// Checks that the message can be sent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Incomplete`] when the sender, every To recipient, or
    /// all content is missing, or when embedded files have no text part to
    /// reference them.
    pub fn validate(&self) -> Result<()> {
        if self.to.is_empty() {
            return Err(Error::Incomplete("No To: address(es)!".into()));
        }
        if self.from.is_none() {
            return Err(Error::Incomplete("No From: address!".into()));
        }
        if self.text_parts.is_empty() {
            if !self.embedded.is_empty() {
                return Err(Error::Incomplete("Embedded files need a text part!".into()));
            }
            if self.attachments.is_empty() {
                return Err(Error::Incomplete("No message body!".into()));
            }
        }
        Ok(())
    }
}

fn validate_charset(charset: &str) -> Result<()> {
    let valid = !charset.is_empty()
        && charset
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"-_.:+".contains(&b));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidContentType(format!("bad charset {charset:?}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    fn addressed() -> Message {
        let mut msg = Message::new();
        msg.set_from("Ann <ann@example.com>").unwrap();
        msg.add_to("bob@example.com").unwrap();
        msg
    }

    #[test]
    fn test_new_message_defaults() {
        let msg = Message::new();
        assert_eq!(msg.charset(), DEFAULT_CHARSET);
        assert!(msg.from().is_none());
        assert!(msg.text_parts().is_empty());
    }

    #[test]
    fn test_text_part_charset_defaults_to_message() {
        let mut msg = Message::new();
        msg.set_charset("ISO-8859-1").unwrap();
        msg.add_default_text_part(b"caf\xe9".to_vec(), "plain").unwrap();
        msg.add_utf8_text_part("<p>café</p>", "text/html").unwrap();

        assert_eq!(msg.text_parts()[0].charset(), "ISO-8859-1");
        assert_eq!(msg.text_parts()[1].charset(), "UTF-8");
        assert_eq!(msg.text_parts()[1].sub_type(), "html");
    }

    #[test]
    fn test_transfer_encoding_choice() {
        let mut msg = Message::new();
        msg.add_text_part("hello", "plain", Some("us-ascii")).unwrap();
        msg.add_text_part("hello", "plain", Some("UTF-8")).unwrap();
        msg.add_text_part("héllo", "plain", Some("US-ASCII")).unwrap();

        let encodings: Vec<_> = msg.text_parts().iter().map(TextPart::transfer_encoding).collect();
        assert_eq!(
            encodings,
            [TransferEncoding::SevenBit, TransferEncoding::Base64, TransferEncoding::Base64]
        );
    }

    #[test]
    fn test_content_ids_count_embeds_only() {
        let mut msg = Message::new();
        msg.attach_file("a.pdf", None).unwrap();
        assert_eq!(msg.embed_file("logo.png", None).unwrap(), "file@1");
        msg.attach_file("b.pdf", None).unwrap();
        assert_eq!(msg.embed_file("photo.jpg", Some("image/jpeg")).unwrap(), "file@2");
        msg.clear_embedded();
        assert_eq!(msg.embed_file("again.gif", None).unwrap(), "file@3");
    }

    #[test]
    fn test_bad_content_type_rejected() {
        let mut msg = Message::new();
        assert!(msg.attach_file("a.bin", Some("nonsense")).is_err());
        assert!(msg.attachments().is_empty());
        assert!(msg.embed_file("a.png", Some("image")).is_err());
        assert_eq!(msg.embed_file("a.png", None).unwrap(), "file@1");
    }

    #[test]
    fn test_structure_decision() {
        let mut msg = addressed();
        msg.add_text_part("a", "plain", None).unwrap();
        assert_eq!(msg.structure(), Structure::SingleText);

        msg.add_text_part("<b>a</b>", "html", None).unwrap();
        assert_eq!(msg.structure(), Structure::Alternative);

        msg.embed_file("logo.png", None).unwrap();
        assert_eq!(msg.structure(), Structure::Related);

        msg.attach_file("a.pdf", None).unwrap();
        assert_eq!(msg.structure(), Structure::Mixed);
    }

    #[test]
    fn test_recipients_order() {
        let mut msg = addressed();
        msg.add_bcc("z@example.com").unwrap();
        msg.add_cc("c@example.com").unwrap();
        msg.add_to("t@example.com").unwrap();
        let emails: Vec<&str> = msg.recipients().map(Address::email).collect();
        assert_eq!(emails, ["bob@example.com", "t@example.com", "c@example.com", "z@example.com"]);
    }

    #[test]
    fn test_validate() {
        let mut msg = Message::new();
        msg.add_text_part("x", "plain", None).unwrap();
        assert!(matches!(msg.validate(), Err(Error::Incomplete(m)) if m.contains("To")));

        msg.add_to("bob@example.com").unwrap();
        assert!(matches!(msg.validate(), Err(Error::Incomplete(m)) if m.contains("From")));

        msg.set_from("ann@example.com").unwrap();
        assert!(msg.validate().is_ok());
    }

    #[test]
    fn test_validate_content_rules() {
        let mut msg = addressed();
        assert!(msg.validate().is_err());

        msg.embed_file("logo.png", None).unwrap();
        assert!(msg.validate().is_err());

        msg.clear_embedded();
        msg.attach_file("a.pdf", None).unwrap();
        assert!(msg.validate().is_ok());
    }

    #[test]
    fn test_x_mailer_replaces() {
        let mut msg = Message::new();
        msg.set_x_mailer("one").unwrap();
        msg.set_x_mailer("two").unwrap();
        assert_eq!(msg.headers().len(), 1);
        assert_eq!(msg.headers().get("X-Mailer"), Some("two"));
    }

    #[test]
    fn test_subject_rejects_line_breaks() {
        let mut msg = Message::new();
        assert!(msg.set_subject("hi\r\nBcc: x@y").is_err());
        assert!(msg.set_charset("UTF 8").is_err());
    }
}
