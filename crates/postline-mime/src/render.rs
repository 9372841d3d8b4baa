//! Rendering a [`Message`] into a header block and a streamable body.
//!
//! The body is a list of [`Segment`]s: literal bytes produced up front, and
//! file parts that are base64-encoded from disk while they are written. A
//! caller streams the header block followed by every segment in order.
//!
//! Nesting, outermost first:
//!
//! ```text
//! multipart/mixed        (attached files present)
//! └─ multipart/related   (embedded files present)
//!    └─ multipart/alternative (more than one text part)
//!       └─ text/<subtype>
//! ```
//!
//! Levels that do not apply are skipped. Each multipart level gets its own
//! freshly generated boundary.

use crate::address::Address;
use crate::content_type::ContentType;
use crate::encoding::{Base64Stream, encode_base64_lines, encode_rfc2047, encode_word, is_us_ascii};
use crate::error::{Error, Result};
use crate::message::{DEFAULT_CHARSET, Message, Structure, TextPart, TransferEncoding};
use chrono::{DateTime, FixedOffset, Local};
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::File;

/// Random characters following the `=-` boundary prefix.
const BOUNDARY_RANDOM_LEN: usize = 30;

/// Charset of encoded-words in headers; header values are Rust strings.
const HEADER_CHARSET: &str = DEFAULT_CHARSET;

/// Generates a fresh multipart boundary: `=-` plus 30 random alphanumerics.
#[must_use]
pub fn generate_boundary() -> String {
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(BOUNDARY_RANDOM_LEN)
        .map(char::from)
        .collect();
    format!("=-{random}")
}

/// A file whose base64 body is produced while the message is streamed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    /// Path on disk.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens the file for streaming. The handle lives as long as the stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::File`] if the file cannot be opened.
    pub async fn open(&self) -> Result<Base64Stream<File>> {
        let file = File::open(&self.path)
            .await
            .map_err(|e| Error::file(&self.path, e))?;
        Ok(Base64Stream::new(file))
    }

    /// Wraps a read error from the stream returned by [`Self::open`].
    #[must_use]
    pub fn read_error(&self, source: io::Error) -> Error {
        Error::file(&self.path, source)
    }
}

/// One piece of a rendered body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Bytes ready to send.
    Bytes(Vec<u8>),
    /// A file to stream as base64 lines.
    File(FileSource),
}

/// A message ready to be written as SMTP DATA.
#[derive(Debug, Clone)]
pub struct Rendered {
    header: Vec<u8>,
    body: Vec<Segment>,
    boundaries: Vec<String>,
}

impl Rendered {
    /// Header block, ending with `Mime-Version: 1.0`. The body continues
    /// the header section with its own `Content-Type`.
    #[must_use]
    pub fn header(&self) -> &[u8] {
        &self.header
    }

    /// Body segments in send order.
    #[must_use]
    pub fn body(&self) -> &[Segment] {
        &self.body
    }

    /// Boundaries used, outermost first.
    #[must_use]
    pub fn boundaries(&self) -> &[String] {
        &self.boundaries
    }

    /// Materializes the whole message, reading every file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::File`] if a file cannot be read.
    pub async fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = self.header.clone();
        for segment in &self.body {
            match segment {
                Segment::Bytes(bytes) => out.extend_from_slice(bytes),
                Segment::File(source) => {
                    let mut stream = source.open().await?;
                    while let Some(chunk) = stream
                        .next_chunk()
                        .await
                        .map_err(|e| source.read_error(e))?
                    {
                        out.extend_from_slice(&chunk);
                    }
                }
            }
        }
        Ok(out)
    }
}

#[derive(Default)]
struct BodyBuilder {
    segments: Vec<Segment>,
    pending: Vec<u8>,
    boundaries: Vec<String>,
}

impl BodyBuilder {
    fn push(&mut self, s: &str) {
        self.pending.extend_from_slice(s.as_bytes());
    }

    fn push_bytes(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    fn push_file(&mut self, path: &Path) {
        self.flush();
        self.segments.push(Segment::File(FileSource {
            path: path.to_path_buf(),
        }));
    }

    fn boundary(&mut self) -> String {
        let boundary = generate_boundary();
        self.boundaries.push(boundary.clone());
        boundary
    }

    fn flush(&mut self) {
        if !self.pending.is_empty() {
            self.segments
                .push(Segment::Bytes(std::mem::take(&mut self.pending)));
        }
    }

    fn finish(mut self) -> (Vec<Segment>, Vec<String>) {
        self.flush();
        (self.segments, self.boundaries)
    }
}

impl Message {
    /// Renders the message with the current local time as its Date.
    ///
    /// # Errors
    ///
    /// Returns an error if the message is incomplete or a file cannot be
    /// opened. Nothing needs to be sent for either check.
    pub async fn render(&self) -> Result<Rendered> {
        self.render_at(Local::now().fixed_offset()).await
    }

    /// Renders the message with a fixed Date.
    ///
    /// # Errors
    ///
    /// See [`Self::render`].
    pub async fn render_at(&self, date: DateTime<FixedOffset>) -> Result<Rendered> {
        self.validate()?;
        self.check_files().await?;

        let header = self.render_header(&date).into_bytes();
        let mut body = BodyBuilder::default();
        self.render_body(&mut body);
        let (body, boundaries) = body.finish();
        Ok(Rendered {
            header,
            body,
            boundaries,
        })
    }

    async fn check_files(&self) -> Result<()> {
        let paths = self
            .attachments()
            .iter()
            .map(|a| a.path())
            .chain(self.embedded().iter().map(|e| e.path()));
        for path in paths {
            let file = File::open(path).await.map_err(|e| Error::file(path, e))?;
            let metadata = file.metadata().await.map_err(|e| Error::file(path, e))?;
            if metadata.is_dir() {
                let source = io::Error::new(io::ErrorKind::InvalidInput, "is a directory");
                return Err(Error::file(path, source));
            }
        }
        Ok(())
    }

    fn render_header(&self, date: &DateTime<FixedOffset>) -> String {
        let mut out = String::new();
        if let Some(subject) = self.subject() {
            out.push_str(&format!("Subject: {}\r\n", encode_rfc2047(subject, HEADER_CHARSET)));
        }
        if let Some(from) = self.from() {
            out.push_str(&format!("From: {}\r\n", from.to_header(HEADER_CHARSET)));
        }
        if let Some(reply_to) = self.reply_to() {
            out.push_str(&format!("Reply-To: {}\r\n", reply_to.to_header(HEADER_CHARSET)));
        }
        push_address_list(&mut out, "To", self.to());
        push_address_list(&mut out, "Cc", self.cc());
        push_address_list(&mut out, "Bcc", self.bcc());
        // Numeric zone (`+0200`); RFC 5322 obsoletes zone names.
        out.push_str(&format!("Date: {}\r\n", date.format("%a, %d %b %Y %H:%M:%S %z")));
        for header in self.headers().iter() {
            out.push_str(&header.render(HEADER_CHARSET));
        }
        out.push_str("Mime-Version: 1.0\r\n");
        out
    }

    fn render_body(&self, out: &mut BodyBuilder) {
        match self.structure() {
            Structure::Mixed => {
                let boundary = out.boundary();
                out.push(&format!(
                    "Content-Type: {}\r\n\r\n",
                    ContentType::multipart_mixed(boundary.clone())
                ));
                if !self.text_parts().is_empty() {
                    out.push(&format!("--{boundary}\r\n"));
                    if self.embedded().is_empty() {
                        self.render_text(out);
                    } else {
                        self.render_related(out);
                    }
                }
                for file in self.attachments() {
                    render_file(out, &boundary, file.path(), file.content_type(), "attachment", None);
                }
                out.push(&format!("--{boundary}--\r\n"));
            }
            Structure::Related => self.render_related(out),
            Structure::Alternative | Structure::SingleText => self.render_text(out),
        }
    }

    fn render_related(&self, out: &mut BodyBuilder) {
        let boundary = out.boundary();
        out.push(&format!(
            "Content-Type: {}\r\n\r\n--{boundary}\r\n",
            ContentType::multipart_related(boundary.clone())
        ));
        self.render_text(out);
        for file in self.embedded() {
            render_file(
                out,
                &boundary,
                file.path(),
                file.content_type(),
                "inline",
                Some(file.content_id()),
            );
        }
        out.push(&format!("--{boundary}--\r\n"));
    }

    fn render_text(&self, out: &mut BodyBuilder) {
        match self.text_parts() {
            [] => {}
            [part] => render_text_part(out, part),
            parts => {
                let boundary = out.boundary();
                out.push(&format!(
                    "Content-Type: {}\r\n\r\n",
                    ContentType::multipart_alternative(boundary.clone())
                ));
                for part in parts {
                    out.push(&format!("--{boundary}\r\n"));
                    render_text_part(out, part);
                }
                out.push(&format!("--{boundary}--\r\n"));
            }
        }
    }
}

fn push_address_list(out: &mut String, name: &str, list: &[Address]) {
    if list.is_empty() {
        return;
    }
    let joined = list
        .iter()
        .map(|a| a.to_header(HEADER_CHARSET))
        .collect::<Vec<_>>()
        .join(",");
    out.push_str(&format!("{name}: {joined}\r\n"));
}

fn render_text_part(out: &mut BodyBuilder, part: &TextPart) {
    out.push(&format!("Content-Type: {}\r\n", part.content_type()));
    match part.transfer_encoding() {
        TransferEncoding::Base64 => {
            out.push("Content-Transfer-Encoding: base64\r\n\r\n");
            out.push(&encode_base64_lines(part.body()));
            out.push("\r\n");
        }
        TransferEncoding::SevenBit => {
            out.push("\r\n");
            out.push_bytes(&normalize_line_endings(part.body()));
            out.push("\r\n\r\n");
        }
    }
}

fn render_file(
    out: &mut BodyBuilder,
    boundary: &str,
    path: &Path,
    content_type: ContentType,
    disposition: &str,
    content_id: Option<&str>,
) {
    let name = mime_file_name(path);
    out.push(&format!("--{boundary}\r\n"));
    out.push(&format!(
        "Content-Type: {}\r\n",
        content_type.with_parameter("name", name.clone())
    ));
    out.push("Content-Transfer-Encoding: base64\r\n");
    out.push(&format!("Content-Disposition: {disposition}; filename=\"{name}\"\r\n"));
    if let Some(cid) = content_id {
        out.push(&format!("Content-ID: <{cid}>\r\n"));
    }
    out.push("\r\n");
    out.push_file(path);
}

/// Base name of `path` for `name=` and `filename=` parameters.
///
/// Both `/` and `\` separate components. A non-ASCII name becomes a single
/// encoded-word.
fn mime_file_name(path: &Path) -> String {
    let full = path.to_string_lossy();
    let base = full.rsplit(['/', '\\']).next().unwrap_or_default();
    let base: String = base.chars().filter(|c| *c != '"' && !c.is_control()).collect();
    if is_us_ascii(base.as_bytes()) {
        base
    } else {
        encode_word(&base, HEADER_CHARSET)
    }
}

/// Converts lone CR or LF to CRLF.
fn normalize_line_endings(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + body.len() / 32);
    let mut iter = body.iter().copied().peekable();
    while let Some(byte) = iter.next() {
        match byte {
            b'\r' => {
                out.extend_from_slice(b"\r\n");
                if iter.peek() == Some(&b'\n') {
                    iter.next();
                }
            }
            b'\n' => out.extend_from_slice(b"\r\n"),
            other => out.push(other),
        }
    }
    out
}
