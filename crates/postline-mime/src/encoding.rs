//! Encoding utilities.
//!
//! Base64 over buffers and file streams, US-ASCII detection, and RFC 2047
//! encoded-words for header values.

use crate::error::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Input bytes per base64 line; encodes to exactly 76 characters.
pub const LINE_INPUT_LEN: usize = 57;

/// Input bytes per encoded-word chunk in header values.
pub const ENCODED_WORD_INPUT_LEN: usize = 45;

/// Input bytes read from a file per [`Base64Stream`] chunk.
const STREAM_BLOCK_LEN: usize = LINE_INPUT_LEN * 64;

/// Charset names treated as US-ASCII, compared case-insensitively.
const US_ASCII_ALIASES: &[&str] = &[
    "us-ascii",
    "ANSI_X3.4-1968",
    "ANSI_X3.4-1986",
    "cp367",
    "csASCII",
    "IBM367",
    "iso-ir-6",
    "ISO646-US",
    "ISO_646.irv:1991",
    "ascii",
    "us",
    "us-ascii-1968",
    "x-ansi",
];

/// Encodes data as Base64.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decodes Base64 data.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    STANDARD.decode(data).map_err(Into::into)
}

/// Encodes data as Base64 folded into 76-column lines, each ending in CRLF.
///
/// Empty input yields an empty string.
#[must_use]
pub fn encode_base64_lines(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() / 3 * 4 + data.len() / 19 + 4);
    for line in data.chunks(LINE_INPUT_LEN) {
        STANDARD.encode_string(line, &mut out);
        out.push_str("\r\n");
    }
    out
}

/// Returns true iff every byte is at most 127.
#[must_use]
pub fn is_us_ascii(data: &[u8]) -> bool {
    data.is_ascii()
}

/// Returns true iff `charset` is one of the known names for US-ASCII.
#[must_use]
pub fn is_us_ascii_charset(charset: &str) -> bool {
    US_ASCII_ALIASES
        .iter()
        .any(|alias| alias.eq_ignore_ascii_case(charset))
}

/// Wraps `text` in a single `=?charset?B?...?=` encoded-word.
#[must_use]
pub fn encode_word(text: &str, charset: &str) -> String {
    format!("=?{charset}?B?{}?=", encode_base64(text.as_bytes()))
}

/// Encodes a header value using RFC 2047 when it is not plain ASCII.
///
/// The UTF-8 bytes are cut into chunks of at most 45 bytes, never splitting a
/// character, and every chunk becomes its own encoded-word. Words are folded
/// onto continuation lines (`CRLF` followed by a space).
#[must_use]
pub fn encode_rfc2047(text: &str, charset: &str) -> String {
    if is_us_ascii(text.as_bytes()) {
        return text.to_string();
    }

    let mut out = String::new();
    let mut start = 0;
    while start < text.len() {
        let mut end = (start + ENCODED_WORD_INPUT_LEN).min(text.len());
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        if start > 0 {
            out.push_str("\r\n ");
        }
        out.push_str(&encode_word(&text[start..end], charset));
        start = end;
    }
    out
}

/// Streaming base64 encoder over an async reader.
///
/// Reads the source in fixed blocks and yields 76-column CRLF-terminated
/// lines, so only one block is held in memory at a time.
#[derive(Debug)]
pub struct Base64Stream<R> {
    reader: R,
    block: Box<[u8]>,
    done: bool,
}

impl<R: AsyncRead + Unpin> Base64Stream<R> {
    /// Creates an encoder over `reader`.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            block: vec![0; STREAM_BLOCK_LEN].into_boxed_slice(),
            done: false,
        }
    }

    /// Returns the next run of encoded lines, or `None` once the source is
    /// exhausted.
    ///
    /// # Errors
    ///
    /// Returns the reader's I/O error.
    pub async fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        if self.done {
            return Ok(None);
        }

        // Fill the whole block so that only the final chunk can end on a
        // partial base64 quantum.
        let mut filled = 0;
        while filled < self.block.len() {
            let n = self.reader.read(&mut self.block[filled..]).await?;
            if n == 0 {
                self.done = true;
                break;
            }
            filled += n;
        }

        if filled == 0 {
            return Ok(None);
        }
        Ok(Some(encode_base64_lines(&self.block[..filled]).into_bytes()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn decode_words(value: &str) -> Vec<u8> {
        value
            .split("\r\n ")
            .flat_map(|word| {
                let inner = word
                    .strip_prefix("=?UTF-8?B?")
                    .and_then(|w| w.strip_suffix("?="))
                    .unwrap();
                decode_base64(inner).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_base64_encode_decode() {
        let data = b"Hello, World!";
        let encoded = encode_base64(data);
        assert_eq!(encoded, "SGVsbG8sIFdvcmxkIQ==");

        let decoded = decode_base64(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_base64_lines_fold_at_76() {
        let data = vec![0xA5u8; 200];
        let encoded = encode_base64_lines(&data);
        let lines: Vec<&str> = encoded.split_terminator("\r\n").collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[..3].iter().all(|l| l.len() == 76));
        assert_eq!(encode_base64_lines(b""), "");
    }

    #[test]
    fn test_us_ascii_charset_aliases() {
        assert!(is_us_ascii_charset("US-ASCII"));
        assert!(is_us_ascii_charset("ansi_x3.4-1968"));
        assert!(is_us_ascii_charset("ISO646-US"));
        assert!(!is_us_ascii_charset("UTF-8"));
        assert!(!is_us_ascii_charset("us-ascii "));
    }

    #[test]
    fn test_rfc2047_ascii_untouched() {
        assert_eq!(encode_rfc2047("Hello", "UTF-8"), "Hello");
    }

    #[test]
    fn test_rfc2047_short_value_single_word() {
        let encoded = encode_rfc2047("Héllo", "UTF-8");
        assert_eq!(encoded, "=?UTF-8?B?SMOpbGxv?=");
    }

    #[test]
    fn test_rfc2047_long_value_is_chunked() {
        let text = "Grüße aus München, wir schreiben Ihnen wegen der Bestellung Nummer 42";
        assert!(text.len() > ENCODED_WORD_INPUT_LEN);

        let encoded = encode_rfc2047(text, "UTF-8");
        let words: Vec<&str> = encoded.split("\r\n ").collect();
        assert_eq!(words.len(), text.len().div_ceil(ENCODED_WORD_INPUT_LEN));
        assert!(words.iter().all(|w| w.starts_with("=?UTF-8?B?") && w.ends_with("?=")));
        assert_eq!(decode_words(&encoded), text.as_bytes());
    }

    #[test]
    fn test_rfc2047_never_splits_a_character() {
        // 44 ASCII bytes then a two-byte character straddling the chunk edge.
        let text = format!("{}é tail", "a".repeat(44));
        let encoded = encode_rfc2047(&text, "UTF-8");
        for word in encoded.split("\r\n ") {
            let inner = &word[10..word.len() - 2];
            assert!(String::from_utf8(decode_base64(inner).unwrap()).is_ok());
        }
        assert_eq!(decode_words(&encoded), text.as_bytes());
    }

    #[tokio::test]
    async fn test_stream_matches_buffer_encoding() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let mut stream = Base64Stream::new(&data[..]);
        let mut out = Vec::new();
        while let Some(chunk) = stream.next_chunk().await.unwrap() {
            out.extend_from_slice(&chunk);
        }
        assert_eq!(out, encode_base64_lines(&data).into_bytes());
        assert!(stream.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stream_empty_source() {
        let mut stream = Base64Stream::new(&b""[..]);
        assert!(stream.next_chunk().await.unwrap().is_none());
    }

    proptest! {
        #[test]
        fn prop_base64_round_trip(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            prop_assert_eq!(decode_base64(&encode_base64(&data)).unwrap(), data);
        }

        #[test]
        fn prop_ascii_strings_are_us_ascii(s in "[\\x00-\\x7f]*") {
            prop_assert!(is_us_ascii(s.as_bytes()));
        }

        #[test]
        fn prop_high_byte_is_not_us_ascii(
            mut data in proptest::collection::vec(0u8..128, 0..64),
            high in 128u8..=255,
            at in any::<prop::sample::Index>(),
        ) {
            let pos = at.index(data.len() + 1);
            data.insert(pos, high);
            prop_assert!(!is_us_ascii(&data));
        }
    }
}
