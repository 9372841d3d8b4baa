//! DATA payload transparency (RFC 5321 section 4.5.2).

/// Doubles every `.` that starts a line of the DATA payload.
///
/// State carries across chunks, so a payload may be fed in pieces of any
/// size. The start of the payload counts as the start of a line.
#[derive(Debug, Clone)]
pub struct DotStuffer {
    at_line_start: bool,
}

impl Default for DotStuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl DotStuffer {
    /// Creates a stuffer positioned at the start of a line.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            at_line_start: true,
        }
    }

    /// Returns `chunk` with leading dots doubled.
    #[must_use]
    pub fn stuff(&mut self, chunk: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(chunk.len() + chunk.len() / 64);
        for &b in chunk {
            if self.at_line_start && b == b'.' {
                out.push(b'.');
            }
            out.push(b);
            self.at_line_start = b == b'\n';
        }
        out
    }

    /// Returns true if the bytes seen so far end with a line break.
    #[must_use]
    pub const fn at_line_start(&self) -> bool {
        self.at_line_start
    }
}
