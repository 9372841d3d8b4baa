//! SMTP reply types.

/// SMTP reply from server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply code (e.g., 250).
    pub code: ReplyCode,
    /// Reply text per line, code and separator removed.
    pub message: Vec<String>,
}

impl Reply {
    /// Creates a new reply.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec is not const-compatible
    pub fn new(code: ReplyCode, message: Vec<String>) -> Self {
        Self { code, message }
    }

    /// Returns true if the code equals `expected`.
    #[must_use]
    pub fn is(&self, expected: ReplyCode) -> bool {
        self.code == expected
    }

    /// Returns true if this is a success reply (2xx).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// Returns the full message as a single string.
    #[must_use]
    pub fn message_text(&self) -> String {
        self.message.join("\n")
    }

    /// Reconstructs the reply as the server sent it, one line per entry.
    ///
    /// `550-first` / `550 last` become `"550-first\n550 last"`.
    #[must_use]
    pub fn literal(&self) -> String {
        let last = self.message.len().saturating_sub(1);
        if self.message.is_empty() {
            return self.code.to_string();
        }
        self.message
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let sep = if i == last { ' ' } else { '-' };
                format!("{}{sep}{text}", self.code)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// SMTP reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// Creates a new reply code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Returns true if this is a success code (2xx).
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 >= 200 && self.0 < 300
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(self) -> bool {
        self.0 >= 400 && self.0 < 500
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(self) -> bool {
        self.0 >= 500 && self.0 < 600
    }
}

impl std::fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Codes the engine checks for
impl ReplyCode {
    /// 220 Service ready (greeting, STARTTLS go-ahead)
    pub const SERVICE_READY: Self = Self(220);
    /// 221 Service closing transmission channel
    pub const CLOSING: Self = Self(221);
    /// 235 Authentication succeeded
    pub const AUTH_SUCCESS: Self = Self(235);
    /// 250 Requested mail action okay, completed
    pub const OK: Self = Self(250);
    /// 251 User not local; will forward
    pub const FORWARD: Self = Self(251);
    /// 334 Continue with authentication
    pub const AUTH_CONTINUE: Self = Self(334);
    /// 354 Start mail input
    pub const START_DATA: Self = Self(354);
    /// 535 Authentication credentials invalid
    pub const AUTH_FAILED: Self = Self(535);
    /// 550 Mailbox unavailable (not found, access denied)
    pub const MAILBOX_UNAVAILABLE: Self = Self(550);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn code_classes() {
        assert!(ReplyCode::FORWARD.is_success());
        assert!(ReplyCode::new(451).is_transient());
        assert!(ReplyCode::AUTH_FAILED.is_permanent());
        assert!(!ReplyCode::START_DATA.is_success());
        assert_eq!(format!("{}", ReplyCode::OK), "250");
    }

    #[test]
    fn literal_single_line() {
        let reply = Reply::new(ReplyCode::MAILBOX_UNAVAILABLE, vec!["5.1.1 No such user".into()]);
        assert_eq!(reply.literal(), "550 5.1.1 No such user");
        assert!(reply.is(ReplyCode::MAILBOX_UNAVAILABLE));
    }

    #[test]
    fn literal_multi_line() {
        let reply = Reply::new(
            ReplyCode::new(554),
            vec!["Rejected".into(), "See policy".into()],
        );
        assert_eq!(reply.literal(), "554-Rejected\n554 See policy");
        assert_eq!(reply.message_text(), "Rejected\nSee policy");
    }

    #[test]
    fn literal_code_only() {
        assert_eq!(Reply::new(ReplyCode::OK, vec![]).literal(), "250");
    }
}
