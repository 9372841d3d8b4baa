//! # postline
//!
//! Send a MIME message through an SMTP relay in one best-effort session.
//!
//! ## Quick Start
//!
//! ```ignore
//! use postline::{AuthKind, Config, Message, Security, Session};
//!
//! let config = Config::builder("smtp.example.com")
//!     .security(Security::StartTls)
//!     .credentials("ann@example.com", "app-password", AuthKind::Login)
//!     .build();
//!
//! let mut msg = Message::new();
//! msg.set_from("Ann Lee <ann@example.com>")?;
//! msg.add_to("bob@example.com")?;
//! msg.set_subject("Hello")?;
//! msg.add_text_part("Hi Bob!", "plain", None)?;
//!
//! let mut session = Session::new(config);
//! if let Err(e) = session.send_one(&msg).await {
//!     eprintln!("{:?}: {e}", e.kind());
//! }
//! ```
//!
//! The library never installs a tracing subscriber. Wire traffic is logged
//! at `trace`, or at `debug` with [`Config::transcript`]; AUTH payloads are
//! masked.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod session;

pub use config::{AuthKind, Config, ConfigBuilder, Credentials, DEFAULT_TIMEOUT, Security};
pub use error::{Error, ErrorKind, Result};
pub use session::Session;

pub use postline_mime::Message;
pub use postline_smtp::TlsVerification;
