//! # postline-smtp
//!
//! An SMTP client engine implementing the sending side of RFC 5321.
//!
//! ## Features
//!
//! - **Type-state connection management**: Compile-time enforcement of valid
//!   SMTP state transitions
//! - **Bounded I/O**: every read, write, connect and handshake has its own deadline
//! - **TLS support**: Both implicit TLS (port 465) and STARTTLS
//! - **Authentication**: PLAIN and LOGIN
//! - **Streamed DATA**: the payload is dot-stuffed as it is written
//!
//! ## Quick Start
//!
//! ```ignore
//! use postline_smtp::{Address, Client, TlsVerification, Transport};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> postline_smtp::Result<()> {
//!     let transport = Transport::connect("smtp.example.com", 587, Duration::from_secs(10)).await?;
//!     let client = Client::from_transport(transport).await?;
//!
//!     let client = client.hello("client.example.com").await?;
//!     let client = client
//!         .starttls("smtp.example.com", TlsVerification::Full, "client.example.com")
//!         .await?;
//!     let client = client.auth_plain("user@example.com", "password").await?;
//!
//!     let client = client.mail_from(Address::new("sender@example.com")?).await?;
//!     let client = client.rcpt_to(Address::new("recipient@example.com")?).await?;
//!     let mut data = client.data().await?;
//!
//!     data.write(b"Subject: Test\r\n\r\nHello, World!\r\n").await?;
//!     let client = data.finish().await?;
//!
//!     client.quit().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Connection States
//!
//! ```text
//! Connected ── hello() ──→ Greeted ── auth_*() ──→ Authenticated
//!                             │  ↺ starttls()          │
//!                             └──── mail_from() ───────┘
//!                                        ↓
//!              MailTransaction ── rcpt_to() ──→ RecipientAdded ── data() ──→ Data
//!                                                                              │
//!                                           Greeted ←── finish() ──────────────┘
//! ```
//!
//! A transaction step refused by the server hands the connection back as
//! [`Greeted`] inside [`TransactionError`], after an RSET, so the caller can
//! still QUIT.
//!
//! ## Modules
//!
//! - [`command`]: SMTP command builders
//! - [`connection`]: Transport, TLS and the type-state client
//! - [`data`]: DATA dot-stuffing
//! - [`parser`]: Response parser
//! - [`types`]: Core SMTP types (addresses, extensions, replies)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
pub mod data;
mod error;
pub mod parser;
pub mod types;

pub use connection::{
    Authenticated, Client, Connected, Data, Greeted, MailTransaction, RecipientAdded,
    ServerInfo, SmtpConnection, SmtpStream, TlsVerification, TransactionError,
    TransactionResult, Transport,
};
pub use error::{Error, Result};
pub use types::{Address, AuthMechanism, Extension, Reply, ReplyCode};
