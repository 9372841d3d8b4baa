//! Type-state SMTP client.

use super::ServerInfo;
use super::tls::TlsVerification;
use super::transport::Transport;
use crate::command::Command;
use crate::data::DotStuffer;
use crate::error::{Error, Result};
use crate::parser::{is_last_reply_line, parse_reply};
use crate::types::{Address, AuthMechanism, Reply, ReplyCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt;
use std::io;
use std::marker::PhantomData;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Longest reply line accepted, CRLF included.
pub const MAX_REPLY_LINE: usize = 4096;

/// Type-state marker for connected state (greeting read).
#[derive(Debug)]
pub struct Connected;

/// Type-state marker after a successful EHLO or HELO.
#[derive(Debug)]
pub struct Greeted;

/// Type-state marker for authenticated state.
#[derive(Debug)]
pub struct Authenticated;

/// Type-state marker for mail transaction started.
#[derive(Debug)]
pub struct MailTransaction;

/// Type-state marker for recipient added.
#[derive(Debug)]
pub struct RecipientAdded;

/// Type-state marker for data mode.
#[derive(Debug)]
pub struct Data;

/// SMTP client with type-state pattern.
///
/// Every step consumes the client and returns it in the next state. A
/// failed step drops it, closing the connection.
#[derive(Debug)]
pub struct Client<State, S = TcpStream> {
    transport: Transport<S>,
    server_info: ServerInfo,
    transcript: bool,
    stuffer: DotStuffer,
    _state: PhantomData<State>,
}

/// A failed transaction step.
///
/// When the server refused the command, the transaction has been reset with
/// RSET and the connection comes back in [`Greeted`] state, ready for QUIT.
/// Any other failure closes the connection.
#[derive(Debug)]
pub struct TransactionError<S = TcpStream> {
    error: Error,
    client: Option<Client<Greeted, S>>,
}

impl<S> TransactionError<S> {
    /// The failure itself.
    #[must_use]
    pub const fn error(&self) -> &Error {
        &self.error
    }

    /// Returns true if the connection survived the failure.
    #[must_use]
    pub const fn has_client(&self) -> bool {
        self.client.is_some()
    }

    /// Splits into the failure and the surviving connection, if any.
    #[must_use]
    pub fn into_parts(self) -> (Error, Option<Client<Greeted, S>>) {
        (self.error, self.client)
    }
}

impl<S> fmt::Display for TransactionError<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl<S: fmt::Debug> std::error::Error for TransactionError<S> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.error)
    }
}

impl<S> From<TransactionError<S>> for Error {
    fn from(err: TransactionError<S>) -> Self {
        err.error
    }
}

/// Result of a transaction step.
pub type TransactionResult<T, S = TcpStream> = std::result::Result<T, TransactionError<S>>;

/// Connection trait for all states.
pub trait SmtpConnection {
    /// Returns the server information.
    fn server_info(&self) -> &ServerInfo;

    /// Returns true once TLS is active.
    fn is_tls(&self) -> bool;
}

impl<State, S: AsyncRead + AsyncWrite + Unpin + Send> SmtpConnection for Client<State, S> {
    fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    fn is_tls(&self) -> bool {
        self.transport.is_tls()
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> Client<Connected, S> {
    /// Creates a client over a transport and reads the server greeting.
    ///
    /// For implicit TLS, upgrade the transport before calling this.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the greeting fails or its code is not 220.
    pub async fn from_transport(transport: Transport<S>) -> Result<Self> {
        let mut client = Self {
            transport,
            server_info: ServerInfo::default(),
            transcript: false,
            stuffer: DotStuffer::new(),
            _state: PhantomData,
        };
        let greeting = client.read_reply().await?;
        check("Greeting", &greeting, &[ReplyCode::SERVICE_READY])?;

        client.server_info.hostname = greeting
            .message
            .first()
            .and_then(|msg| msg.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();
        client.server_info.greeting = greeting.message_text();
        Ok(client)
    }

    /// Logs commands and replies at `debug` instead of `trace`.
    #[must_use]
    pub fn with_transcript(mut self, transcript: bool) -> Self {
        self.transcript = transcript;
        self
    }

    /// Sends EHLO, falling back to RSET and HELO if EHLO is refused.
    ///
    /// # Errors
    ///
    /// Returns an error if neither greeting is accepted.
    pub async fn hello(mut self, node: &str) -> Result<Client<Greeted, S>> {
        let ehlo = Command::Ehlo {
            hostname: node.to_string(),
        };
        let reply = self.send_command(&ehlo).await?;
        if reply.is(ReplyCode::OK) {
            self.server_info.set_extensions(&reply);
        } else {
            tracing::warn!(reply = %reply.literal(), "EHLO refused, falling back to HELO");
            // Any answer to RSET is fine here.
            self.send_command(&Command::Rset).await?;
            let helo = Command::Helo {
                hostname: node.to_string(),
            };
            self.exchange(&helo, &[ReplyCode::OK]).await?;
            self.server_info.extensions.clear();
        }
        Ok(self.into_state())
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> Client<Greeted, S> {
    /// Upgrades the connection with STARTTLS and greets again.
    ///
    /// Capabilities learned before the upgrade are replaced by those of the
    /// second EHLO.
    ///
    /// # Errors
    ///
    /// Returns an error if the server refuses STARTTLS, the handshake fails,
    /// or the second EHLO is refused.
    pub async fn starttls(
        mut self,
        server_name: &str,
        verification: TlsVerification,
        node: &str,
    ) -> Result<Self> {
        if !self.server_info.supports_starttls() {
            tracing::warn!("server does not advertise STARTTLS");
        }
        self.exchange(&Command::StartTls, &[ReplyCode::SERVICE_READY])
            .await?;
        self.transport.upgrade_to_tls(server_name, verification).await?;
        tracing::info!(server_name, "TLS established");

        let ehlo = Command::Ehlo {
            hostname: node.to_string(),
        };
        let reply = self.exchange(&ehlo, &[ReplyCode::OK]).await?;
        self.server_info.set_extensions(&reply);
        Ok(self)
    }

    /// Authenticates with the given mechanism.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects any step of the exchange.
    pub async fn authenticate(
        self,
        mechanism: AuthMechanism,
        username: &str,
        password: &str,
    ) -> Result<Client<Authenticated, S>> {
        match mechanism {
            AuthMechanism::Login => self.auth_login(username, password).await,
            AuthMechanism::Plain => self.auth_plain(username, password).await,
        }
    }

    /// Authenticates using LOGIN: username with the command, then password.
    ///
    /// # Errors
    ///
    /// Returns an error unless the replies are 334 then 235.
    pub async fn auth_login(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<Authenticated, S>> {
        self.warn_unadvertised(AuthMechanism::Login);
        let cmd = Command::Auth {
            mechanism: AuthMechanism::Login,
            initial_response: Some(STANDARD.encode(username)),
        };
        self.exchange(&cmd, &[ReplyCode::AUTH_CONTINUE]).await?;
        let cmd = Command::AuthResponse(STANDARD.encode(password));
        self.exchange(&cmd, &[ReplyCode::AUTH_SUCCESS]).await?;
        tracing::info!(mechanism = "LOGIN", "authenticated");
        Ok(self.into_state())
    }

    /// Authenticates using PLAIN: `\0username\0password` after the 334.
    ///
    /// # Errors
    ///
    /// Returns an error unless the replies are 334 then 235.
    pub async fn auth_plain(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<Authenticated, S>> {
        self.warn_unadvertised(AuthMechanism::Plain);
        let cmd = Command::Auth {
            mechanism: AuthMechanism::Plain,
            initial_response: None,
        };
        self.exchange(&cmd, &[ReplyCode::AUTH_CONTINUE]).await?;
        let credentials = format!("\0{username}\0{password}");
        let cmd = Command::AuthResponse(STANDARD.encode(credentials.as_bytes()));
        self.exchange(&cmd, &[ReplyCode::AUTH_SUCCESS]).await?;
        tracing::info!(mechanism = "PLAIN", "authenticated");
        Ok(self.into_state())
    }

    /// Starts a mail transaction without authentication (if server allows).
    ///
    /// # Errors
    ///
    /// Returns an error if the MAIL FROM command fails.
    pub async fn mail_from(
        self,
        from: Address,
    ) -> TransactionResult<Client<MailTransaction, S>, S> {
        self.start_mail(from).await
    }

    fn warn_unadvertised(&self, mechanism: AuthMechanism) {
        if !self.server_info.auth_mechanisms().contains(&mechanism) {
            tracing::warn!(
                mechanism = mechanism.as_str(),
                "server does not advertise AUTH mechanism"
            );
        }
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> Client<Authenticated, S> {
    /// Starts a mail transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the MAIL FROM command fails.
    pub async fn mail_from(
        self,
        from: Address,
    ) -> TransactionResult<Client<MailTransaction, S>, S> {
        self.start_mail(from).await
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> Client<MailTransaction, S> {
    /// Adds the first recipient to the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error unless the reply is 250 or 251.
    pub async fn rcpt_to(
        mut self,
        to: Address,
    ) -> TransactionResult<Client<RecipientAdded, S>, S> {
        let result = self.add_recipient(to).await;
        match result {
            Ok(()) => Ok(self.into_state()),
            Err(e) => Err(self.recover(e).await),
        }
    }

    /// Aborts the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the RSET command fails.
    pub async fn reset(self) -> Result<Client<Greeted, S>> {
        self.rset().await
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> Client<RecipientAdded, S> {
    /// Adds another recipient to the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error unless the reply is 250 or 251.
    pub async fn rcpt_to(mut self, to: Address) -> TransactionResult<Self, S> {
        let result = self.add_recipient(to).await;
        match result {
            Ok(()) => Ok(self),
            Err(e) => Err(self.recover(e).await),
        }
    }

    /// Begins sending message data.
    ///
    /// # Errors
    ///
    /// Returns an error unless the reply is 354.
    pub async fn data(mut self) -> TransactionResult<Client<Data, S>, S> {
        let result = self.exchange(&Command::Data, &[ReplyCode::START_DATA]).await;
        if let Err(e) = result {
            return Err(self.recover(e).await);
        }
        self.stuffer = DotStuffer::new();
        Ok(self.into_state())
    }

    /// Aborts the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the RSET command fails.
    pub async fn reset(self) -> Result<Client<Greeted, S>> {
        self.rset().await
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> Client<Data, S> {
    /// Writes a piece of the message, dot-stuffed.
    ///
    /// Call repeatedly to stream the message; line breaks may fall across
    /// calls. After an error the connection is unusable; drop the client
    /// instead of calling [`Client::finish`].
    ///
    /// # Errors
    ///
    /// Returns an I/O error on write failure or timeout.
    pub async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        let stuffed = self.stuffer.stuff(chunk);
        self.transport.write(&stuffed).await?;
        tracing::trace!(bytes = stuffed.len(), "DATA chunk sent");
        Ok(())
    }

    /// Sends the end-of-data marker and waits for the server to accept.
    ///
    /// The client is ready for another transaction afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error unless the reply is 250.
    pub async fn finish(mut self) -> TransactionResult<Client<Greeted, S>, S> {
        let result = self.end_data().await;
        match result {
            Ok(()) => Ok(self.into_state()),
            Err(e) => Err(self.recover(e).await),
        }
    }

    async fn end_data(&mut self) -> Result<()> {
        // A payload ending in CRLF already supplies the marker's first CRLF.
        let marker: &[u8] = if self.stuffer.at_line_start() {
            b".\r\n"
        } else {
            b"\r\n.\r\n"
        };
        self.transport.write(marker).await?;
        self.log_sent(".");

        let reply = self.read_reply().await?;
        check("Message", &reply, &[ReplyCode::OK])?;
        tracing::info!(reply = %reply.literal(), "message accepted");
        Ok(())
    }
}

// Common implementation for all states
impl<State, S: AsyncRead + AsyncWrite + Unpin + Send> Client<State, S> {
    /// Sends QUIT and closes the connection (available in any state).
    ///
    /// The connection is closed even if QUIT fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the QUIT command fails or is not answered with 221.
    pub async fn quit(mut self) -> Result<()> {
        let result = self.exchange(&Command::Quit, &[ReplyCode::CLOSING]).await;
        self.transport.close().await;
        result.map(|_| ())
    }

    /// Closes the connection without QUIT.
    pub async fn close(mut self) {
        self.transport.close().await;
    }

    async fn start_mail(
        mut self,
        from: Address,
    ) -> TransactionResult<Client<MailTransaction, S>, S> {
        let result = self
            .exchange(&Command::MailFrom { from }, &[ReplyCode::OK])
            .await;
        match result {
            Ok(_) => Ok(self.into_state()),
            Err(e) => Err(self.recover(e).await),
        }
    }

    /// Keeps the connection after a refused transaction step by resetting the
    /// transaction; drops it after any other failure.
    async fn recover(mut self, error: Error) -> TransactionError<S> {
        if !matches!(error, Error::Rejected { .. }) {
            return TransactionError {
                error,
                client: None,
            };
        }
        let result = self.exchange(&Command::Rset, &[ReplyCode::OK]).await;
        let client = match result {
            Ok(_) => Some(self.into_state()),
            Err(e) => {
                tracing::debug!(error = %e, "RSET after refusal failed");
                None
            }
        };
        TransactionError { error, client }
    }

    async fn add_recipient(&mut self, to: Address) -> Result<()> {
        self.exchange(&Command::RcptTo { to }, &[ReplyCode::OK, ReplyCode::FORWARD])
            .await?;
        Ok(())
    }

    async fn rset(mut self) -> Result<Client<Greeted, S>> {
        self.exchange(&Command::Rset, &[ReplyCode::OK]).await?;
        Ok(self.into_state())
    }

    fn into_state<T>(self) -> Client<T, S> {
        Client {
            transport: self.transport,
            server_info: self.server_info,
            transcript: self.transcript,
            stuffer: self.stuffer,
            _state: PhantomData,
        }
    }

    async fn exchange(&mut self, cmd: &Command, accepted: &[ReplyCode]) -> Result<Reply> {
        let reply = self.send_command(cmd).await?;
        check(cmd.verb(), &reply, accepted)?;
        Ok(reply)
    }

    async fn send_command(&mut self, cmd: &Command) -> Result<Reply> {
        self.transport.write(&cmd.serialize()).await?;
        self.log_sent(&cmd.redacted());
        self.read_reply().await
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line().await?;
            let is_last = is_last_reply_line(&line);
            lines.push(line);

            if is_last {
                break;
            }
        }

        let reply = parse_reply(&lines)?;
        if self.transcript {
            tracing::debug!(reply = %reply.literal(), "S:");
        } else {
            tracing::trace!(reply = %reply.literal(), "S:");
        }
        Ok(reply)
    }

    /// Reads one CRLF-terminated line: the code and separator at once, then
    /// byte by byte up to LF.
    async fn read_line(&mut self) -> Result<String> {
        let mut raw = self.transport.read_exact(4).await?;
        if let Some(lf) = raw.iter().position(|&b| b == b'\n') {
            if lf + 1 != raw.len() {
                return Err(Error::Protocol(format!(
                    "Reply line too short: {:?}",
                    String::from_utf8_lossy(&raw)
                )));
            }
        }
        while raw.last() != Some(&b'\n') {
            if raw.len() >= MAX_REPLY_LINE {
                return Err(Error::Protocol(format!(
                    "Reply line longer than {MAX_REPLY_LINE} bytes"
                )));
            }
            match self.transport.read_byte().await? {
                Some(b) => raw.push(b),
                None => {
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed mid-reply",
                    )));
                }
            }
        }
        raw.pop();
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    fn log_sent(&self, line: &str) {
        if self.transcript {
            tracing::debug!(command = %line, "C:");
        } else {
            tracing::trace!(command = %line, "C:");
        }
    }
}

fn check(what: &str, reply: &Reply, accepted: &[ReplyCode]) -> Result<()> {
    if accepted.contains(&reply.code) {
        Ok(())
    } else {
        Err(Error::rejected(what, reply.code.as_u16(), reply.literal()))
    }
}
