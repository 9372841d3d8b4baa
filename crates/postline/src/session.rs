//! One SMTP session: connect, greet, secure, authenticate, send, quit.

use crate::config::{Config, Security};
use crate::error::{Error, Result};
use postline_mime::{Message, Rendered, Segment};
use postline_smtp::{
    Address, Authenticated, Client, Data, Greeted, SmtpConnection, TransactionError, Transport,
};

enum Connection {
    Closed,
    Greeted(Client<Greeted>),
    Authenticated(Client<Authenticated>),
}

/// A best-effort mail session against one relay.
///
/// Every operation returns a [`Result`]. The text of the most recent failure
/// is also kept in [`Session::last_error`]. When the server refuses part of a
/// send, the session stays open so that [`Session::close`] still says QUIT.
/// Any other failure leaves the session closed; open it again to retry.
pub struct Session {
    config: Config,
    connection: Connection,
    last_error: Option<String>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.config.host)
            .field("port", &self.config.port())
            .field("open", &self.is_open())
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a closed session.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self {
            config,
            connection: Connection::Closed,
            last_error: None,
        }
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Returns true between a successful [`Session::open`] and
    /// [`Session::close`] or a failure that lost the connection.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        !matches!(self.connection, Connection::Closed)
    }

    /// Text of the most recent failure, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Connects and prepares the session for sending `message`.
    ///
    /// Checks the configuration and the message before any I/O.
    ///
    /// # Errors
    ///
    /// Returns a config error for incomplete settings or message, otherwise
    /// the first connection, TLS or protocol failure.
    pub async fn open(&mut self, message: &Message) -> Result<()> {
        let result = self.try_open(message).await;
        self.record(result)
    }

    /// Sends `message` over the open session.
    ///
    /// The message is rendered, and its files checked, before `MAIL FROM`.
    /// If streaming fails after `DATA`, the connection is dropped without
    /// the end-of-data marker so the server discards the partial message.
    /// A step the server refuses is reset with RSET and the session stays
    /// open.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is not open, the message cannot be
    /// rendered, or any SMTP step fails.
    pub async fn send(&mut self, message: &Message) -> Result<()> {
        let result = self.try_send(message).await;
        self.record(result)
    }

    /// Sends QUIT and closes the connection. Never fails.
    pub async fn close(&mut self) {
        let result = match std::mem::replace(&mut self.connection, Connection::Closed) {
            Connection::Closed => return,
            Connection::Greeted(client) => client.quit().await,
            Connection::Authenticated(client) => client.quit().await,
        };
        match result {
            Ok(()) => tracing::info!(host = %self.config.host, "session closed"),
            Err(e) => tracing::warn!(error = %e, "QUIT failed, connection closed anyway"),
        }
    }

    /// Opens a session, sends `message` and closes the session.
    ///
    /// # Errors
    ///
    /// Returns the first failure of [`Session::open`] or [`Session::send`].
    pub async fn send_one(&mut self, message: &Message) -> Result<()> {
        self.open(message).await?;
        let result = self.send(message).await;
        self.close().await;
        result
    }

    async fn try_open(&mut self, message: &Message) -> Result<()> {
        if self.is_open() {
            return Err(Error::Config("Session already open!".into()));
        }
        let config = &self.config;
        config.validate()?;
        message.validate()?;

        let host = config.host.as_str();
        let port = config.port();
        let mut transport = Transport::connect(host, port, config.timeout).await?;
        if config.security == Security::Implicit {
            transport
                .upgrade_to_tls(host, config.tls_verification)
                .await?;
        }

        let client = Client::from_transport(transport)
            .await?
            .with_transcript(config.transcript);
        tracing::info!(host, port, tls = client.is_tls(), "connected");

        let node = config.node_name();
        let mut client = client.hello(&node).await?;
        if config.security == Security::StartTls {
            client = client
                .starttls(host, config.tls_verification, &node)
                .await?;
        }

        self.connection = match &config.credentials {
            Some(credentials) => Connection::Authenticated(
                client
                    .authenticate(
                        credentials.kind.mechanism(),
                        &credentials.username,
                        &credentials.password,
                    )
                    .await?,
            ),
            None => Connection::Greeted(client),
        };
        Ok(())
    }

    async fn try_send(&mut self, message: &Message) -> Result<()> {
        if !self.is_open() {
            return Err(Error::Config("Session not open!".into()));
        }

        // Nothing below touches the connection until MAIL FROM.
        let rendered = message.render().await?;
        let sender = message
            .from()
            .ok_or_else(|| Error::Config("No From: address!".into()))?;
        let from = Address::new(sender.email())?;
        let mut recipients = message
            .recipients()
            .map(|addr| Address::new(addr.email()))
            .collect::<postline_smtp::Result<Vec<_>>>()?
            .into_iter();
        let first = recipients
            .next()
            .ok_or_else(|| Error::Config("No To: address(es)!".into()))?;

        let connection = std::mem::replace(&mut self.connection, Connection::Closed);
        match transact(connection, from, first, recipients, &rendered).await {
            Ok(client) => {
                self.connection = Connection::Greeted(client);
                Ok(())
            }
            Err(Failure { error, client }) => {
                if let Some(client) = client {
                    self.connection = Connection::Greeted(client);
                }
                Err(error)
            }
        }
    }

    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            tracing::debug!(error = %e, kind = ?e.kind(), "session operation failed");
            self.last_error = Some(e.to_string());
        }
        result
    }
}

/// Failed transaction, with the connection if the server kept it.
struct Failure {
    error: Error,
    client: Option<Client<Greeted>>,
}

impl From<TransactionError> for Failure {
    fn from(err: TransactionError) -> Self {
        let (error, client) = err.into_parts();
        Self {
            error: error.into(),
            client,
        }
    }
}

impl From<Error> for Failure {
    fn from(error: Error) -> Self {
        Self {
            error,
            client: None,
        }
    }
}

async fn transact(
    connection: Connection,
    from: Address,
    first: Address,
    rest: impl Iterator<Item = Address>,
    rendered: &Rendered,
) -> std::result::Result<Client<Greeted>, Failure> {
    let transaction = match connection {
        Connection::Closed => return Err(Error::Config("Session not open!".into()).into()),
        Connection::Greeted(client) => client.mail_from(from).await?,
        Connection::Authenticated(client) => client.mail_from(from).await?,
    };
    let mut transaction = transaction.rcpt_to(first).await?;
    for to in rest {
        transaction = transaction.rcpt_to(to).await?;
    }

    let mut data = transaction.data().await?;
    write_rendered(&mut data, rendered).await?;
    Ok(data.finish().await?)
}

/// Streams the header block and every body segment as DATA.
async fn write_rendered(data: &mut Client<Data>, rendered: &Rendered) -> Result<()> {
    data.write(rendered.header()).await?;
    for segment in rendered.body() {
        match segment {
            Segment::Bytes(bytes) => data.write(bytes).await?,
            Segment::File(file) => {
                let mut stream = file.open().await?;
                while let Some(chunk) = stream
                    .next_chunk()
                    .await
                    .map_err(|e| file.read_error(e))?
                {
                    data.write(&chunk).await?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn message() -> Message {
        let mut msg = Message::new();
        msg.set_from("Ann <ann@example.com>").unwrap();
        msg.add_to("bob@example.com").unwrap();
        msg.add_text_part("hi", "plain", None).unwrap();
        msg
    }

    #[tokio::test]
    async fn test_missing_host_fails_before_io() {
        let mut session = Session::new(Config::new(""));
        let err = session.open(&message()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(session.last_error(), Some("No SMTP host!"));
        assert!(!session.is_open());
    }

    #[tokio::test]
    async fn test_incomplete_message_fails_before_io() {
        let mut session = Session::new(Config::new("127.0.0.1"));
        let mut msg = message();
        msg.clear_to();
        let err = session.open(&msg).await.unwrap_err();
        assert_eq!(err.to_string(), "No To: address(es)!");
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[tokio::test]
    async fn test_send_requires_open_session() {
        let mut session = Session::new(Config::new("127.0.0.1"));
        let err = session.send(&message()).await.unwrap_err();
        assert_eq!(err.to_string(), "Session not open!");
        session.close().await;
        assert_eq!(session.last_error(), Some("Session not open!"));
    }

    #[test]
    fn test_debug_hides_credentials() {
        let config = Config::builder("mx")
            .credentials("ann", "hunter2", crate::AuthKind::Plain)
            .build();
        let debug = format!("{:?}", Session::new(config));
        assert!(debug.contains("mx"));
        assert!(!debug.contains("hunter2"));
    }
}
