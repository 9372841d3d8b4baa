//! Buffered transport with per-operation deadlines.

use super::stream::SmtpStream;
use super::tls::{TlsVerification, create_tls_connector};
use crate::error::{Error, Result};
use rustls::pki_types::ServerName;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

/// Size of the read-ahead buffer.
pub const READ_BUFFER_LEN: usize = 4096;

/// Runs one I/O step under its own deadline.
async fn deadline<T>(timeout: Duration, op: impl Future<Output = io::Result<T>>) -> Result<T> {
    match tokio::time::timeout(timeout, op).await {
        Ok(result) => result.map_err(Error::from),
        Err(_) => Err(Error::Timeout(timeout)),
    }
}

/// Maps a tokio-rustls handshake failure to the most specific TLS error.
fn handshake_error(err: io::Error) -> Error {
    let inner = err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        .cloned();
    match inner {
        Some(tls) => Error::Tls(tls),
        None => Error::TlsHandshake(err),
    }
}

/// Byte transport under the SMTP engine.
///
/// Reads go through a fixed read-ahead buffer. Every read, write, connect and
/// handshake is bounded by the configured timeout; the timer restarts for
/// each operation. After any failure the transport refuses further I/O.
#[derive(Debug)]
pub struct Transport<S = TcpStream> {
    stream: SmtpStream<S>,
    buffer: Box<[u8]>,
    pos: usize,
    filled: usize,
    timeout: Duration,
    eof: bool,
    failed: bool,
}

impl Transport<TcpStream> {
    /// Resolves `host` and opens a TCP connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connect`] if resolution or connecting fails or takes
    /// longer than `timeout`.
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let connect_error = |source| Error::Connect {
            host: host.to_string(),
            port,
            source,
        };
        let tcp = match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(tcp)) => tcp,
            Ok(Err(source)) => return Err(connect_error(source)),
            Err(_) => {
                let source = io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no connection within {timeout:?}"),
                );
                return Err(connect_error(source));
            }
        };
        tracing::debug!(host, port, "TCP connection established");
        Ok(Self::new(tcp, timeout))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> Transport<S> {
    /// Wraps an already connected stream.
    pub fn new(stream: S, timeout: Duration) -> Self {
        Self {
            stream: SmtpStream::Plain(stream),
            buffer: vec![0; READ_BUFFER_LEN].into_boxed_slice(),
            pos: 0,
            filled: 0,
            timeout,
            eof: false,
            failed: false,
        }
    }

    /// Per-operation timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns true once TLS is active.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        self.stream.is_tls()
    }

    /// Returns true after an I/O failure or EOF-as-error.
    #[must_use]
    pub const fn has_failed(&self) -> bool {
        self.failed
    }

    /// Performs a client TLS handshake over the current stream.
    ///
    /// Fails if unread plaintext is still buffered, since it would otherwise
    /// be treated as if it had arrived over TLS.
    ///
    /// # Errors
    ///
    /// Returns a TLS error on handshake or verification failure, or
    /// [`Error::NoPeerCertificate`] if the server sent no certificate.
    pub async fn upgrade_to_tls(
        &mut self,
        server_name: &str,
        verification: TlsVerification,
    ) -> Result<()> {
        self.check()?;
        if self.pos < self.filled {
            self.failed = true;
            return Err(Error::Protocol("unexpected data before TLS handshake".into()));
        }
        let result = self.handshake(server_name, verification).await;
        self.track(result)
    }

    async fn handshake(&mut self, server_name: &str, verification: TlsVerification) -> Result<()> {
        let plain = match std::mem::replace(&mut self.stream, SmtpStream::Closed) {
            SmtpStream::Plain(plain) => plain,
            other => {
                self.stream = other;
                return Err(Error::InvalidState("TLS already active".into()));
            }
        };

        let name = ServerName::try_from(server_name.to_string())?;
        let connector = create_tls_connector(verification);
        let tls = match tokio::time::timeout(self.timeout, connector.connect(name, plain)).await {
            Ok(Ok(tls)) => tls,
            Ok(Err(err)) => return Err(handshake_error(err)),
            Err(_) => return Err(Error::Timeout(self.timeout)),
        };

        let (_, session) = tls.get_ref();
        if session.peer_certificates().is_none_or(<[_]>::is_empty) {
            return Err(Error::NoPeerCertificate);
        }
        tracing::debug!(
            version = ?session.protocol_version(),
            cipher = ?session.negotiated_cipher_suite().map(|s| s.suite()),
            "TLS established"
        );
        self.stream = SmtpStream::Tls(Box::new(tls));
        Ok(())
    }

    /// Sends every byte of `data`, then flushes.
    ///
    /// # Errors
    ///
    /// Returns an I/O error on failure or timeout. A zero-byte write is
    /// treated as the peer having closed the connection.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.check()?;
        let result = self.write_all(data).await;
        self.track(result)
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<usize> {
        let mut written = 0;
        while written < data.len() {
            match deadline(self.timeout, self.stream.write(&data[written..])).await {
                Ok(0) => {
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "connection closed by peer",
                    )));
                }
                Ok(n) => written += n,
                Err(Error::Io(e))
                    if matches!(
                        e.kind(),
                        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
                    ) => {}
                Err(e) => return Err(e),
            }
        }
        deadline(self.timeout, self.stream.flush()).await?;
        Ok(written)
    }

    /// Reads exactly `n` bytes.
    ///
    /// # Errors
    ///
    /// Returns an I/O error on timeout, failure, or EOF before `n` bytes.
    pub async fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        self.check()?;
        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            if self.pos == self.filled {
                let result = self.fill().await;
                if !self.track(result)? {
                    self.failed = true;
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed by server",
                    )));
                }
            }
            let take = (n - out.len()).min(self.filled - self.pos);
            out.extend_from_slice(&self.buffer[self.pos..self.pos + take]);
            self.pos += take;
        }
        Ok(out)
    }

    /// Reads one byte, or `None` at EOF.
    ///
    /// # Errors
    ///
    /// Returns an I/O error on timeout or failure.
    pub async fn read_byte(&mut self) -> Result<Option<u8>> {
        self.check()?;
        if self.pos == self.filled {
            let result = self.fill().await;
            if !self.track(result)? {
                return Ok(None);
            }
        }
        let byte = self.buffer[self.pos];
        self.pos += 1;
        Ok(Some(byte))
    }

    /// Shuts down TLS (if active) and the stream. Never fails; safe to call
    /// more than once.
    pub async fn close(&mut self) {
        let mut stream = std::mem::replace(&mut self.stream, SmtpStream::Closed);
        if !stream.is_closed() {
            if let Ok(Err(e)) = tokio::time::timeout(self.timeout, stream.shutdown()).await {
                tracing::debug!(error = %e, "shutdown failed");
            }
        }
        self.pos = 0;
        self.filled = 0;
    }

    /// Refills the buffer; returns false at EOF.
    async fn fill(&mut self) -> Result<bool> {
        if self.eof {
            return Ok(false);
        }
        let n = deadline(self.timeout, self.stream.read(&mut self.buffer[..])).await?;
        self.pos = 0;
        self.filled = n;
        if n == 0 {
            self.eof = true;
        }
        Ok(n > 0)
    }

    fn check(&self) -> Result<()> {
        if self.failed {
            return Err(Error::InvalidState("connection failed earlier".into()));
        }
        Ok(())
    }

    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.failed = true;
        }
        result
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use crate::connection::testing::self_signed_acceptor;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_read_exact_spans_refills() {
        let mock = tokio_test::io::Builder::new()
            .read(b"22")
            .read(b"0 re")
            .read(b"ady\r\n")
            .build();
        let mut transport = Transport::new(mock, TIMEOUT);
        assert_eq!(transport.read_exact(4).await.unwrap(), b"220 ");
        assert_eq!(transport.read_exact(7).await.unwrap(), b"ready\r\n");
    }

    #[tokio::test]
    async fn test_read_byte_reports_eof() {
        let mock = tokio_test::io::Builder::new().read(b"x").build();
        let mut transport = Transport::new(mock, TIMEOUT);
        assert_eq!(transport.read_byte().await.unwrap(), Some(b'x'));
        assert_eq!(transport.read_byte().await.unwrap(), None);
        assert_eq!(transport.read_byte().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_exact_eof_is_error_and_sticky() {
        let mock = tokio_test::io::Builder::new().read(b"25").build();
        let mut transport = Transport::new(mock, TIMEOUT);
        let err = transport.read_exact(4).await.unwrap_err();
        assert!(matches!(err, Error::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
        assert!(transport.has_failed());
        assert!(matches!(
            transport.write(b"QUIT\r\n").await,
            Err(Error::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_write_sends_everything() {
        let (client, mut server) = tokio::io::duplex(16);
        let mut transport = Transport::new(client, TIMEOUT);
        let payload = vec![b'a'; 1000];

        let reader = tokio::spawn(async move {
            let mut got = Vec::new();
            server.read_to_end(&mut got).await.unwrap();
            got
        });
        assert_eq!(transport.write(&payload).await.unwrap(), 1000);
        transport.close().await;
        assert_eq!(reader.await.unwrap(), payload);
    }

    #[tokio::test]
    async fn test_write_to_closed_peer_fails() {
        let (client, server) = tokio::io::duplex(16);
        drop(server);
        let mut transport = Transport::new(client, TIMEOUT);
        assert!(matches!(transport.write(b"DATA\r\n").await, Err(Error::Io(_))));
        assert!(transport.has_failed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_peer_times_out() {
        let (client, _server) = tokio::io::duplex(64);
        let mut transport = Transport::new(client, Duration::from_secs(1));
        let err = transport.read_exact(4).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(d) if d == Duration::from_secs(1)));
        assert!(transport.has_failed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_read_gets_fresh_deadline() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut transport = Transport::new(client, Duration::from_secs(2));
        let feeder = tokio::spawn(async move {
            for chunk in [b"2", b"5", b"0", b" "] {
                tokio::time::sleep(Duration::from_millis(1500)).await;
                server.write_all(chunk).await.unwrap();
            }
            server
        });
        // Total wait is 6s, but no single read waits longer than 1.5s.
        assert_eq!(transport.read_exact(4).await.unwrap(), b"250 ");
        drop(feeder.await.unwrap());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (client, _server) = tokio::io::duplex(16);
        let mut transport = Transport::new(client, TIMEOUT);
        transport.close().await;
        transport.close().await;
        assert!(transport.write(b"x").await.is_err());
    }

    #[tokio::test]
    async fn test_upgrade_refuses_buffered_plaintext() {
        let mock = tokio_test::io::Builder::new().read(b"220 go\r\n250 injected\r\n").build();
        let mut transport = Transport::new(mock, TIMEOUT);
        assert_eq!(transport.read_exact(8).await.unwrap(), b"220 go\r\n");
        let err = transport
            .upgrade_to_tls("mail.example.com", TlsVerification::Full)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn test_connect_refused_is_connect_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let err = Transport::connect("127.0.0.1", port, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, Error::Connect { port: p, .. } if p == port));
    }

    #[tokio::test]
    async fn test_relaxed_verification_accepts_self_signed() {
        let (client, server) = tokio::io::duplex(8192);
        let server = tokio::spawn(async move {
            let mut tls = self_signed_acceptor().accept(server).await.unwrap();
            tls.write_all(b"250 secure\r\n").await.unwrap();
            tls.flush().await.unwrap();
            let mut rest = Vec::new();
            let _ = tls.read_to_end(&mut rest).await;
        });

        let mut transport = Transport::new(client, TIMEOUT);
        transport
            .upgrade_to_tls("localhost", TlsVerification::PeerCertificateOnly)
            .await
            .unwrap();
        assert!(transport.is_tls());
        assert_eq!(transport.read_exact(12).await.unwrap(), b"250 secure\r\n");
        transport.close().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_full_verification_rejects_self_signed() {
        let (client, server) = tokio::io::duplex(8192);
        let server = tokio::spawn(async move {
            assert!(self_signed_acceptor().accept(server).await.is_err());
        });

        let mut transport = Transport::new(client, TIMEOUT);
        let err = transport
            .upgrade_to_tls("localhost", TlsVerification::Full)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Tls(rustls::Error::InvalidCertificate(_))));
        assert!(err.is_tls());
        assert!(transport.has_failed());
        assert!(!transport.is_tls());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_second_upgrade_is_refused() {
        let (client, server) = tokio::io::duplex(8192);
        let server = tokio::spawn(async move {
            let mut tls = self_signed_acceptor().accept(server).await.unwrap();
            let mut rest = Vec::new();
            let _ = tls.read_to_end(&mut rest).await;
        });

        let mut transport = Transport::new(client, TIMEOUT);
        transport
            .upgrade_to_tls("localhost", TlsVerification::PeerCertificateOnly)
            .await
            .unwrap();
        let err = transport
            .upgrade_to_tls("localhost", TlsVerification::PeerCertificateOnly)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        drop(transport);
        server.await.unwrap();
    }
}
