//! Secure transport: TCP + TLS connect and the two halves of the byte stream.

use crate::connection::ConnectionConfig;
use crate::error::ClientError;
use crate::tls::create_tls_connector;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

/// Connects to the configured server and completes the TLS handshake.
///
/// The TCP connect and the handshake are each bounded by the connect timeout.
pub async fn connect(config: &ConnectionConfig) -> Result<TlsStream<TcpStream>, ClientError> {
    let (connector, server_name) = create_tls_connector(&config.tls, config.server_name())?;

    tracing::debug!("Connecting to {}:{}...", config.host, config.port);

    let tcp_stream = tokio::time::timeout(
        config.connect_timeout,
        TcpStream::connect((config.host.as_str(), config.port)),
    )
    .await
    .map_err(|_| {
        tracing::debug!("Timeout when trying to connect, check server availability");
        ClientError::ConnectTimeout
    })?
    .map_err(|e| {
        tracing::debug!("Connection failed: {}", e);
        ClientError::Connection(e)
    })?;

    tcp_stream.set_nodelay(true).ok();

    tracing::debug!("Performing TLS handshake with {}...", config.server_name());
    let tls_stream = tokio::time::timeout(
        config.connect_timeout,
        connector.connect(server_name, tcp_stream),
    )
    .await
    .map_err(|_| {
        tracing::debug!("TLS handshake timeout");
        ClientError::ConnectTimeout
    })?
    .map_err(|e| ClientError::Handshake(e.to_string()))?;

    let (tcp, session) = tls_stream.get_ref();
    tracing::debug!(
        peer = ?tcp.peer_addr().ok(),
        version = ?session.protocol_version(),
        cipher = ?session.negotiated_cipher_suite(),
        peer_certs = session.peer_certificates().map_or(0, |c| c.len()),
        "TLS handshake complete"
    );

    Ok(tls_stream)
}

/// Splits an established stream into a reader for the receive loop and a writer for senders.
pub fn split<S>(stream: S, read_timeout: Duration) -> (TransportReader, TransportWriter)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    (
        TransportReader::new(read_half, read_timeout),
        TransportWriter::new(write_half),
    )
}

/// Read side of the transport.
pub struct TransportReader {
    inner: Box<dyn AsyncRead + Send + Unpin>,
    read_timeout: Duration,
}

impl TransportReader {
    pub fn new<R>(reader: R, read_timeout: Duration) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            inner: Box::new(reader),
            read_timeout,
        }
    }

    /// Reads exactly `n` bytes.
    ///
    /// Fails with [`ClientError::Timeout`] if nothing arrives within the read
    /// timeout. Once the first byte is in, the rest is awaited without a
    /// deadline so a slow sender cannot desynchronise the stream.
    pub async fn receive_exactly(&mut self, n: usize) -> Result<Vec<u8>, ClientError> {
        let idle = self.read_timeout;
        self.fill(n, Some(idle)).await
    }

    /// Reads exactly `n` bytes that continue a unit already started.
    pub async fn receive_continuation(&mut self, n: usize) -> Result<Vec<u8>, ClientError> {
        self.fill(n, None).await
    }

    async fn fill(&mut self, n: usize, idle: Option<Duration>) -> Result<Vec<u8>, ClientError> {
        let mut buf = vec![0u8; n];
        let mut filled = 0;

        while filled < n {
            let read = match idle {
                Some(limit) if filled == 0 => {
                    tokio::time::timeout(limit, self.inner.read(&mut buf[filled..]))
                        .await
                        .map_err(|_| ClientError::Timeout)?
                }
                _ => self.inner.read(&mut buf[filled..]).await,
            };

            match read {
                Ok(0) => {
                    return Err(ClientError::ConnectionClosed {
                        received: filled,
                        expected: n,
                    })
                }
                Ok(count) => filled += count,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Err(ClientError::ConnectionClosed {
                        received: filled,
                        expected: n,
                    })
                }
                Err(e) => return Err(ClientError::Connection(e)),
            }
        }

        Ok(buf)
    }
}

/// Write side of the transport.
pub struct TransportWriter {
    inner: Option<Box<dyn AsyncWrite + Send + Unpin>>,
}

impl TransportWriter {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            inner: Some(Box::new(writer)),
        }
    }

    /// Writes and flushes all of `bytes`.
    pub async fn send_all(&mut self, bytes: &[u8]) -> Result<(), ClientError> {
        let writer = self.inner.as_mut().ok_or(ClientError::NotConnected)?;
        writer.write_all(bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Shuts the write side down and releases it. Returns false if already closed.
    pub async fn close(&mut self) -> bool {
        match self.inner.take() {
            Some(mut writer) => {
                if let Err(e) = writer.shutdown().await {
                    tracing::debug!("Error shutting down writer: {}", e);
                }
                true
            }
            None => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }
}
