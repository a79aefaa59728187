//! Caller-facing client: open, send, read, shutdown.

use crate::connection::{ConnectionConfig, ConnectionState, Shared};
use crate::error::ClientError;
use crate::receiver::{ReceiveOutcome, Receiver};
use crate::table::ResponseTable;
use crate::transport::{self, TransportWriter};
use dmcc_protocol::{encode, InvokeId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// A DMCC client session.
///
/// Requests are written by callers with [`send`](Self::send); responses are
/// collected by a background receive loop and picked up with
/// [`read`](Self::read) using the same invoke id.
pub struct Client {
    config: ConnectionConfig,
    /// Write half of the stream; the lock keeps concurrent frames from interleaving.
    writer: Mutex<TransportWriter>,
    table: Arc<ResponseTable>,
    shared: Arc<Shared>,
    receiver: Mutex<Option<JoinHandle<ReceiveOutcome>>>,
    shutdown_started: AtomicBool,
}

impl Client {
    /// Connects to the server, completes the TLS handshake and starts the receive loop.
    pub async fn open(config: ConnectionConfig) -> Result<Self, ClientError> {
        Self::open_with_table(config, Arc::new(ResponseTable::new())).await
    }

    /// Like [`open`](Self::open), publishing responses into the given table.
    pub async fn open_with_table(
        config: ConnectionConfig,
        table: Arc<ResponseTable>,
    ) -> Result<Self, ClientError> {
        let shared = Arc::new(Shared::new());
        let stream = transport::connect(&config).await?;
        tracing::debug!(
            "Connected to {} ({}:{})",
            config.server_name(),
            config.host,
            config.port
        );
        Ok(Self::start(stream, config, table, shared))
    }

    /// Starts a client over an already established byte stream.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn from_stream<S>(stream: S, config: ConnectionConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::from_stream_with_table(stream, config, Arc::new(ResponseTable::new()))
    }

    pub fn from_stream_with_table<S>(
        stream: S,
        config: ConnectionConfig,
        table: Arc<ResponseTable>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::start(stream, config, table, Arc::new(Shared::new()))
    }

    fn start<S>(
        stream: S,
        config: ConnectionConfig,
        table: Arc<ResponseTable>,
        shared: Arc<Shared>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = transport::split(stream, config.read_timeout);

        shared.set_state(ConnectionState::Open);
        let receiver = Receiver::new(reader, table.clone(), shared.clone());
        let handle = tokio::spawn(receiver.run());

        Self {
            config,
            writer: Mutex::new(writer),
            table,
            shared,
            receiver: Mutex::new(Some(handle)),
            shutdown_started: AtomicBool::new(false),
        }
    }

    /// Returns the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Returns whether requests can be sent.
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Returns the response table this client publishes into.
    pub fn table(&self) -> &Arc<ResponseTable> {
        &self.table
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Encodes `payload` under `invoke_id` and writes it as one frame.
    ///
    /// Fails fast with [`ClientError::NotConnected`] once the connection has
    /// left the open state.
    pub async fn send(&self, payload: &str, invoke_id: InvokeId) -> Result<(), ClientError> {
        if !self.is_open() {
            tracing::debug!("send() called on a {} connection", self.state());
            return Err(ClientError::NotConnected);
        }

        let encoded = encode(invoke_id, payload)?;

        let result = self.writer.lock().await.send_all(&encoded).await;
        if let Err(ref e) = result {
            tracing::debug!("Send failed for invoke_id={}: {}", invoke_id, e);
            if matches!(e, ClientError::Connection(_)) {
                self.shared.set_state(ConnectionState::Closed);
            }
            return result;
        }

        tracing::debug!(
            "Message sent - invoke_id={} ({} bytes)",
            invoke_id,
            encoded.len()
        );
        tracing::debug!("{}", payload);
        Ok(())
    }

    /// Waits up to `timeout` for the response to `invoke_id`.
    ///
    /// Returns as soon as the response is in the table, or `None` once the
    /// deadline passes. The entry stays in the table either way.
    pub async fn read(&self, invoke_id: InvokeId, timeout: Duration) -> Option<String> {
        // Durations past the clock's range mean "no deadline".
        let deadline = Instant::now().checked_add(timeout);

        loop {
            let notified = self.table.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(payload) = self.table.get(&invoke_id) {
                return Some(payload);
            }

            let now = Instant::now();
            if deadline.is_some_and(|d| now >= d) {
                tracing::debug!("No response for invoke_id={} within {:?}", invoke_id, timeout);
                return None;
            }

            let wake_at = match deadline {
                Some(d) => (now + self.config.poll_interval).min(d),
                None => now + self.config.poll_interval,
            };
            let _ = tokio::time::timeout_at(wake_at, notified).await;
        }
    }

    /// Like [`read`](Self::read) with a timeout in whole seconds.
    pub async fn read_secs(&self, invoke_id: InvokeId, timeout_secs: u64) -> Option<String> {
        self.read(invoke_id, Duration::from_secs(timeout_secs)).await
    }

    /// Stops the receive loop and closes the transport.
    ///
    /// Only the first call does anything; later calls return `Ok(())`.
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        if self.shutdown_started.swap(true, Ordering::SeqCst) {
            tracing::debug!("Shutdown already performed");
            return Ok(());
        }

        tracing::debug!("Shutting down...");
        self.shared.signal_done();
        self.shared
            .transition(ConnectionState::Open, ConnectionState::Draining);

        if let Some(handle) = self.receiver.lock().await.take() {
            let grace = self.config.shutdown_grace();
            let abort = handle.abort_handle();
            match tokio::time::timeout(grace, handle).await {
                Ok(Ok(outcome)) => tracing::debug!("Receive loop exited: {:?}", outcome),
                Ok(Err(e)) => tracing::warn!("Receive loop task failed: {}", e),
                Err(_) => {
                    tracing::warn!("Receive loop still busy after {:?}, aborting", grace);
                    abort.abort();
                }
            }
        }

        if self.writer.lock().await.close().await {
            tracing::debug!("Transport closed");
        }

        let dropped = self.table.len();
        self.table.clear();
        self.shared.set_state(ConnectionState::Closed);
        tracing::debug!("Shutdown complete ({} responses dropped)", dropped);
        Ok(())
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        // Lets a receive loop outlive an un-shutdown client by at most one read timeout.
        self.shared.signal_done();
    }
}
