//! Connection configuration and lifecycle state.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

/// Default TCP connect / TLS handshake timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default idle read timeout of the receive loop.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Default interval at which `read` re-checks the response table.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Lower bound for the poll interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Lower bound for the idle read timeout; the receive loop spins below it.
pub const MIN_READ_TIMEOUT: Duration = Duration::from_millis(10);

/// TLS trust and identity configuration.
///
/// Server certificate verification is always on; these settings only choose
/// which roots to trust and whether to present a client certificate.
#[derive(Debug, Clone, Default)]
pub struct TlsClientConfig {
    /// Path to PEM-encoded CA certificate(s) for server verification.
    /// If None, the bundled Mozilla roots are used.
    pub ca_cert_path: Option<PathBuf>,
    /// Path to PEM-encoded client certificate (for mTLS).
    pub client_cert_path: Option<PathBuf>,
    /// Path to PEM-encoded client private key (for mTLS).
    pub client_key_path: Option<PathBuf>,
}

impl TlsClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    pub fn with_client_cert(
        mut self,
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
    ) -> Self {
        self.client_cert_path = Some(cert_path.into());
        self.client_key_path = Some(key_path.into());
        self
    }
}

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Host name or IP address to dial.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Name the server certificate must match (defaults to `host`).
    pub server_name: Option<String>,
    /// Bound on TCP connect and on the TLS handshake, each.
    pub connect_timeout: Duration,
    /// Idle read timeout; also bounds how long shutdown waits for the receive loop to notice.
    pub read_timeout: Duration,
    /// Fallback re-check interval for `read`.
    pub poll_interval: Duration,
    /// How long shutdown waits for the receive loop before aborting it.
    pub shutdown_grace: Option<Duration>,
    /// TLS configuration.
    pub tls: TlsClientConfig,
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            server_name: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            shutdown_grace: None,
            tls: TlsClientConfig::default(),
        }
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout.max(MIN_READ_TIMEOUT);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = Some(grace);
        self
    }

    pub fn with_tls(mut self, tls_config: TlsClientConfig) -> Self {
        self.tls = tls_config;
        self
    }

    /// Name used for SNI and certificate hostname verification.
    pub fn server_name(&self) -> &str {
        self.server_name.as_deref().unwrap_or(&self.host)
    }

    /// Effective shutdown grace: explicit value, or one read timeout plus a second.
    pub fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace
            .unwrap_or(self.read_timeout.saturating_add(Duration::from_secs(1)))
    }
}

/// Lifecycle of a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Open = 1,
    Draining = 2,
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Open,
            2 => ConnectionState::Draining,
            _ => ConnectionState::Closed,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Draining => write!(f, "draining"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// State shared between the client and its receive loop.
#[derive(Debug)]
pub(crate) struct Shared {
    state: AtomicU8,
    done: AtomicBool,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            done: AtomicBool::new(false),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        let prev = self.state.swap(state as u8, Ordering::SeqCst);
        if prev != state as u8 {
            tracing::debug!(
                "Connection state {} -> {}",
                ConnectionState::from_u8(prev),
                state
            );
        }
    }

    /// Moves `from` to `to`; returns false if the current state was not `from`.
    pub(crate) fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        let moved = self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if moved {
            tracing::debug!("Connection state {} -> {}", from, to);
        }
        moved
    }

    /// Raises the "all done" flag observed by the receive loop.
    pub(crate) fn signal_done(&self) {
        self.done.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }
}
