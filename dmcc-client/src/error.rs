//! Client error types.

use dmcc_protocol::ProtocolError;
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("not connected")]
    NotConnected,

    #[error("connection closed by peer ({received} of {expected} bytes received)")]
    ConnectionClosed { received: usize, expected: usize },

    #[error("read timeout")]
    Timeout,

    #[error("connect timeout")]
    ConnectTimeout,

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("TLS handshake failed: {0}")]
    Handshake(String),
}

impl ClientError {
    /// Returns whether this error ends the connection.
    ///
    /// Only the idle read timeout is survivable; the receive loop treats it
    /// as a heartbeat.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ClientError::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_fatal() {
        assert!(!ClientError::Timeout.is_fatal());
        assert!(ClientError::ConnectTimeout.is_fatal());
        assert!(ClientError::NotConnected.is_fatal());
        assert!(ClientError::ConnectionClosed {
            received: 0,
            expected: 8
        }
        .is_fatal());
        assert!(ClientError::Protocol(ProtocolError::InvalidUtf8).is_fatal());
    }

    #[test]
    fn test_display() {
        let err = ClientError::ConnectionClosed {
            received: 5,
            expected: 8,
        };
        assert!(err.to_string().contains("5 of 8"));

        let err = ClientError::Handshake("invalid peer certificate".into());
        assert!(err.to_string().contains("invalid peer certificate"));
    }
}
