//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors that can occur while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("invalid UTF-8 in payload")]
    InvalidUtf8,

    #[error("invalid invoke id: expected 4 bytes, got {0}")]
    InvalidInvokeId(usize),
}

impl ProtocolError {
    /// Returns whether this error comes from encoding an outgoing frame.
    pub fn is_encoding(&self) -> bool {
        matches!(
            self,
            ProtocolError::PayloadTooLarge { .. } | ProtocolError::InvalidInvokeId(_)
        )
    }
}
