//! Invoke id: the 4-byte correlation token carried in every frame header.

use crate::error::ProtocolError;
use std::fmt;
use std::str::FromStr;

/// Size of an invoke id on the wire.
pub const INVOKE_ID_SIZE: usize = 4;

/// Opaque 4-byte token linking a request to its response.
///
/// In practice servers use four ASCII digits (`"0001"`), but the codec never
/// interprets the bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InvokeId([u8; INVOKE_ID_SIZE]);

impl InvokeId {
    pub const fn new(bytes: [u8; INVOKE_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Builds a four-digit decimal id (`7` becomes `"0007"`).
    ///
    /// Returns `None` for values above 9999.
    pub fn from_number(n: u16) -> Option<Self> {
        if n > 9999 {
            return None;
        }
        let s = format!("{:04}", n);
        let mut bytes = [0u8; INVOKE_ID_SIZE];
        bytes.copy_from_slice(s.as_bytes());
        Some(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; INVOKE_ID_SIZE] {
        &self.0
    }
}

impl TryFrom<&[u8]> for InvokeId {
    type Error = ProtocolError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; INVOKE_ID_SIZE] = value
            .try_into()
            .map_err(|_| ProtocolError::InvalidInvokeId(value.len()))?;
        Ok(Self(bytes))
    }
}

impl TryFrom<&str> for InvokeId {
    type Error = ProtocolError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.as_bytes())
    }
}

impl FromStr for InvokeId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s)
    }
}

impl From<[u8; INVOKE_ID_SIZE]> for InvokeId {
    fn from(bytes: [u8; INVOKE_ID_SIZE]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for InvokeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => f.write_str(s),
            Err(_) => write!(f, "{:02x?}", self.0),
        }
    }
}
