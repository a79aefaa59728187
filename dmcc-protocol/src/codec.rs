//! Incremental decoder for a stream of DMCC frames.

use crate::error::ProtocolError;
use crate::frame::Frame;
use bytes::{Bytes, BytesMut};

/// Accumulates stream bytes and cuts them into frames.
///
/// Frames carry no resync marker, so after a decode error the remaining
/// bytes are meaningless; callers should drop the decoder (or `clear` it)
/// along with the connection.
#[derive(Debug)]
pub struct Decoder {
    pending: BytesMut,
}

impl Decoder {
    pub fn new() -> Self {
        Self::with_capacity(8 * 1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pending: BytesMut::with_capacity(capacity),
        }
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
    }

    pub fn extend_bytes(&mut self, data: Bytes) {
        self.extend(&data);
    }

    /// Next complete frame, or `Ok(None)` until enough bytes have arrived.
    pub fn decode_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        Frame::decode(&mut self.pending)
    }

    /// Every frame that is complete so far.
    pub fn drain_frames(&mut self) -> Result<Vec<Frame>, ProtocolError> {
        let mut frames = Vec::new();
        while let Some(frame) = self.decode_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Bytes held back waiting for the rest of a frame.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
