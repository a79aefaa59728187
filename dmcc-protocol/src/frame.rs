//! Binary frame format for DMCC.
//!
//! Frame layout (8 bytes header + payload), all integers big-endian:
//!
//! ```text
//! +---------+--------------+-----------+------------------------+
//! | version | total_length | invoke_id | payload (UTF-8 XML)    |
//! | 2 bytes |   2 bytes    |  4 bytes  | total_length - 8 bytes |
//! +---------+--------------+-----------+------------------------+
//! ```
//!
//! `total_length` counts the header itself, so an empty payload has a total
//! length of 8.

use crate::error::ProtocolError;
use crate::invoke::InvokeId;
use crate::MAX_PAYLOAD_SIZE;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the fixed frame header in bytes (2+2+4 = 8).
pub const FRAME_HEADER_SIZE: usize = 8;

/// A parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Protocol version.
    pub version: u16,
    /// Header plus payload length.
    pub total_length: u16,
    /// Correlation token.
    pub invoke_id: InvokeId,
}

impl FrameHeader {
    /// Parses the first 8 bytes of `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Err(ProtocolError::MalformedHeader(format!(
                "need {} bytes, got {}",
                FRAME_HEADER_SIZE,
                buf.len()
            )));
        }

        let version = u16::from_be_bytes([buf[0], buf[1]]);
        let total_length = u16::from_be_bytes([buf[2], buf[3]]);
        if (total_length as usize) < FRAME_HEADER_SIZE {
            return Err(ProtocolError::MalformedHeader(format!(
                "total length {} is shorter than the header",
                total_length
            )));
        }
        let invoke_id = InvokeId::try_from(&buf[4..FRAME_HEADER_SIZE])?;

        Ok(Self {
            version,
            total_length,
            invoke_id,
        })
    }

    /// Number of payload bytes following the header.
    pub fn payload_len(&self) -> usize {
        self.total_length as usize - FRAME_HEADER_SIZE
    }
}

/// Decodes a payload of `total_length - 8` bytes into a string.
pub fn decode_payload(buf: &[u8], total_length: u16) -> Result<String, ProtocolError> {
    let expected = (total_length as usize)
        .checked_sub(FRAME_HEADER_SIZE)
        .ok_or_else(|| {
            ProtocolError::MalformedHeader(format!(
                "total length {} is shorter than the header",
                total_length
            ))
        })?;
    if buf.len() != expected {
        return Err(ProtocolError::MalformedHeader(format!(
            "declared payload of {} bytes, got {}",
            expected,
            buf.len()
        )));
    }
    std::str::from_utf8(buf)
        .map(str::to_owned)
        .map_err(|_| ProtocolError::InvalidUtf8)
}

/// A DMCC frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Protocol version.
    pub version: u16,
    /// Correlation token.
    pub invoke_id: InvokeId,
    /// Frame payload (XML document).
    pub payload: Bytes,
}

impl Frame {
    /// Creates a new frame with the current protocol version.
    pub fn new(invoke_id: InvokeId, payload: impl Into<Bytes>) -> Self {
        Self {
            version: crate::PROTOCOL_VERSION,
            invoke_id,
            payload: payload.into(),
        }
    }

    /// Total length as written in the header.
    pub fn total_length(&self) -> usize {
        FRAME_HEADER_SIZE + self.payload.len()
    }

    /// Returns the payload as UTF-8 text.
    pub fn payload_str(&self) -> Result<&str, ProtocolError> {
        std::str::from_utf8(&self.payload).map_err(|_| ProtocolError::InvalidUtf8)
    }

    /// Encodes the frame into bytes.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        if self.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: self.payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let total_length = self.total_length();
        let mut buf = BytesMut::with_capacity(total_length);

        // Version (2 bytes)
        buf.put_u16(self.version);

        // Total length (2 bytes)
        buf.put_u16(total_length as u16);

        // Invoke id (4 bytes)
        buf.put_slice(self.invoke_id.as_bytes());

        // Payload
        buf.put_slice(&self.payload);

        Ok(buf)
    }

    /// Decodes a frame from the front of `buf`.
    ///
    /// Returns `Ok(Some(frame))` if a complete frame was decoded,
    /// `Ok(None)` if more data is needed, or `Err` on protocol errors.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let header = FrameHeader::decode(&buf[..FRAME_HEADER_SIZE])?;
        let total_length = header.total_length as usize;
        if buf.len() < total_length {
            return Ok(None);
        }

        buf.advance(FRAME_HEADER_SIZE);
        let payload = buf.split_to(header.payload_len()).freeze();

        Ok(Some(Self {
            version: header.version,
            invoke_id: header.invoke_id,
            payload,
        }))
    }
}

/// Encodes a text payload under `invoke_id`.
pub fn encode(invoke_id: InvokeId, payload: &str) -> Result<BytesMut, ProtocolError> {
    Frame::new(invoke_id, Bytes::copy_from_slice(payload.as_bytes())).encode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn id(s: &str) -> InvokeId {
        s.parse().unwrap()
    }

    #[test]
    fn test_encode_fixed_bytes() {
        let encoded = encode(id("0001"), "<Ack/>").unwrap();
        assert_eq!(&encoded[..], b"\x00\x00\x00\x0e0001<Ack/>");
    }

    #[test]
    fn test_decode_header_fixed_bytes() {
        let header = FrameHeader::decode(b"\x00\x00\x01\x000042").unwrap();
        assert_eq!(header.version, 0);
        assert_eq!(header.total_length, 256);
        assert_eq!(header.invoke_id, id("0042"));
        assert_eq!(header.payload_len(), 248);
    }

    #[test]
    fn test_decode_header_short() {
        let result = FrameHeader::decode(b"\x00\x00\x00");
        assert!(matches!(result, Err(ProtocolError::MalformedHeader(_))));
    }

    #[test]
    fn test_decode_header_length_below_header_size() {
        let result = FrameHeader::decode(b"\x00\x00\x00\x050001");
        assert!(matches!(result, Err(ProtocolError::MalformedHeader(_))));
    }

    #[test]
    fn test_decode_header_keeps_unknown_version() {
        let header = FrameHeader::decode(b"\x00\x07\x00\x08abcd").unwrap();
        assert_eq!(header.version, 7);
        assert_eq!(header.payload_len(), 0);
    }

    #[test]
    fn test_decode_payload() {
        assert_eq!(decode_payload(b"<Ack/>", 14).unwrap(), "<Ack/>");
        assert_eq!(decode_payload(b"", 8).unwrap(), "");
    }

    #[test]
    fn test_decode_payload_length_mismatch() {
        let result = decode_payload(b"<Ack/>", 20);
        assert!(matches!(result, Err(ProtocolError::MalformedHeader(_))));

        let result = decode_payload(b"", 4);
        assert!(matches!(result, Err(ProtocolError::MalformedHeader(_))));
    }

    #[test]
    fn test_decode_payload_invalid_utf8() {
        let result = decode_payload(&[0xc3, 0x28], 10);
        assert!(matches!(result, Err(ProtocolError::InvalidUtf8)));
    }

    #[test]
    fn test_payload_too_large() {
        let huge = "x".repeat(MAX_PAYLOAD_SIZE + 1);
        let result = encode(id("0001"), &huge);
        assert!(matches!(
            result,
            Err(ProtocolError::PayloadTooLarge { size, max }) if size == 65528 && max == 65527
        ));
    }

    #[test]
    fn test_max_payload_fits() {
        let max = "x".repeat(MAX_PAYLOAD_SIZE);
        let encoded = encode(id("9999"), &max).unwrap();
        assert_eq!(encoded.len(), u16::MAX as usize);
        assert_eq!(&encoded[2..4], &[0xff, 0xff]);
    }

    #[test]
    fn test_multibyte_payload_counts_bytes() {
        let payload = "<n>héllo</n>";
        let encoded = encode(id("0003"), payload).unwrap();
        let header = FrameHeader::decode(&encoded).unwrap();
        assert_eq!(header.payload_len(), payload.len());
        assert_ne!(header.payload_len(), payload.chars().count());
    }

    #[test]
    fn test_incomplete_frame() {
        let encoded = encode(id("0001"), "<Ack/>").unwrap();
        let mut buf = BytesMut::from(&encoded[..10]);
        assert!(Frame::decode(&mut buf).unwrap().is_none());
        // Nothing consumed while incomplete
        assert_eq!(buf.len(), 10);
    }

    #[test]
    fn test_multiple_frames_in_buffer() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&encode(id("0001"), "<A/>").unwrap());
        buf.extend_from_slice(&encode(id("0002"), "<B/>").unwrap());

        let first = Frame::decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.invoke_id, id("0001"));
        assert_eq!(first.payload_str().unwrap(), "<A/>");

        let second = Frame::decode(&mut buf).unwrap().unwrap();
        assert_eq!(second.invoke_id, id("0002"));
        assert_eq!(second.payload_str().unwrap(), "<B/>");

        assert!(buf.is_empty());
    }

    proptest! {
        #[test]
        fn prop_roundtrip(raw_id in any::<[u8; 4]>(), payload in ".{0,512}") {
            let invoke_id = InvokeId::new(raw_id);
            let mut buf = encode(invoke_id, &payload).unwrap();

            let header = FrameHeader::decode(&buf).unwrap();
            prop_assert_eq!(header.total_length as usize, FRAME_HEADER_SIZE + payload.len());

            let frame = Frame::decode(&mut buf).unwrap().unwrap();
            prop_assert_eq!(frame.invoke_id, invoke_id);
            prop_assert_eq!(frame.payload_str().unwrap(), payload.as_str());
        }

        #[test]
        fn prop_header_then_payload(len in 0usize..4096) {
            let payload = "a".repeat(len);
            let encoded = encode(InvokeId::new(*b"0010"), &payload).unwrap();
            let header = FrameHeader::decode(&encoded).unwrap();
            let decoded = decode_payload(&encoded[FRAME_HEADER_SIZE..], header.total_length).unwrap();
            prop_assert_eq!(decoded.len(), len);
        }
    }
}
