//! # dmcc-protocol
//!
//! Wire protocol implementation for DMCC (CSTA XML without SOAP, ECMA-323 Annex J).
//!
//! This crate provides:
//! - The 8-byte frame header (version, total length, invoke id)
//! - Frame encoding and decoding, both one-shot and incremental
//! - The opaque 4-byte invoke id used to correlate requests and responses
//! - Protocol error types

pub mod codec;
pub mod error;
pub mod frame;
pub mod invoke;

pub use codec::Decoder;
pub use error::ProtocolError;
pub use frame::{decode_payload, encode, Frame, FrameHeader, FRAME_HEADER_SIZE};
pub use invoke::InvokeId;

/// Protocol version written in every frame header.
pub const PROTOCOL_VERSION: u16 = 0;

/// Default port of the secure DMCC service.
pub const DEFAULT_PORT: u16 = 4722;

/// Maximum payload size: the total length field is 16 bits and includes the header.
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize - FRAME_HEADER_SIZE;
