//! # dmcc-client
//!
//! Client library for DMCC (CSTA XML over TLS).
//!
//! This crate provides:
//! - TLS transport with mandatory certificate and hostname verification
//! - A background receive loop that decodes frames into a response table
//! - Request/response correlation by invoke id with timeout-based reads
//! - Explicit connection lifecycle with idempotent shutdown

pub mod client;
pub mod connection;
pub mod error;
pub mod receiver;
pub mod table;
pub mod tls;
pub mod transport;

pub use client::Client;
pub use connection::{ConnectionConfig, ConnectionState, TlsClientConfig};
pub use error::ClientError;
pub use receiver::ReceiveOutcome;
pub use table::ResponseTable;
