//! Background receive loop.
//!
//! The loop owns the read half of the transport and is the only writer of
//! the response table. Between frames it wakes at least once per read
//! timeout to check the "all done" flag.

use crate::connection::{ConnectionState, Shared};
use crate::error::ClientError;
use crate::table::ResponseTable;
use crate::transport::TransportReader;
use dmcc_protocol::{
    decode_payload, FrameHeader, ProtocolError, FRAME_HEADER_SIZE, PROTOCOL_VERSION,
};
use std::sync::Arc;

/// Why the receive loop stopped.
#[derive(Debug)]
pub enum ReceiveOutcome {
    /// The client raised the "all done" flag.
    Stopped,
    /// The peer closed the stream between frames.
    PeerClosed,
    /// A socket or decode error ended the connection.
    Failed(ClientError),
}

pub(crate) struct Receiver {
    reader: TransportReader,
    table: Arc<ResponseTable>,
    shared: Arc<Shared>,
}

impl Receiver {
    pub(crate) fn new(
        reader: TransportReader,
        table: Arc<ResponseTable>,
        shared: Arc<Shared>,
    ) -> Self {
        Self {
            reader,
            table,
            shared,
        }
    }

    /// Drains frames into the table until done, peer close or failure.
    ///
    /// The "done" flag is only checked between frames. A peer that stalls
    /// inside a frame keeps the loop waiting, so shutdown ends it by aborting
    /// the task after the grace period.
    pub(crate) async fn run(mut self) -> ReceiveOutcome {
        tracing::debug!("Receive loop started");

        let outcome = loop {
            if self.shared.is_done() {
                break ReceiveOutcome::Stopped;
            }

            match self.receive_one().await {
                Ok(()) => {}
                Err(ClientError::Timeout) => {
                    tracing::trace!("No data received, iterating");
                }
                Err(ClientError::ConnectionClosed { received: 0, .. }) => {
                    tracing::debug!("Connection closed by peer");
                    break ReceiveOutcome::PeerClosed;
                }
                Err(e) => {
                    tracing::warn!("Receive loop failed: {}", e);
                    break ReceiveOutcome::Failed(e);
                }
            }
        };

        if !matches!(outcome, ReceiveOutcome::Stopped) {
            self.shared.set_state(ConnectionState::Closed);
        }
        tracing::debug!("Receive loop finished: {:?}", outcome);
        outcome
    }

    async fn receive_one(&mut self) -> Result<(), ClientError> {
        let header_bytes = match self.reader.receive_exactly(FRAME_HEADER_SIZE).await {
            Err(ClientError::ConnectionClosed { received, expected }) if received > 0 => {
                return Err(ProtocolError::MalformedHeader(format!(
                    "stream closed after {} of {} header bytes",
                    received, expected
                ))
                .into());
            }
            other => other?,
        };

        let header = FrameHeader::decode(&header_bytes)?;
        if header.version != PROTOCOL_VERSION {
            tracing::warn!(
                "Unexpected protocol version {} for invoke_id={}",
                header.version,
                header.invoke_id
            );
        }

        let body = match self.reader.receive_continuation(header.payload_len()).await {
            Err(ClientError::ConnectionClosed { received, expected }) => {
                return Err(ProtocolError::MalformedHeader(format!(
                    "stream closed after {} of {} payload bytes for invoke_id={}",
                    received, expected, header.invoke_id
                ))
                .into());
            }
            other => other?,
        };
        let payload = decode_payload(&body, header.total_length)?;

        tracing::debug!(
            "Message received - invoke_id={} ({} bytes)",
            header.invoke_id,
            payload.len()
        );
        self.table.put(header.invoke_id, payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::split;
    use dmcc_protocol::{encode, InvokeId};
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    fn id(s: &str) -> InvokeId {
        s.parse().unwrap()
    }

    fn start(
        read_timeout: Duration,
    ) -> (
        tokio::io::DuplexStream,
        Arc<ResponseTable>,
        Arc<Shared>,
        tokio::task::JoinHandle<ReceiveOutcome>,
    ) {
        let (client, peer) = tokio::io::duplex(64 * 1024);
        let (reader, _writer) = split(client, read_timeout);
        let table = Arc::new(ResponseTable::new());
        let shared = Arc::new(Shared::new());
        shared.set_state(ConnectionState::Open);
        let receiver = Receiver::new(reader, table.clone(), shared.clone());
        let handle = tokio::spawn(receiver.run());
        (peer, table, shared, handle)
    }

    #[tokio::test]
    async fn test_frames_land_in_table_in_order() {
        let (mut peer, table, shared, handle) = start(Duration::from_millis(100));

        peer.write_all(&encode(id("0001"), "<A/>").unwrap()).await.unwrap();
        peer.write_all(&encode(id("0002"), "<B/>").unwrap()).await.unwrap();
        drop(peer);

        let outcome = handle.await.unwrap();
        assert!(matches!(outcome, ReceiveOutcome::PeerClosed));
        assert_eq!(table.get(&id("0001")).as_deref(), Some("<A/>"));
        assert_eq!(table.get(&id("0002")).as_deref(), Some("<B/>"));
        assert_eq!(shared.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_same_id_overwrites() {
        let (mut peer, table, _shared, handle) = start(Duration::from_millis(100));

        peer.write_all(&encode(id("0005"), "<old/>").unwrap()).await.unwrap();
        peer.write_all(&encode(id("0005"), "<new/>").unwrap()).await.unwrap();
        drop(peer);

        handle.await.unwrap();
        assert_eq!(table.get(&id("0005")).as_deref(), Some("<new/>"));
    }

    #[tokio::test]
    async fn test_truncated_header_is_malformed() {
        let (mut peer, table, shared, handle) = start(Duration::from_millis(100));

        peer.write_all(b"\x00\x00\x00\x0e0").await.unwrap();
        drop(peer);

        let outcome = handle.await.unwrap();
        assert!(matches!(
            outcome,
            ReceiveOutcome::Failed(ClientError::Protocol(ProtocolError::MalformedHeader(_)))
        ));
        assert!(table.is_empty());
        assert_eq!(shared.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_close_after_header_is_malformed() {
        let (mut peer, table, shared, handle) = start(Duration::from_millis(100));

        peer.write_all(b"\x00\x00\x00\x0e0001").await.unwrap();
        drop(peer);

        let outcome = handle.await.unwrap();
        assert!(matches!(
            outcome,
            ReceiveOutcome::Failed(ClientError::Protocol(ProtocolError::MalformedHeader(_)))
        ));
        assert!(table.is_empty());
        assert_eq!(shared.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_invalid_length_stops_loop() {
        let (mut peer, _table, shared, handle) = start(Duration::from_millis(100));

        peer.write_all(b"\x00\x00\x00\x030001").await.unwrap();

        let outcome = handle.await.unwrap();
        assert!(matches!(
            outcome,
            ReceiveOutcome::Failed(ClientError::Protocol(ProtocolError::MalformedHeader(_)))
        ));
        assert_eq!(shared.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_invalid_utf8_stops_loop() {
        let (mut peer, table, _shared, handle) = start(Duration::from_millis(100));

        peer.write_all(b"\x00\x00\x00\x0a0001\xc3\x28").await.unwrap();

        let outcome = handle.await.unwrap();
        assert!(matches!(
            outcome,
            ReceiveOutcome::Failed(ClientError::Protocol(ProtocolError::InvalidUtf8))
        ));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_done_flag_stops_idle_loop() {
        let (_peer, _table, shared, handle) = start(Duration::from_millis(50));

        // Let the loop go through a few idle timeouts first.
        tokio::time::sleep(Duration::from_millis(120)).await;
        shared.signal_done();

        let outcome = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop should stop within one read timeout")
            .unwrap();
        assert!(matches!(outcome, ReceiveOutcome::Stopped));
        assert_eq!(shared.state(), ConnectionState::Open);
    }

    #[tokio::test]
    async fn test_slow_payload_is_not_dropped() {
        let (mut peer, table, _shared, handle) = start(Duration::from_millis(50));

        let frame = encode(id("0009"), "<SlowResponse/>").unwrap();
        peer.write_all(&frame[..10]).await.unwrap();
        // Longer than the idle read timeout
        tokio::time::sleep(Duration::from_millis(150)).await;
        peer.write_all(&frame[10..]).await.unwrap();
        drop(peer);

        handle.await.unwrap();
        assert_eq!(table.get(&id("0009")).as_deref(), Some("<SlowResponse/>"));
    }

    #[tokio::test]
    async fn test_header_split_across_idle_timeout() {
        let first = encode(id("0001"), "<MonitorStartResponse/>").unwrap();
        let second = encode(id("0002"), "<Ack/>").unwrap();
        let mock = tokio_test::io::Builder::new()
            .read(&first[..3])
            .wait(Duration::from_millis(150))
            .read(&first[3..])
            .read(&second)
            .build();

        let (reader, _writer) = split(mock, Duration::from_millis(50));
        let table = Arc::new(ResponseTable::new());
        let shared = Arc::new(Shared::new());
        shared.set_state(ConnectionState::Open);

        let outcome = Receiver::new(reader, table.clone(), shared.clone())
            .run()
            .await;

        assert!(matches!(outcome, ReceiveOutcome::PeerClosed));
        assert_eq!(
            table.get(&id("0001")).as_deref(),
            Some("<MonitorStartResponse/>")
        );
        assert_eq!(table.get(&id("0002")).as_deref(), Some("<Ack/>"));
    }
}
