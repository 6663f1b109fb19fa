use std::io;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, trace, warn};

use super::commands::{self, TypedPayload};
use super::framer::FrameScanner;
use super::parser::{self, Packet, ParseError};

/// Destination for acknowledgment frames.
///
/// Writes are attempted once; there is no retry or flow control here. A
/// failed write means the connection is unusable and ends the session.
#[async_trait::async_trait]
pub trait AckWriter: Send {
    async fn write_ack(&mut self, ack: &[u8]) -> io::Result<()>;
}

/// [`AckWriter`] over any async byte sink, typically the write half of a socket
pub struct StreamAckWriter<W> {
    inner: W,
}

impl<W> StreamAckWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[async_trait::async_trait]
impl<W> AckWriter for StreamAckWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_ack(&mut self, ack: &[u8]) -> io::Result<()> {
        self.inner.write_all(ack).await?;
        self.inner.flush().await
    }
}

/// Receives the outcome of every frame a session processes
#[async_trait::async_trait]
pub trait PacketObserver: Send + Sync + 'static {
    /// Called for every parsed packet, before its acknowledgment is written
    async fn packet_decoded(&self, peer: &str, packet: &Packet, payload: &TypedPayload);

    /// Called for frames that failed to parse; no acknowledgment follows
    async fn frame_rejected(&self, peer: &str, frame: &str, error: &ParseError);
}

/// Observer that logs every outcome and counts it in metrics
#[derive(Debug, Clone, Default)]
pub struct TracingObserver;

#[async_trait::async_trait]
impl PacketObserver for TracingObserver {
    async fn packet_decoded(&self, peer: &str, packet: &Packet, payload: &TypedPayload) {
        info!(
            peer = %peer,
            imei = %packet.imei,
            command = %packet.command,
            valid = packet.valid,
            "{} packet",
            packet.command_name
        );
        match serde_json::to_string(payload) {
            Ok(json) => debug!(imei = %packet.imei, "payload: {}", json),
            Err(e) => warn!("Failed to serialize payload for {}: {}", packet.imei, e),
        }
        metrics::counter!("tracker.payloads_total", "kind" => payload.kind_name()).increment(1);
    }

    async fn frame_rejected(&self, peer: &str, frame: &str, error: &ParseError) {
        warn!(peer = %peer, "Rejected frame {:?}: {}", frame, error);
    }
}

/// Per-session counters, logged when the connection closes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub bytes_received: u64,
    pub frames: u64,
    pub packets: u64,
    pub invalid_checksums: u64,
    pub rejected: u64,
    pub unknown_commands: u64,
    pub acks_sent: u64,
}

/// Drives one device connection: framing, parsing, decoding and acknowledgment.
///
/// Owned by exactly one processing loop, so frames are handled strictly in
/// arrival order and each runs to completion before the next.
pub struct SessionHandler<W, O> {
    peer: String,
    scanner: FrameScanner,
    writer: W,
    observer: Arc<O>,
    stats: SessionStats,
}

impl<W, O> SessionHandler<W, O>
where
    W: AckWriter,
    O: PacketObserver,
{
    pub fn new(peer: impl Into<String>, scanner: FrameScanner, writer: W, observer: Arc<O>) -> Self {
        Self {
            peer: peer.into(),
            scanner,
            writer,
            observer,
            stats: SessionStats::default(),
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Bytes held for an incomplete frame
    pub fn buffered_len(&self) -> usize {
        self.scanner.buffered_len()
    }

    /// Feed one arrival of bytes and process every frame it completes.
    ///
    /// Only an acknowledgment write failure returns an error.
    pub async fn handle_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stats.bytes_received += bytes.len() as u64;
        metrics::counter!("tracker.bytes.received_total").increment(bytes.len() as u64);

        for frame in self.scanner.feed(bytes) {
            self.handle_frame(&frame).await?;
        }
        Ok(())
    }

    async fn handle_frame(&mut self, frame: &str) -> io::Result<()> {
        self.stats.frames += 1;
        trace!("Processing frame from {}: {}", self.peer, frame);

        let packet = match parser::parse_packet(frame) {
            Ok(packet) => packet,
            Err(e) => {
                self.stats.rejected += 1;
                metrics::counter!("tracker.parse_errors_total", "kind" => e.kind()).increment(1);
                self.observer.frame_rejected(&self.peer, frame, &e).await;
                return Ok(());
            }
        };

        self.stats.packets += 1;
        metrics::counter!("tracker.packets.parsed_total").increment(1);

        if !packet.valid {
            self.stats.invalid_checksums += 1;
            metrics::counter!("tracker.packets.invalid_checksum_total").increment(1);
            debug!(
                "Checksum mismatch from {}: received {}, computed {}",
                packet.imei, packet.checksum, packet.computed_checksum
            );
        }

        if commands::lookup(&packet.command).is_none() {
            self.stats.unknown_commands += 1;
            metrics::counter!("tracker.packets.unknown_command_total").increment(1);
            warn!(
                "Unknown command {} from {}, decoding as raw fields",
                packet.command, packet.imei
            );
        }

        let payload = commands::decode(&packet.command, &packet.fields);
        self.observer
            .packet_decoded(&self.peer, &packet, &payload)
            .await;

        // Acknowledged even when the checksum did not match
        let ack = parser::ack_frame(&packet.imei);
        if let Err(e) = self.writer.write_ack(ack.as_bytes()).await {
            metrics::counter!("tracker.acks.write_error_total").increment(1);
            return Err(e);
        }
        self.stats.acks_sent += 1;
        metrics::counter!("tracker.acks.sent_total").increment(1);
        trace!("Sent {} to {}", ack, self.peer);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::parser::build_frame;
    use tokio::sync::Mutex;

    const IMEI: &str = "123456789012345";

    #[derive(Debug, PartialEq)]
    enum Seen {
        Decoded(String, TypedPayload),
        Rejected(String, ParseError),
    }

    #[derive(Default)]
    struct RecordingObserver {
        seen: Mutex<Vec<Seen>>,
    }

    #[async_trait::async_trait]
    impl PacketObserver for RecordingObserver {
        async fn packet_decoded(&self, _peer: &str, packet: &Packet, payload: &TypedPayload) {
            self.seen
                .lock()
                .await
                .push(Seen::Decoded(packet.command.clone(), payload.clone()));
        }

        async fn frame_rejected(&self, _peer: &str, frame: &str, error: &ParseError) {
            self.seen
                .lock()
                .await
                .push(Seen::Rejected(frame.to_string(), error.clone()));
        }
    }

    struct BrokenPipe;

    #[async_trait::async_trait]
    impl AckWriter for BrokenPipe {
        async fn write_ack(&mut self, _ack: &[u8]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer went away"))
        }
    }

    fn session(
        observer: Arc<RecordingObserver>,
    ) -> SessionHandler<StreamAckWriter<Vec<u8>>, RecordingObserver> {
        SessionHandler::new(
            "test-peer",
            FrameScanner::default(),
            StreamAckWriter::new(Vec::new()),
            observer,
        )
    }

    fn acks(session: SessionHandler<StreamAckWriter<Vec<u8>>, RecordingObserver>) -> String {
        String::from_utf8(session.writer.into_inner()).unwrap()
    }

    #[tokio::test]
    async fn test_ack_for_each_parsed_frame() {
        let observer = Arc::new(RecordingObserver::default());
        let mut session = session(observer.clone());

        let input = format!(
            "{}{}",
            build_frame(IMEI, "BP00", &[]),
            build_frame(IMEI, "BP22", &["72", "250101120000"])
        );
        session.handle_bytes(input.as_bytes()).await.unwrap();

        let stats = session.stats();
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.packets, 2);
        assert_eq!(stats.acks_sent, 2);
        assert_eq!(
            acks(session),
            "(123456789012345,BR00,OK)(123456789012345,BR00,OK)"
        );

        let seen = observer.seen.lock().await;
        assert_eq!(seen.len(), 2);
        assert!(matches!(&seen[0], Seen::Decoded(cmd, TypedPayload::RawFallback(_)) if cmd == "BP00"));
        assert!(matches!(&seen[1], Seen::Decoded(cmd, TypedPayload::HeartRate(_)) if cmd == "BP22"));
    }

    #[tokio::test]
    async fn test_invalid_checksum_is_still_acknowledged() {
        let observer = Arc::new(RecordingObserver::default());
        let mut session = session(observer);

        session
            .handle_bytes(format!("({IMEI},BP00,0000)").as_bytes())
            .await
            .unwrap();

        assert_eq!(session.stats().invalid_checksums, 1);
        assert_eq!(session.stats().acks_sent, 1);
        assert_eq!(acks(session), "(123456789012345,BR00,OK)");
    }

    #[tokio::test]
    async fn test_start_marker_in_field_is_acknowledged() {
        let observer = Arc::new(RecordingObserver::default());
        let mut session = session(observer.clone());

        let frame = build_frame(IMEI, "BP03", &["SOS(1", "250101120000"]);
        session.handle_bytes(frame.as_bytes()).await.unwrap();

        assert_eq!(session.stats().packets, 1);
        assert_eq!(session.stats().invalid_checksums, 0);
        assert_eq!(acks(session), "(123456789012345,BR00,OK)");

        let seen = observer.seen.lock().await;
        assert!(matches!(&seen[0], Seen::Decoded(cmd, TypedPayload::AlarmReport(_)) if cmd == "BP03"));
    }

    #[tokio::test]
    async fn test_rejected_frame_gets_no_ack_and_session_continues() {
        let observer = Arc::new(RecordingObserver::default());
        let mut session = session(observer.clone());

        let input = format!("(12345,BP00,0000){}", build_frame(IMEI, "BP00", &[]));
        session.handle_bytes(input.as_bytes()).await.unwrap();

        assert_eq!(session.stats().rejected, 1);
        assert_eq!(session.stats().acks_sent, 1);
        assert_eq!(acks(session), "(123456789012345,BR00,OK)");

        let seen = observer.seen.lock().await;
        assert_eq!(
            seen[0],
            Seen::Rejected(
                "(12345,BP00,0000)".to_string(),
                ParseError::InvalidImei {
                    imei: "12345".to_string()
                }
            )
        );
    }

    #[tokio::test]
    async fn test_unknown_command_decodes_as_raw() {
        let observer = Arc::new(RecordingObserver::default());
        let mut session = session(observer.clone());

        session
            .handle_bytes(build_frame(IMEI, "ZZ99", &["a"]).as_bytes())
            .await
            .unwrap();

        assert_eq!(session.stats().unknown_commands, 1);
        assert_eq!(session.stats().acks_sent, 1);
        let seen = observer.seen.lock().await;
        assert!(matches!(&seen[0], Seen::Decoded(_, TypedPayload::RawFallback(raw)) if raw.raw_data == vec!["a"]));
    }

    #[tokio::test]
    async fn test_split_frame_is_processed_once_complete() {
        let observer = Arc::new(RecordingObserver::default());
        let mut session = session(observer);
        let frame = build_frame(IMEI, "BP20", &["100", "5", "0.1"]);
        let (head, tail) = frame.split_at(12);

        session.handle_bytes(head.as_bytes()).await.unwrap();
        assert_eq!(session.stats().frames, 0);
        assert_eq!(session.buffered_len(), head.len());

        session.handle_bytes(tail.as_bytes()).await.unwrap();
        assert_eq!(session.stats().frames, 1);
        assert_eq!(session.stats().bytes_received, frame.len() as u64);
    }

    #[tokio::test]
    async fn test_ack_write_failure_ends_session() {
        let observer = Arc::new(RecordingObserver::default());
        let mut session =
            SessionHandler::new("test-peer", FrameScanner::default(), BrokenPipe, observer.clone());

        let err = session
            .handle_bytes(build_frame(IMEI, "BP00", &[]).as_bytes())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(session.stats().acks_sent, 0);
        // The observer still saw the packet before the write was attempted
        assert_eq!(observer.seen.lock().await.len(), 1);
    }
}
