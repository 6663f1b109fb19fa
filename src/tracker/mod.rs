pub mod checksum;
pub mod commands;
pub mod coordinate;
mod fields;
pub mod framer;
pub mod parser;
pub mod server;
pub mod session;

pub use commands::{CommandDescriptor, CommandKind, TypedPayload};
pub use framer::FrameScanner;
pub use parser::{Packet, ParseError, ack_frame, build_frame, parse_packet};
pub use server::{GatewayServer, SessionSettings};
pub use session::{AckWriter, PacketObserver, SessionHandler, SessionStats, StreamAckWriter, TracingObserver};

/// Parse a complete frame and decode its payload.
///
/// This is the whole per-frame path of a live session minus the
/// acknowledgment write.
pub fn decode_frame(frame: &str) -> Result<(Packet, TypedPayload), ParseError> {
    let packet = parse_packet(frame)?;
    let payload = commands::decode(&packet.command, &packet.fields);
    Ok((packet, payload))
}
