use bytes::{Buf, BytesMut};
use tracing::{debug, trace, warn};

use super::parser::{FRAME_END, FRAME_START};

/// Default cap on bytes held for an unterminated frame
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 4096;

/// Extracts `(`…`)` frames from a TCP byte stream.
///
/// TCP gives no message boundaries: one read may carry several frames, or a
/// frame may arrive over several reads. Bytes are accumulated until a frame
/// closes. A start marker pairs with the next end marker; a `(` inside that
/// span is ordinary payload. Anything before a start marker is discarded
/// immediately. A frame that grows past `max_buffer_bytes` without closing is
/// dropped and the scanner resyncs on the next start marker after it. The
/// bound applies to the span whether it arrives in one read or many.
#[derive(Debug)]
pub struct FrameScanner {
    buffer: BytesMut,
    max_buffer_bytes: usize,
    discarded_bytes: u64,
}

impl Default for FrameScanner {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUFFER_BYTES)
    }
}

impl FrameScanner {
    pub fn new(max_buffer_bytes: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(max_buffer_bytes.min(DEFAULT_MAX_BUFFER_BYTES)),
            max_buffer_bytes,
            discarded_bytes: 0,
        }
    }

    /// Append `bytes` and return every frame completed by them, in order.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();

        loop {
            match self.buffer.iter().position(|&b| b == FRAME_START) {
                Some(0) => {}
                Some(start) => {
                    debug!("Discarding {} bytes before frame start", start);
                    self.discard(start);
                }
                None => {
                    if !self.buffer.is_empty() {
                        debug!("Discarding {} bytes with no frame start", self.buffer.len());
                        self.discard(self.buffer.len());
                    }
                    break;
                }
            }

            match self.buffer[1..].iter().position(|&b| b == FRAME_END) {
                Some(offset) if offset + 2 > self.max_buffer_bytes => {
                    self.evict_head();
                }
                Some(offset) => {
                    let frame = self.buffer.split_to(offset + 2);
                    trace!("Extracted frame of {} bytes", frame.len());
                    metrics::counter!("tracker.framer.frames_total").increment(1);
                    frames.push(String::from_utf8_lossy(&frame).into_owned());
                }
                None => {
                    while self.buffer.len() > self.max_buffer_bytes {
                        self.evict_head();
                    }
                    break;
                }
            }
        }

        frames
    }

    /// Bytes currently held for an incomplete frame
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Total bytes dropped as noise or evicted since creation
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded_bytes
    }

    /// Drop the oversized frame at the head of the buffer, resyncing on the
    /// next start marker after it (or clearing the buffer when there is none).
    fn evict_head(&mut self) {
        let evicted = self.buffer[1..]
            .iter()
            .position(|&b| b == FRAME_START)
            .map_or(self.buffer.len(), |offset| offset + 1);

        warn!(
            "No frame end within {} bytes, evicting {} buffered bytes",
            self.max_buffer_bytes, evicted
        );
        metrics::counter!("tracker.framer.evicted_bytes_total").increment(evicted as u64);
        self.discard(evicted);
    }

    fn discard(&mut self, count: usize) {
        self.buffer.advance(count);
        self.discarded_bytes += count as u64;
        metrics::counter!("tracker.framer.discarded_bytes_total").increment(count as u64);
    }
}
